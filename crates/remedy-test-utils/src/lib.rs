//! Testing utilities for Remedy workspace
//!
//! Shared fakes, fixtures, and scripted collaborators.

#![allow(missing_docs)]

use parking_lot::Mutex;
use remedy_actions::{
    ActionResult, ClusterClient, ClusterError, DeploymentInfo, ExecutionMode, RollbackOutcome, Target,
};
use remedy_core::{
    BuildArtifact, DeliveryBackend, DeliveryError, Incident, Judgment, ProposedAction, ReasoningError,
    ReasoningRequest, ReasoningService, ReasoningTask, RemediationOrchestrator, RemedyConfig, TestReport,
    Verifier, VerifierError,
};
use remedy_rollback::{HealthCheck, VerificationResult};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Call recorded by [`RecordingCluster`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterCall {
    Rollback { target: Target, revision: Option<i64>, dry_run: bool },
    Restart { target: Target, dry_run: bool },
    Scale { target: Target, replicas: u32, dry_run: bool },
    DeletePod { target: Target, dry_run: bool },
}

/// Cluster client that records every effectful call
///
/// Rollbacks succeed from revision 5 to 4 unless failures are queued.
#[derive(Debug, Default)]
pub struct RecordingCluster {
    calls: Mutex<Vec<ClusterCall>>,
    rollback_failures: Mutex<VecDeque<ClusterError>>,
    failed_outcomes: Mutex<u32>,
    action_failure: Mutex<Option<ClusterError>>,
}

impl RecordingCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Next rollback call returns `err`
    pub fn fail_next_rollback(&self, err: ClusterError) {
        self.rollback_failures.lock().push_back(err);
    }

    /// Next `count` rollbacks report an unsuccessful outcome
    pub fn refuse_rollbacks(&self, count: u32) {
        *self.failed_outcomes.lock() += count;
    }

    /// Every restart, scale and pod deletion fails with `err`
    pub fn fail_actions(&self, err: ClusterError) {
        *self.action_failure.lock() = Some(err);
    }

    pub fn calls(&self) -> Vec<ClusterCall> {
        self.calls.lock().clone()
    }

    pub fn rollbacks(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, ClusterCall::Rollback { .. }))
            .count()
    }

    fn act(&self, call: ClusterCall) -> Result<(), ClusterError> {
        self.calls.lock().push(call);
        match self.action_failure.lock().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl ClusterClient for RecordingCluster {
    async fn rollback(
        &self,
        target: &Target,
        revision: Option<i64>,
        _reason: &str,
        dry_run: bool,
    ) -> Result<RollbackOutcome, ClusterError> {
        self.calls.lock().push(ClusterCall::Rollback {
            target: target.clone(),
            revision,
            dry_run,
        });
        if let Some(err) = self.rollback_failures.lock().pop_front() {
            return Err(err);
        }
        let mut refused = self.failed_outcomes.lock();
        if *refused > 0 {
            *refused -= 1;
            return Ok(RollbackOutcome {
                success: false,
                dry_run,
                error: Some("previous revision unavailable".to_string()),
                ..RollbackOutcome::default()
            });
        }
        Ok(RollbackOutcome {
            success: true,
            from_revision: Some(5),
            to_revision: Some(revision.unwrap_or(4)),
            dry_run,
            error: None,
        })
    }

    async fn get_deployment(&self, name: &str, namespace: &str) -> Result<DeploymentInfo, ClusterError> {
        Ok(DeploymentInfo {
            namespace: namespace.to_string(),
            name: name.to_string(),
            replicas: 3,
            ready_replicas: 3,
            revision: 5,
            image: Some(format!("registry.local/{name}:5")),
        })
    }

    async fn list_deployments(&self, _namespace: &str) -> Result<Vec<DeploymentInfo>, ClusterError> {
        Ok(Vec::new())
    }

    async fn restart_deployment(&self, target: &Target, dry_run: bool) -> Result<(), ClusterError> {
        self.act(ClusterCall::Restart {
            target: target.clone(),
            dry_run,
        })
    }

    async fn scale_deployment(&self, target: &Target, replicas: u32, dry_run: bool) -> Result<(), ClusterError> {
        self.act(ClusterCall::Scale {
            target: target.clone(),
            replicas,
            dry_run,
        })
    }

    async fn delete_pod(&self, target: &Target, dry_run: bool) -> Result<(), ClusterError> {
        self.act(ClusterCall::DeletePod {
            target: target.clone(),
            dry_run,
        })
    }
}

/// Reasoning service answering from per-task scripts
///
/// An exhausted script falls back to a plain judgment: `Decide` proposes
/// nothing, `GenerateCode` returns a stub program.
#[derive(Debug, Default)]
pub struct ScriptedReasoning {
    scripts: Mutex<HashMap<ReasoningTask, VecDeque<Result<Judgment, ReasoningError>>>>,
    requests: Mutex<Vec<ReasoningRequest>>,
}

impl ScriptedReasoning {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an answer for `task`
    #[must_use]
    pub fn then(self, task: ReasoningTask, answer: Result<Judgment, ReasoningError>) -> Self {
        self.scripts.lock().entry(task).or_default().push_back(answer);
        self
    }

    /// Queue a decision proposing `action`
    #[must_use]
    pub fn deciding(self, action: ProposedAction) -> Self {
        self.then(ReasoningTask::Decide, Ok(Judgment::new("decided").with_action(action)))
    }

    pub fn requests(&self) -> Vec<ReasoningRequest> {
        self.requests.lock().clone()
    }

    pub fn requests_for(&self, task: ReasoningTask) -> usize {
        self.requests.lock().iter().filter(|r| r.task == task).count()
    }
}

#[async_trait::async_trait]
impl ReasoningService for ScriptedReasoning {
    async fn reason(&self, request: ReasoningRequest) -> Result<Judgment, ReasoningError> {
        let task = request.task;
        self.requests.lock().push(request);
        let scripted = self.scripts.lock().get_mut(&task).and_then(VecDeque::pop_front);
        scripted.unwrap_or_else(|| {
            Ok(match task {
                ReasoningTask::GenerateCode => Judgment::new("generated").with_code("fn main() {}"),
                ReasoningTask::AnalyzeRequirements => Judgment::new("requirements").with_requirement("keep the API"),
                ReasoningTask::Analyze | ReasoningTask::Decide => Judgment::new(task.as_str()),
            })
        })
    }
}

/// Verifier answering from a script, healthy once exhausted
#[derive(Debug, Default)]
pub struct ScriptedVerifier {
    answers: Mutex<VecDeque<Result<VerificationResult, VerifierError>>>,
    verified: Mutex<Vec<ActionResult>>,
}

impl ScriptedVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn then(self, answer: Result<VerificationResult, VerifierError>) -> Self {
        self.answers.lock().push_back(answer);
        self
    }

    pub fn verified(&self) -> Vec<ActionResult> {
        self.verified.lock().clone()
    }
}

#[async_trait::async_trait]
impl Verifier for ScriptedVerifier {
    async fn verify(&self, result: &ActionResult) -> Result<VerificationResult, VerifierError> {
        self.verified.lock().push(result.clone());
        self.answers
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(VerificationResult::healthy("recovered")))
    }
}

/// Stage recorded by [`FakeDelivery`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryCall {
    Test,
    Build,
    Deploy { artifact: String, target: Target },
    Verify,
}

/// Delivery back-end with scripted stage outcomes; stages pass once
/// their script is exhausted
#[derive(Debug, Default)]
pub struct FakeDelivery {
    tests: Mutex<VecDeque<Result<TestReport, DeliveryError>>>,
    builds: Mutex<VecDeque<Result<(), DeliveryError>>>,
    deploys: Mutex<VecDeque<Result<(), DeliveryError>>>,
    verifications: Mutex<VecDeque<VerificationResult>>,
    calls: Mutex<Vec<DeliveryCall>>,
    built: Mutex<u32>,
}

impl FakeDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_test_run(self, outcome: Result<TestReport, DeliveryError>) -> Self {
        self.tests.lock().push_back(outcome);
        self
    }

    #[must_use]
    pub fn with_build(self, outcome: Result<(), DeliveryError>) -> Self {
        self.builds.lock().push_back(outcome);
        self
    }

    #[must_use]
    pub fn with_deploy(self, outcome: Result<(), DeliveryError>) -> Self {
        self.deploys.lock().push_back(outcome);
        self
    }

    #[must_use]
    pub fn with_verification(self, verification: VerificationResult) -> Self {
        self.verifications.lock().push_back(verification);
        self
    }

    pub fn calls(&self) -> Vec<DeliveryCall> {
        self.calls.lock().clone()
    }
}

#[async_trait::async_trait]
impl DeliveryBackend for FakeDelivery {
    async fn run_tests(&self, _code: &str) -> Result<TestReport, DeliveryError> {
        self.calls.lock().push(DeliveryCall::Test);
        self.tests
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(TestReport::passing(12)))
    }

    async fn build(&self, _code: &str) -> Result<BuildArtifact, DeliveryError> {
        self.calls.lock().push(DeliveryCall::Build);
        self.builds.lock().pop_front().unwrap_or(Ok(()))?;
        let mut built = self.built.lock();
        *built += 1;
        Ok(BuildArtifact {
            id: format!("build-{}", *built),
            location: format!("registry.local/app:{}", *built),
        })
    }

    async fn deploy(&self, artifact: &BuildArtifact, target: &Target) -> Result<(), DeliveryError> {
        self.calls.lock().push(DeliveryCall::Deploy {
            artifact: artifact.id.clone(),
            target: target.clone(),
        });
        self.deploys.lock().pop_front().unwrap_or(Ok(()))
    }

    async fn verify_deployment(&self, target: &Target) -> Result<VerificationResult, DeliveryError> {
        self.calls.lock().push(DeliveryCall::Verify);
        Ok(self
            .verifications
            .lock()
            .pop_front()
            .unwrap_or_else(|| VerificationResult::healthy(format!("{target} healthy"))))
    }
}

pub fn target() -> Target {
    Target::new("prod", "checkout")
}

pub fn incident() -> Incident {
    Incident::new("inc-100", "checkout returning 503", target())
}

/// Readiness failing on every pod
pub fn unhealthy() -> VerificationResult {
    VerificationResult::failed("readiness failing")
        .with_health_check(HealthCheck::failed("readiness", "0/3 ready"))
}

pub fn restart_proposal() -> ProposedAction {
    ProposedAction::new(remedy_actions::ActionKind::RESTART, target(), "pods wedged")
}

/// Simulated-mode orchestrator over a recording cluster
pub fn setup_orchestrator(config: RemedyConfig) -> (RemediationOrchestrator, Arc<RecordingCluster>) {
    let cluster = RecordingCluster::new();
    let orchestrator = RemediationOrchestrator::new(config.with_default_mode(ExecutionMode::Simulated))
        .unwrap()
        .with_cluster(Arc::clone(&cluster) as Arc<dyn ClusterClient>);
    (orchestrator, cluster)
}
