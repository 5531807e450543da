//! Deterministic collaborators for dry runs and the `remedy simulate` command

use crate::error::{ReasoningError, VerifierError};
use crate::reasoning::{Hypothesis, Judgment, ProposedAction, ReasoningRequest, ReasoningService, ReasoningTask};
use crate::verifier::Verifier;
use dashmap::DashMap;
use remedy_actions::{
    ActionKind, ActionResult, ClusterClient, ClusterError, DeploymentInfo, RollbackOutcome, Target,
};
use remedy_rollback::{HealthCheck, LogAnalysis, MetricComparison, VerificationResult};

/// Reasoning that always suspects a bad rollout and restarts the target
#[derive(Debug, Clone)]
pub struct SimulatedReasoning {
    target: Target,
}

impl SimulatedReasoning {
    #[must_use]
    pub fn new(target: Target) -> Self {
        Self { target }
    }
}

#[async_trait::async_trait]
impl ReasoningService for SimulatedReasoning {
    async fn reason(&self, request: ReasoningRequest) -> Result<Judgment, ReasoningError> {
        let token = format!("{}:{}", request.correlation_id, request.task.as_str());
        let judgment = match request.task {
            ReasoningTask::Analyze => Judgment::new(format!("Pods of {} are crash-looping", self.target))
                .with_hypothesis(Hypothesis::new("Latest rollout introduced a bad configuration", 0.7))
                .with_hypothesis(Hypothesis::new("Node memory pressure is evicting pods", 0.2)),
            ReasoningTask::Decide => Judgment::new("Restart the deployment to pick up a clean state").with_action(
                ProposedAction::new(
                    ActionKind::RESTART,
                    self.target.clone(),
                    "crash-looping pods after rollout",
                ),
            ),
            ReasoningTask::AnalyzeRequirements => {
                Judgment::new("Requirements extracted").with_requirement(request.prompt.clone())
            }
            ReasoningTask::GenerateCode => {
                Judgment::new("Code generated").with_code(format!("// {}\nfn main() {{}}\n", request.prompt))
            }
        };
        Ok(judgment.with_continuation(token))
    }
}

/// Verifier reporting a fixed outcome
#[derive(Debug, Clone, Copy)]
pub struct SimulatedVerifier {
    healthy: bool,
}

impl SimulatedVerifier {
    #[must_use]
    pub fn healthy() -> Self {
        Self { healthy: true }
    }

    /// Readiness failing, latency regressed and an error spike
    #[must_use]
    pub fn failing() -> Self {
        Self { healthy: false }
    }
}

#[async_trait::async_trait]
impl Verifier for SimulatedVerifier {
    async fn verify(&self, result: &ActionResult) -> Result<VerificationResult, VerifierError> {
        if self.healthy {
            return Ok(VerificationResult::healthy(format!("{} recovered", result.target))
                .with_health_check(HealthCheck::passed("readiness"))
                .with_metric(MetricComparison::higher_is_worse("p99_latency_ms", 120.0, 118.0, 10.0)));
        }
        Ok(VerificationResult::failed(format!("{} still unhealthy", result.target))
            .with_health_check(HealthCheck::failed("readiness", "0/3 pods ready"))
            .with_metric(MetricComparison::higher_is_worse("p99_latency_ms", 120.0, 480.0, 10.0))
            .with_logs(LogAnalysis {
                error_count: 340,
                baseline_error_count: 12,
                new_patterns: vec!["panic: nil map assignment".to_string()],
                error_spike: true,
            }))
    }
}

/// In-memory cluster; unknown deployments appear on first use at revision 2
#[derive(Debug, Default)]
pub struct SimulatedCluster {
    deployments: DashMap<Target, DeploymentInfo>,
}

impl SimulatedCluster {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_deployment(self, target: &Target, replicas: u32, revision: i64) -> Self {
        self.deployments.insert(
            target.clone(),
            DeploymentInfo {
                namespace: target.namespace.clone(),
                name: target.name.clone(),
                replicas,
                ready_replicas: replicas,
                revision,
                image: None,
            },
        );
        self
    }

    fn deployment(&self, target: &Target) -> dashmap::mapref::one::RefMut<'_, Target, DeploymentInfo> {
        self.deployments
            .entry(target.clone())
            .or_insert_with(|| DeploymentInfo {
                namespace: target.namespace.clone(),
                name: target.name.clone(),
                replicas: 3,
                ready_replicas: 3,
                revision: 2,
                image: None,
            })
    }
}

#[async_trait::async_trait]
impl ClusterClient for SimulatedCluster {
    async fn rollback(
        &self,
        target: &Target,
        revision: Option<i64>,
        _reason: &str,
        dry_run: bool,
    ) -> Result<RollbackOutcome, ClusterError> {
        let mut deployment = self.deployment(target);
        let from = deployment.revision;
        let to = revision.unwrap_or(from - 1);
        if to < 1 || to >= from {
            return Ok(RollbackOutcome {
                success: false,
                from_revision: Some(from),
                dry_run,
                error: Some(format!("revision {to} is not an earlier revision of {target}")),
                ..RollbackOutcome::default()
            });
        }
        if !dry_run {
            deployment.revision = to;
        }
        Ok(RollbackOutcome {
            success: true,
            from_revision: Some(from),
            to_revision: Some(to),
            dry_run,
            error: None,
        })
    }

    async fn get_deployment(&self, name: &str, namespace: &str) -> Result<DeploymentInfo, ClusterError> {
        self.deployments
            .get(&Target::new(namespace, name))
            .map(|d| d.value().clone())
            .ok_or_else(|| ClusterError::NotFound {
                kind: "deployment".to_string(),
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }

    async fn list_deployments(&self, namespace: &str) -> Result<Vec<DeploymentInfo>, ClusterError> {
        let mut deployments: Vec<DeploymentInfo> = self
            .deployments
            .iter()
            .filter(|d| d.namespace == namespace)
            .map(|d| d.value().clone())
            .collect();
        deployments.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(deployments)
    }

    async fn restart_deployment(&self, target: &Target, _dry_run: bool) -> Result<(), ClusterError> {
        self.deployment(target);
        Ok(())
    }

    async fn scale_deployment(&self, target: &Target, replicas: u32, dry_run: bool) -> Result<(), ClusterError> {
        let mut deployment = self.deployment(target);
        if !dry_run {
            deployment.replicas = replicas;
            deployment.ready_replicas = replicas;
        }
        Ok(())
    }

    async fn delete_pod(&self, target: &Target, _dry_run: bool) -> Result<(), ClusterError> {
        self.deployment(target);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn decide_proposes_restart_of_target() {
        let target = Target::new("demo", "web");
        let reasoning = SimulatedReasoning::new(target.clone());
        let judgment = reasoning
            .reason(ReasoningRequest::new(ReasoningTask::Decide, "inc-1", "web down"))
            .await
            .unwrap();

        let action = judgment.proposed_action.unwrap();
        assert_eq!(action.kind, ActionKind::RESTART);
        assert_eq!(action.target, target);
        assert_eq!(judgment.continuation.as_deref(), Some("inc-1:decide"));
    }

    #[tokio::test]
    async fn cluster_rolls_back_one_revision_at_a_time() {
        let target = Target::new("demo", "web");
        let cluster = SimulatedCluster::new().with_deployment(&target, 3, 2);

        let dry = cluster.rollback(&target, None, "test", true).await.unwrap();
        assert!(dry.success && dry.dry_run);
        assert_eq!(cluster.get_deployment("web", "demo").await.unwrap().revision, 2);

        let done = cluster.rollback(&target, None, "test", false).await.unwrap();
        assert_eq!((done.from_revision, done.to_revision), (Some(2), Some(1)));

        let exhausted = cluster.rollback(&target, None, "test", false).await.unwrap();
        assert!(!exhausted.success);
        assert!(cluster.get_deployment("api", "demo").await.is_err());
    }
}
