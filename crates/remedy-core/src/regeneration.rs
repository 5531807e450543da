//! Regeneration driver
//!
//! Turns a change request into requirements, code, a tested build and a
//! verified deployment. Failing tests or builds send the cycle back to code
//! generation; failed deploys rebuild; failed verification redeploys.

use crate::delivery::{BuildArtifact, DeliveryBackend, TestReport};
use crate::error::CoreError;
use crate::orchestrator::{RemediationOrchestrator, Stamp};
use crate::reasoning::{ReasoningRequest, ReasoningService, ReasoningTask};
use remedy_actions::Target;
use remedy_phase::{Cycle, PhaseError, RegenerationPhase};
use remedy_rollback::VerificationResult;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

/// Request to regenerate and redeploy a component
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRequest {
    pub id: String,
    pub description: String,
    /// Deployment receiving the new build
    pub target: Target,
}

impl ChangeRequest {
    #[must_use]
    pub fn new(id: impl Into<String>, description: impl Into<String>, target: Target) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            target,
        }
    }
}

/// Everything a regeneration cycle produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegenerationReport {
    pub cycle: Cycle<RegenerationPhase>,
    pub requirements: Vec<String>,
    /// Last generated code
    pub code: Option<String>,
    pub test_runs: Vec<TestReport>,
    /// Last artifact built
    pub artifact: Option<BuildArtifact>,
    pub verifications: Vec<VerificationResult>,
}

impl RegenerationReport {
    #[inline]
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.cycle.phase == RegenerationPhase::Completed
    }
}

#[derive(Default)]
struct Progress {
    continuation: Option<String>,
    requirements: Vec<String>,
    code: Option<String>,
    test_runs: Vec<TestReport>,
    artifact: Option<BuildArtifact>,
    verifications: Vec<VerificationResult>,
}

impl Progress {
    fn request(&self, task: ReasoningTask, change: &ChangeRequest) -> ReasoningRequest {
        let failures: Vec<&String> = self
            .test_runs
            .last()
            .map(|run| run.failures.iter().collect())
            .unwrap_or_default();
        ReasoningRequest::new(task, change.id.clone(), change.description.clone())
            .with_context(json!({
                "target": change.target,
                "requirements": self.requirements,
                "previous_failures": failures,
            }))
            .with_continuation(self.continuation.clone())
    }
}

impl RemediationOrchestrator {
    /// Run a regeneration cycle for `change` to a terminal phase
    ///
    /// A resumed cycle for the same change request continues from its stored
    /// phase; work products lost with the previous process are regenerated
    /// through the normal fallback paths.
    pub async fn run_regeneration(
        &self,
        change: &ChangeRequest,
        reasoning: &dyn ReasoningService,
        delivery: &dyn DeliveryBackend,
    ) -> Result<RegenerationReport, CoreError> {
        let machine = self.regeneration();
        match machine.cycle() {
            Some(cycle) if !cycle.is_terminal() && cycle.context.get("change") == Some(&change.id) => {
                info!(cycle_id = %cycle.id, phase = %cycle.phase, change = %change.id, "continuing resumed regeneration");
            }
            _ => machine.start(
                Cycle::new()
                    .with_context("change", change.id.clone())
                    .with_context("target", change.target.to_string()),
            )?,
        }
        self.checkpoint(machine).await;

        let mut progress = Progress::default();

        while let Some(stamp) = Stamp::of(machine).filter(|s| s.is_open()) {
            match stamp.phase {
                RegenerationPhase::AnalyzingRequirements => {
                    let request = progress.request(ReasoningTask::AnalyzeRequirements, change);
                    match reasoning.reason(request).await {
                        Ok(judgment) => {
                            if judgment.continuation.is_some() {
                                progress.continuation = judgment.continuation;
                            }
                            progress.requirements = judgment.requirements;
                            stamp.advance(machine, RegenerationPhase::GeneratingCode)?;
                        }
                        Err(err) => stamp.setback(machine, &err.to_string(), err.is_retryable())?,
                    }
                }
                RegenerationPhase::GeneratingCode => {
                    let request = progress.request(ReasoningTask::GenerateCode, change);
                    match reasoning.reason(request).await {
                        Ok(judgment) => {
                            if judgment.continuation.is_some() {
                                progress.continuation = judgment.continuation;
                            }
                            match judgment.generated_code {
                                Some(code) => {
                                    progress.code = Some(code);
                                    progress.artifact = None;
                                    stamp.advance(machine, RegenerationPhase::Testing)?;
                                }
                                None => stamp.setback(machine, "reasoning produced no code", true)?,
                            }
                        }
                        Err(err) => stamp.setback(machine, &err.to_string(), err.is_retryable())?,
                    }
                }
                RegenerationPhase::Testing => {
                    let Some(code) = progress.code.clone() else {
                        stamp.setback(machine, "no code to test", true)?;
                        continue;
                    };
                    match delivery.run_tests(&code).await {
                        Ok(report) => {
                            let passed = report.success();
                            let failed = report.failed;
                            progress.test_runs.push(report);
                            if passed {
                                stamp.advance(machine, RegenerationPhase::Building)?;
                            } else {
                                stamp.setback(machine, &format!("{failed} tests failed"), true)?;
                            }
                        }
                        Err(err) => stamp.setback(machine, &err.to_string(), err.is_retryable())?,
                    }
                }
                RegenerationPhase::Building => {
                    let Some(code) = progress.code.clone() else {
                        stamp.setback(machine, "no code to build", true)?;
                        continue;
                    };
                    match delivery.build(&code).await {
                        Ok(artifact) => {
                            info!(change = %change.id, artifact = %artifact.id, "build finished");
                            progress.artifact = Some(artifact);
                            stamp.advance(machine, RegenerationPhase::Deploying)?;
                        }
                        Err(err) => stamp.setback(machine, &err.to_string(), err.is_retryable())?,
                    }
                }
                RegenerationPhase::Deploying => {
                    let Some(artifact) = progress.artifact.clone() else {
                        stamp.setback(machine, "no artifact to deploy", true)?;
                        continue;
                    };
                    match delivery.deploy(&artifact, &change.target).await {
                        Ok(()) => stamp.advance(machine, RegenerationPhase::Verifying)?,
                        Err(err) => stamp.setback(machine, &err.to_string(), err.is_retryable())?,
                    }
                }
                RegenerationPhase::Verifying => match delivery.verify_deployment(&change.target).await {
                    Ok(verification) => {
                        let healthy = verification.success;
                        let message = verification.message.clone();
                        progress.verifications.push(verification);
                        if healthy {
                            stamp.advance(machine, RegenerationPhase::Completed)?;
                        } else {
                            stamp.setback(machine, &format!("deployment unhealthy: {message}"), true)?;
                        }
                    }
                    Err(err) => stamp.setback(machine, &err.to_string(), err.is_retryable())?,
                },
                RegenerationPhase::Idle | RegenerationPhase::Completed | RegenerationPhase::Failed => break,
            }
            self.checkpoint(machine).await;
        }

        let cycle = machine.cycle().ok_or(PhaseError::NoActiveCycle)?;
        info!(
            cycle_id = %cycle.id,
            change = %change.id,
            phase = %cycle.phase,
            test_runs = progress.test_runs.len(),
            "regeneration finished"
        );
        Ok(RegenerationReport {
            cycle,
            requirements: progress.requirements,
            code: progress.code,
            test_runs: progress.test_runs,
            artifact: progress.artifact,
            verifications: progress.verifications,
        })
    }
}
