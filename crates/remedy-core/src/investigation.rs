//! Investigation driver
//!
//! Walks an incident through observe, analyze, decide, remediate and verify.
//! Collaborator failures feed the phase machine's retry policy: retryable
//! ones spend a retry on the current phase, the rest fail the cycle.

use crate::error::CoreError;
use crate::orchestrator::{RemediationAssessment, RemediationOrchestrator, Stamp};
use crate::reasoning::{Hypothesis, Judgment, ProposedAction, ReasoningRequest, ReasoningService, ReasoningTask};
use crate::verifier::Verifier;
use remedy_actions::{ActionResult, Target};
use remedy_phase::{Cycle, InvestigationPhase, PhaseError};
use remedy_rollback::VerificationResult;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

/// Incident handed to an investigation cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    /// Correlation id for every action and rollback in the cycle
    pub id: String,
    pub summary: String,
    pub target: Target,
    /// Raw alert payload
    #[serde(default)]
    pub signals: serde_json::Value,
}

impl Incident {
    #[must_use]
    pub fn new(id: impl Into<String>, summary: impl Into<String>, target: Target) -> Self {
        Self {
            id: id.into(),
            summary: summary.into(),
            target,
            signals: serde_json::Value::Null,
        }
    }

    #[must_use]
    pub fn with_signals(mut self, signals: serde_json::Value) -> Self {
        self.signals = signals;
        self
    }
}

/// Everything an investigation cycle produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestigationReport {
    pub cycle: Cycle<InvestigationPhase>,
    pub hypotheses: Vec<Hypothesis>,
    /// Every attempted action, including blocked and failed ones
    pub actions: Vec<ActionResult>,
    pub verifications: Vec<VerificationResult>,
    pub assessments: Vec<RemediationAssessment>,
}

impl InvestigationReport {
    #[inline]
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.cycle.phase == InvestigationPhase::Completed
    }

    /// Rollbacks that ran to completion
    #[must_use]
    pub fn rollbacks_completed(&self) -> usize {
        self.assessments
            .iter()
            .filter_map(|a| a.rollback.as_ref())
            .filter(|r| r.status == remedy_rollback::RollbackStatus::Completed)
            .count()
    }
}

#[derive(Default)]
struct Progress {
    continuation: Option<String>,
    hypotheses: Vec<Hypothesis>,
    proposal: Option<ProposedAction>,
    last_action: Option<ActionResult>,
    actions: Vec<ActionResult>,
    verifications: Vec<VerificationResult>,
    assessments: Vec<RemediationAssessment>,
}

impl Progress {
    fn absorb(&mut self, judgment: &Judgment) {
        if judgment.continuation.is_some() {
            self.continuation.clone_from(&judgment.continuation);
        }
    }

    fn request(&self, task: ReasoningTask, incident: &Incident) -> ReasoningRequest {
        let context = json!({
            "target": incident.target,
            "signals": incident.signals,
            "hypotheses": self.hypotheses,
            "attempts": self.actions.iter().map(|a| json!({
                "kind": a.kind,
                "success": a.success,
                "message": a.message,
            })).collect::<Vec<_>>(),
            "rolled_back": self.assessments.iter().any(|a| a.rollback.is_some()),
        });
        ReasoningRequest::new(task, incident.id.clone(), incident.summary.clone())
            .with_context(context)
            .with_continuation(self.continuation.clone())
    }
}

impl RemediationOrchestrator {
    /// Run an investigation cycle for `incident` to a terminal phase
    ///
    /// A resumed cycle for the same incident continues from its stored phase.
    ///
    /// # Errors
    /// - `PhaseError::AlreadyActive` if another cycle owns the machine
    /// - rollback engine misuse surfaced while assessing a remediation
    pub async fn run_investigation(
        &self,
        incident: &Incident,
        reasoning: &dyn ReasoningService,
        verifier: &dyn Verifier,
    ) -> Result<InvestigationReport, CoreError> {
        let machine = self.investigation();
        match machine.cycle() {
            Some(cycle) if !cycle.is_terminal() && cycle.context.get("incident") == Some(&incident.id) => {
                info!(cycle_id = %cycle.id, phase = %cycle.phase, incident = %incident.id, "continuing resumed investigation");
            }
            _ => machine.start(
                Cycle::new()
                    .with_context("incident", incident.id.clone())
                    .with_context("target", incident.target.to_string()),
            )?,
        }
        self.checkpoint(machine).await;

        let mode = self.config().default_mode;
        let mut progress = Progress::default();

        while let Some(stamp) = Stamp::of(machine).filter(|s| s.is_open()) {
            match stamp.phase {
                InvestigationPhase::Observing => {
                    if !incident.signals.is_null() {
                        machine.set_context("signals", incident.signals.to_string())?;
                    }
                    stamp.advance(machine, InvestigationPhase::Analyzing)?;
                }
                InvestigationPhase::Analyzing => {
                    let request = progress.request(ReasoningTask::Analyze, incident);
                    match reasoning.reason(request).await {
                        Ok(judgment) => {
                            progress.absorb(&judgment);
                            progress.hypotheses = judgment.hypotheses;
                            stamp.advance(machine, InvestigationPhase::Deciding)?;
                        }
                        Err(err) => stamp.setback(machine, &err.to_string(), err.is_retryable())?,
                    }
                }
                InvestigationPhase::Deciding => {
                    let request = progress.request(ReasoningTask::Decide, incident);
                    match reasoning.reason(request).await {
                        Ok(judgment) => {
                            progress.absorb(&judgment);
                            match judgment.proposed_action {
                                Some(action) => {
                                    info!(incident = %incident.id, kind = %action.kind, target = %action.target, "remediation decided");
                                    progress.proposal = Some(action);
                                    stamp.advance(machine, InvestigationPhase::Remediating)?;
                                }
                                None => {
                                    info!(incident = %incident.id, summary = %judgment.summary, "no remediation needed");
                                    stamp.advance(machine, InvestigationPhase::Completed)?;
                                }
                            }
                        }
                        Err(err) => stamp.setback(machine, &err.to_string(), err.is_retryable())?,
                    }
                }
                InvestigationPhase::Remediating => {
                    let Some(proposal) = progress.proposal.take() else {
                        stamp.setback(machine, "no remediation decided", true)?;
                        continue;
                    };
                    let result = self.execute_action(&proposal.to_request(&incident.id), mode).await;
                    progress.actions.push(result.clone());
                    if result.success {
                        progress.last_action = Some(result);
                        stamp.advance(machine, InvestigationPhase::Verifying)?;
                    } else {
                        stamp.setback(machine, &result.message, true)?;
                    }
                }
                InvestigationPhase::Verifying => {
                    let Some(action) = progress.last_action.clone() else {
                        // Resumed mid-verification with nothing to verify
                        stamp.advance(machine, InvestigationPhase::Deciding)?;
                        continue;
                    };
                    match verifier.verify(&action).await {
                        Ok(verification) => {
                            let assessment = self.assess_remediation(&action, &verification, &incident.id).await?;
                            let healthy = assessment.healthy;
                            progress.verifications.push(verification.clone());
                            progress.assessments.push(assessment);
                            if healthy {
                                stamp.advance(machine, InvestigationPhase::Completed)?;
                            } else {
                                progress.last_action = None;
                                self.reconsider(stamp, &verification.message)?;
                            }
                        }
                        Err(err) => stamp.setback(machine, &err.to_string(), err.is_retryable())?,
                    }
                }
                InvestigationPhase::Idle | InvestigationPhase::Completed | InvestigationPhase::Failed => break,
            }
            self.checkpoint(machine).await;
        }

        let cycle = machine.cycle().ok_or(PhaseError::NoActiveCycle)?;
        info!(
            cycle_id = %cycle.id,
            incident = %incident.id,
            phase = %cycle.phase,
            actions = progress.actions.len(),
            "investigation finished"
        );
        Ok(InvestigationReport {
            cycle,
            hypotheses: progress.hypotheses,
            actions: progress.actions,
            verifications: progress.verifications,
            assessments: progress.assessments,
        })
    }

    /// Failed verification spends the verifying budget, then re-decides
    fn reconsider(&self, stamp: Stamp<InvestigationPhase>, message: &str) -> Result<(), CoreError> {
        let machine = self.investigation();
        let reason = format!("verification failed: {message}");
        stamp.setback(machine, &reason, true)?;
        match Stamp::of(machine) {
            Some(after) if after.phase == InvestigationPhase::Verifying => {
                after.advance(machine, InvestigationPhase::Deciding)
            }
            _ => {
                warn!(reason = %reason, "investigation stopped after failed verification");
                Ok(())
            }
        }
    }
}
