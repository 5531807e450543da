//! Rollback decision and execution engine
//!
//! # Flow
//!
//! 1. [`RollbackEngine::evaluate_rollback_need`] refuses outright when policy
//!    forbids a rollback, otherwise scores the signals
//! 2. [`RollbackEngine::request_rollback`] parks the request for approval or
//!    executes it immediately
//! 3. Execution runs the cascade check first, then rolls back each target in
//!    order through the injected [`ClusterClient`]
//!
//! State sits behind one `parking_lot::Mutex`; it is never held across a
//! cluster call. The status check that moves a request to `Executing` happens
//! under the lock, so a request executes at most once.

use crate::decision::{assess, default_alternatives, select_trigger};
use crate::error::RollbackError;
use crate::events::RollbackEvent;
use crate::policy::RollbackPolicy;
use crate::types::{
    Approval, Requester, RollbackDecision, RollbackExecution, RollbackRequest, RollbackStatus,
    RollbackTarget, RollbackTrigger, TargetOutcome, Urgency,
};
use crate::verification::VerificationResult;
use chrono::Utc;
use parking_lot::Mutex;
use remedy_actions::{ActionResult, ClusterClient, Target};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Message recorded for every target when no cluster client is injected
pub const NO_CLUSTER_CLIENT: &str = "Kubernetes client not available";

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Default)]
struct EngineState {
    /// Successful rollbacks per correlation
    counts: HashMap<String, u32>,
    last_rollback: HashMap<String, Instant>,
    /// Failed rollback times per correlation
    failures: HashMap<String, Vec<Instant>>,
    requests: HashMap<Uuid, RollbackRequest>,
    history: HashMap<String, Vec<RollbackRequest>>,
}

impl EngineState {
    fn count(&self, correlation_id: &str) -> u32 {
        self.counts.get(correlation_id).copied().unwrap_or(0)
    }

    fn recent_failures(&mut self, correlation_id: &str, window: Duration, now: Instant) -> u32 {
        let Some(times) = self.failures.get_mut(correlation_id) else {
            return 0;
        };
        times.retain(|t| now.duration_since(*t) <= window);
        u32::try_from(times.len()).unwrap_or(u32::MAX)
    }

    /// Automated live rollbacks for a correlation approved but not finished
    fn in_flight_automated(&self, correlation_id: &str) -> u32 {
        let running = self
            .requests
            .values()
            .filter(|r| {
                r.correlation_id == correlation_id
                    && r.requester == Requester::Automated
                    && !r.dry_run
                    && matches!(r.status, RollbackStatus::Approved | RollbackStatus::Executing)
            })
            .count();
        u32::try_from(running).unwrap_or(u32::MAX)
    }

    fn archive(&mut self, request: &RollbackRequest) {
        self.history
            .entry(request.correlation_id.clone())
            .or_default()
            .push(request.clone());
    }
}

/// Rollback decision and execution engine
pub struct RollbackEngine {
    policy: RollbackPolicy,
    cluster: Option<Arc<dyn ClusterClient>>,
    state: Mutex<EngineState>,
    events: broadcast::Sender<RollbackEvent>,
}

impl std::fmt::Debug for RollbackEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RollbackEngine")
            .field("policy", &self.policy)
            .field("has_cluster", &self.cluster.is_some())
            .finish_non_exhaustive()
    }
}

impl RollbackEngine {
    /// Create engine without a cluster client
    #[must_use]
    pub fn new(policy: RollbackPolicy) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            policy,
            cluster: None,
            state: Mutex::new(EngineState::default()),
            events,
        }
    }

    /// With cluster client
    #[must_use]
    pub fn with_cluster(mut self, cluster: Arc<dyn ClusterClient>) -> Self {
        self.cluster = Some(cluster);
        self
    }

    /// Policy in force
    #[inline]
    #[must_use]
    pub fn policy(&self) -> &RollbackPolicy {
        &self.policy
    }

    /// Subscribe to engine events emitted from now on
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RollbackEvent> {
        self.events.subscribe()
    }

    /// Decide whether a remediation must be undone
    #[must_use]
    pub fn evaluate_rollback_need(
        &self,
        result: &ActionResult,
        verification: &VerificationResult,
        correlation_id: &str,
    ) -> RollbackDecision {
        let trigger = select_trigger(verification);
        let affected = vec![result.target.clone()];

        let decision = match self.refusal(trigger, correlation_id) {
            Some((reason, retry_after)) => {
                info!(correlation_id, %trigger, reason = %reason, "rollback refused by policy");
                RollbackDecision {
                    id: Uuid::new_v4(),
                    timestamp: Utc::now(),
                    correlation_id: correlation_id.to_string(),
                    trigger,
                    confidence: 0.0,
                    should_rollback: false,
                    refused: true,
                    urgency: Urgency::Low,
                    affected_resources: affected,
                    reasoning: reason,
                    alternatives: default_alternatives(),
                    retry_after,
                }
            }
            None => {
                let assessment = assess(result, verification, &self.policy);
                let should_rollback = assessment.should_rollback(self.policy.confidence_threshold);
                let reasoning = if assessment.reasons.is_empty() {
                    "No negative signals".to_string()
                } else {
                    assessment.reasons.join("; ")
                };
                info!(
                    correlation_id,
                    %trigger,
                    confidence = assessment.confidence,
                    urgency = %assessment.urgency,
                    should_rollback,
                    "rollback decision"
                );
                RollbackDecision {
                    id: Uuid::new_v4(),
                    timestamp: Utc::now(),
                    correlation_id: correlation_id.to_string(),
                    trigger,
                    confidence: assessment.confidence,
                    should_rollback,
                    refused: false,
                    urgency: assessment.urgency,
                    affected_resources: affected,
                    reasoning,
                    alternatives: if should_rollback {
                        Vec::new()
                    } else {
                        default_alternatives()
                    },
                    retry_after: None,
                }
            }
        };
        self.emit(RollbackEvent::DecisionMade(decision.clone()));
        decision
    }

    fn refusal(&self, trigger: RollbackTrigger, correlation_id: &str) -> Option<(String, Option<Duration>)> {
        if !self.policy.is_trigger_enabled(trigger) {
            return Some((format!("Rollback trigger {trigger} is disabled by policy"), None));
        }
        let state = self.state.lock();
        let count = state.count(correlation_id);
        if count >= self.policy.max_rollbacks_per_correlation {
            return Some((
                format!(
                    "Maximum rollbacks ({}) reached for {correlation_id}",
                    self.policy.max_rollbacks_per_correlation
                ),
                None,
            ));
        }
        if let Some(last) = state.last_rollback.get(correlation_id) {
            let since = Instant::now().duration_since(*last);
            if since < self.policy.cooldown {
                let retry_after = self.policy.cooldown - since;
                return Some((
                    format!(
                        "Rollback cooldown active for {correlation_id}, retry in {}s",
                        retry_after.as_secs()
                    ),
                    Some(retry_after),
                ));
            }
        }
        None
    }

    /// Submit a rollback request
    ///
    /// Returns the request in its latest state: `Pending` when approval is
    /// required, otherwise the state after execution.
    ///
    /// # Errors
    /// - `RollbackError::NoTargets` if the request names no deployments
    /// - `RollbackError::Duplicate` if the id was already submitted
    /// - `RollbackError::InvalidStatus` unless the request is pending
    pub async fn request_rollback(&self, mut request: RollbackRequest) -> Result<RollbackRequest, RollbackError> {
        if request.targets.is_empty() {
            return Err(RollbackError::NoTargets);
        }
        let id = request.id;
        if request.status != RollbackStatus::Pending {
            return Err(RollbackError::InvalidStatus {
                id,
                status: request.status,
                operation: "submit",
            });
        }
        let correlation_id = request.correlation_id.clone();

        let approval_reason = {
            let mut state = self.state.lock();
            if state.requests.contains_key(&id) {
                return Err(RollbackError::Duplicate(id));
            }
            let prior = state.count(&correlation_id) + state.in_flight_automated(&correlation_id);
            let reason = self.approval_reason(&request, prior);
            request.approval_reason.clone_from(&reason);
            state.requests.insert(id, request);
            reason
        };

        info!(request_id = %id, correlation_id = %correlation_id, "rollback requested");
        self.emit(RollbackEvent::RollbackRequested {
            request_id: id,
            correlation_id,
        });

        if let Some(reason) = approval_reason {
            info!(request_id = %id, reason = %reason, "rollback awaiting approval");
            self.emit(RollbackEvent::ApprovalRequired { request_id: id, reason });
            return self.request(id).ok_or(RollbackError::NotFound(id));
        }

        self.approve_locked(id, "policy")?;
        self.execute(id).await
    }

    /// `prior` counts finished and in-flight rollbacks for the correlation
    fn approval_reason(&self, request: &RollbackRequest, prior: u32) -> Option<String> {
        if self.policy.require_approval {
            return Some("Policy requires approval for every rollback".to_string());
        }
        if let Some(protected) = request
            .targets
            .iter()
            .find(|t| self.policy.is_protected(&t.target))
        {
            return Some(format!("Target {} is protected", protected.target));
        }
        if request.requester == Requester::Automated && prior >= 1 {
            return Some(format!(
                "Automated rollback #{} for {} needs approval",
                prior + 1,
                request.correlation_id
            ));
        }
        None
    }

    /// Approve a pending request and execute it
    ///
    /// # Errors
    /// - `RollbackError::NotFound` for an unknown id
    /// - `RollbackError::InvalidStatus` unless the request is pending
    pub async fn approve_rollback(&self, id: Uuid, approved_by: &str) -> Result<RollbackRequest, RollbackError> {
        self.approve_locked(id, approved_by)?;
        self.execute(id).await
    }

    fn approve_locked(&self, id: Uuid, approved_by: &str) -> Result<(), RollbackError> {
        {
            let mut state = self.state.lock();
            let request = state.requests.get_mut(&id).ok_or(RollbackError::NotFound(id))?;
            if request.status != RollbackStatus::Pending {
                return Err(RollbackError::InvalidStatus {
                    id,
                    status: request.status,
                    operation: "approve",
                });
            }
            request.set_status(RollbackStatus::Approved);
            request.approval = Some(Approval {
                approved_by: approved_by.to_string(),
                approved_at: Utc::now(),
            });
        }
        info!(request_id = %id, approved_by, "rollback approved");
        self.emit(RollbackEvent::RollbackApproved {
            request_id: id,
            approved_by: approved_by.to_string(),
        });
        Ok(())
    }

    /// Cancel a pending request
    ///
    /// # Errors
    /// - `RollbackError::NotFound` for an unknown id
    /// - `RollbackError::InvalidStatus` unless the request is pending
    pub fn cancel_rollback(&self, id: Uuid, reason: &str) -> Result<RollbackRequest, RollbackError> {
        let request = {
            let mut state = self.state.lock();
            let request = state.requests.get_mut(&id).ok_or(RollbackError::NotFound(id))?;
            if request.status != RollbackStatus::Pending {
                return Err(RollbackError::InvalidStatus {
                    id,
                    status: request.status,
                    operation: "cancel",
                });
            }
            request.set_status(RollbackStatus::Cancelled);
            request.cancel_reason = Some(reason.to_string());
            let request = request.clone();
            state.archive(&request);
            request
        };
        info!(request_id = %id, reason, "rollback cancelled");
        self.emit(RollbackEvent::RollbackCancelled {
            request_id: id,
            reason: reason.to_string(),
        });
        Ok(request)
    }

    async fn execute(&self, id: Uuid) -> Result<RollbackRequest, RollbackError> {
        let (targets, reason, dry_run, correlation_id) = {
            let mut state = self.state.lock();
            let now = Instant::now();
            let (correlation_id, status) = {
                let request = state.requests.get(&id).ok_or(RollbackError::NotFound(id))?;
                (request.correlation_id.clone(), request.status)
            };
            if status != RollbackStatus::Approved {
                return Err(RollbackError::InvalidStatus {
                    id,
                    status,
                    operation: "execute",
                });
            }

            let failures = state.recent_failures(&correlation_id, self.policy.cascade.failure_window, now);
            let count = state.count(&correlation_id);
            let cascade = if failures >= self.policy.cascade.max_recent_failures {
                Some(format!(
                    "{failures} failed rollbacks for {correlation_id} within {}s",
                    self.policy.cascade.failure_window.as_secs()
                ))
            } else if count >= self.policy.cascade.escalation_threshold {
                Some(format!(
                    "{count} rollbacks already performed for {correlation_id}, escalating"
                ))
            } else {
                None
            };

            let request = state.requests.get_mut(&id).ok_or(RollbackError::NotFound(id))?;
            if let Some(reason) = cascade {
                request.set_status(RollbackStatus::Cancelled);
                request.cancel_reason = Some(format!("Cascade protection: {reason}"));
                let snapshot = request.clone();
                state.archive(&snapshot);
                drop(state);

                warn!(request_id = %id, correlation_id = %correlation_id, reason = %reason, "cascade protection engaged");
                self.emit(RollbackEvent::CascadeProtection {
                    request_id: id,
                    correlation_id,
                    reason,
                });
                return Ok(snapshot);
            }

            request.set_status(RollbackStatus::Executing);
            (
                request.targets.clone(),
                request.reason.clone(),
                request.dry_run,
                correlation_id,
            )
        };

        info!(request_id = %id, correlation_id = %correlation_id, targets = targets.len(), dry_run, "rollback started");
        self.emit(RollbackEvent::RollbackStarted { request_id: id });

        let started_at = Utc::now();
        let mut outcomes = Vec::with_capacity(targets.len());
        for RollbackTarget { target, revision } in targets {
            outcomes.push(self.rollback_target(target, revision, &reason, dry_run).await);
        }
        let success = !outcomes.is_empty() && outcomes.iter().all(|o| o.success);
        let execution = RollbackExecution {
            success,
            outcomes,
            started_at,
            finished_at: Utc::now(),
        };

        let snapshot = {
            let mut state = self.state.lock();
            let now = Instant::now();
            if success {
                if !dry_run {
                    *state.counts.entry(correlation_id.clone()).or_default() += 1;
                    state.last_rollback.insert(correlation_id.clone(), now);
                }
            } else {
                state.failures.entry(correlation_id.clone()).or_default().push(now);
            }
            let request = state.requests.get_mut(&id).ok_or(RollbackError::NotFound(id))?;
            request.set_status(if success {
                RollbackStatus::Completed
            } else {
                RollbackStatus::Failed
            });
            request.result = Some(execution.clone());
            let snapshot = request.clone();
            state.archive(&snapshot);
            snapshot
        };

        if success {
            info!(request_id = %id, correlation_id = %correlation_id, "rollback completed");
            self.emit(RollbackEvent::RollbackCompleted {
                request_id: id,
                result: execution,
            });
        } else {
            error!(request_id = %id, correlation_id = %correlation_id, "rollback failed");
            self.emit(RollbackEvent::RollbackFailed {
                request_id: id,
                result: execution,
            });
        }
        Ok(snapshot)
    }

    async fn rollback_target(&self, target: Target, revision: Option<i64>, reason: &str, dry_run: bool) -> TargetOutcome {
        let Some(cluster) = &self.cluster else {
            warn!(target = %target, "{NO_CLUSTER_CLIENT}");
            return TargetOutcome::failed(target, NO_CLUSTER_CLIENT);
        };
        match cluster.rollback(&target, revision, reason, dry_run).await {
            Ok(outcome) => TargetOutcome {
                success: outcome.success,
                from_revision: outcome.from_revision,
                to_revision: outcome.to_revision,
                error: if outcome.success {
                    None
                } else {
                    Some(outcome.error.unwrap_or_else(|| "rollback reported failure".to_string()))
                },
                target,
            },
            Err(err) => {
                warn!(target = %target, error = %err, "cluster rollback call failed");
                TargetOutcome::failed(target, err.to_string())
            }
        }
    }

    /// Successful rollbacks recorded for a correlation
    #[must_use]
    pub fn get_rollback_count(&self, correlation_id: &str) -> u32 {
        self.state.lock().count(correlation_id)
    }

    /// Requests waiting for approval, oldest first
    #[must_use]
    pub fn get_pending_approvals(&self) -> Vec<RollbackRequest> {
        let mut pending: Vec<_> = self
            .state
            .lock()
            .requests
            .values()
            .filter(|r| r.status == RollbackStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|r| r.created_at);
        pending
    }

    /// Finished requests for a correlation, in completion order
    #[must_use]
    pub fn get_history(&self, correlation_id: &str) -> Vec<RollbackRequest> {
        self.state
            .lock()
            .history
            .get(correlation_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Latest state of a submitted request
    #[must_use]
    pub fn request(&self, id: Uuid) -> Option<RollbackRequest> {
        self.state.lock().requests.get(&id).cloned()
    }

    fn emit(&self, event: RollbackEvent) {
        let _ = self.events.send(event);
    }
}
