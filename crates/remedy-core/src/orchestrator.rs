//! Remediation orchestrator
//!
//! Composition root wiring the action registry, cooldown manager, rollback
//! engine and both phase machines together. The cycle drivers live in
//! [`investigation`](crate::investigation) and
//! [`regeneration`](crate::regeneration).

use crate::config::RemedyConfig;
use crate::error::{CoreError, StoreError};
use crate::store::CycleStore;
use remedy_actions::{
    ActionExecutor, ActionRegistry, ActionRequest, ActionResult, ClusterClient, ClusterExecutor,
    CooldownManager, ExecutionMode, SimulatedExecutor,
};
use remedy_phase::{
    CycleId, CycleSnapshot, InvestigationMachine, PhaseStateMachine, Pipeline, RegenerationMachine,
};
use remedy_rollback::{RollbackDecision, RollbackEngine, RollbackRequest, VerificationResult};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// What happened after a remediation was verified
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemediationAssessment {
    /// Action succeeded and verification passed
    pub healthy: bool,
    /// Rollback decision, when the remediation was not healthy
    pub decision: Option<RollbackDecision>,
    /// Rollback request raised from the decision, in whatever status the
    /// engine left it (completed, failed, pending approval, cancelled)
    pub rollback: Option<RollbackRequest>,
}

/// Main orchestrator
pub struct RemediationOrchestrator {
    config: RemedyConfig,
    registry: ActionRegistry,
    cooldowns: Arc<CooldownManager>,
    rollback: RollbackEngine,
    investigation: InvestigationMachine,
    regeneration: RegenerationMachine,
    store: Option<Arc<dyn CycleStore>>,
}

impl std::fmt::Debug for RemediationOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemediationOrchestrator")
            .field("registry", &self.registry)
            .field("cooldowns", &self.cooldowns.len())
            .field("rollback", &self.rollback)
            .field("investigation", &self.investigation)
            .field("regeneration", &self.regeneration)
            .field("store", &self.store.is_some())
            .finish_non_exhaustive()
    }
}

impl RemediationOrchestrator {
    /// Build from validated configuration
    ///
    /// Built-in actions are registered with the simulated executor; live
    /// execution needs [`with_cluster`](Self::with_cluster).
    pub fn new(config: RemedyConfig) -> Result<Self, CoreError> {
        config.validate()?;

        let registry = ActionRegistry::with_defaults();
        let simulated: Arc<dyn ActionExecutor> = Arc::new(SimulatedExecutor::new());
        let kinds = registry.definitions().into_iter().map(|d| d.kind);
        registry.register_executor_for_all(kinds, ExecutionMode::Simulated, &simulated);

        let cooldowns = Arc::new(CooldownManager::new(config.cooldown_config(&registry.definitions())));
        let rollback = RollbackEngine::new(config.rollback_policy());
        let investigation = InvestigationMachine::new(config.investigation_config()?);
        let regeneration = RegenerationMachine::new(config.regeneration_config()?);

        Ok(Self {
            config,
            registry,
            cooldowns,
            rollback,
            investigation,
            regeneration,
            store: None,
        })
    }

    /// With cluster client for live actions and rollbacks
    #[must_use]
    pub fn with_cluster(mut self, cluster: Arc<dyn ClusterClient>) -> Self {
        let executor: Arc<dyn ActionExecutor> = Arc::new(ClusterExecutor::new(Arc::clone(&cluster)));
        let registered = self.registry.register_executor_for_all(
            ClusterExecutor::supported_kinds(),
            ExecutionMode::Live,
            &executor,
        );
        info!(registered, "cluster executor registered");
        self.rollback = self.rollback.with_cluster(cluster);
        self
    }

    /// With cycle store for persist and resume
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn CycleStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &RemedyConfig {
        &self.config
    }

    #[inline]
    #[must_use]
    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    #[inline]
    #[must_use]
    pub fn cooldowns(&self) -> &CooldownManager {
        &self.cooldowns
    }

    #[inline]
    #[must_use]
    pub fn rollback(&self) -> &RollbackEngine {
        &self.rollback
    }

    #[inline]
    #[must_use]
    pub fn investigation(&self) -> &InvestigationMachine {
        &self.investigation
    }

    #[inline]
    #[must_use]
    pub fn regeneration(&self) -> &RegenerationMachine {
        &self.regeneration
    }

    /// Validate, take a cooldown slot and execute
    ///
    /// Invalid requests never consume a slot. Dry runs skip the cooldown
    /// entirely. A blocked request comes back as a failed result carrying
    /// `retry_after_ms` in its details.
    pub async fn execute_action(&self, request: &ActionRequest, mode: ExecutionMode) -> ActionResult {
        let report = self.registry.validate_request(request);
        if !report.valid {
            warn!(
                request_id = %request.id,
                kind = %request.kind,
                target = %request.target,
                errors = %report.error_summary(),
                "action rejected by validation"
            );
            return ActionResult::failure(request, mode, report.error_summary()).with_details(json!({
                "errors": report.errors,
                "warnings": report.warnings,
            }));
        }

        if !request.dry_run {
            let check = self.cooldowns.try_acquire(&request.target, &request.kind);
            if !check.allowed {
                let reason = check.reason.unwrap_or_else(|| "Blocked by cooldown".to_string());
                let retry_after_ms = check
                    .retry_after
                    .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX));
                warn!(
                    kind = %request.kind,
                    target = %request.target,
                    retry_after_ms,
                    "action blocked by cooldown"
                );
                return ActionResult::failure(request, mode, reason.clone()).with_details(json!({
                    "blocked": "cooldown",
                    "reason": reason,
                    "retry_after_ms": retry_after_ms,
                }));
            }
        }

        self.registry.execute(request, mode).await
    }

    /// Judge a verified remediation and roll it back when warranted
    ///
    /// A healthy outcome clears the target's cooldown so follow-up work is
    /// not throttled by an incident that is already resolved.
    pub async fn assess_remediation(
        &self,
        result: &ActionResult,
        verification: &VerificationResult,
        correlation_id: &str,
    ) -> Result<RemediationAssessment, CoreError> {
        if result.success && verification.success {
            self.cooldowns.clear_cooldown(&result.target);
            debug!(correlation_id, target = %result.target, "remediation healthy");
            return Ok(RemediationAssessment {
                healthy: true,
                decision: None,
                rollback: None,
            });
        }

        let decision = self
            .rollback
            .evaluate_rollback_need(result, verification, correlation_id);
        let rollback = if decision.should_rollback {
            let request = RollbackRequest::from_decision(&decision).with_dry_run(result.dry_run);
            let request = self.rollback.request_rollback(request).await?;
            info!(
                correlation_id,
                rollback_id = %request.id,
                status = %request.status,
                "rollback requested after failed remediation"
            );
            Some(request)
        } else {
            None
        };

        Ok(RemediationAssessment {
            healthy: false,
            decision: Some(decision),
            rollback,
        })
    }

    /// Save the loaded investigation cycle; `None` without a store or cycle
    pub async fn persist_investigation(&self) -> Result<Option<CycleId>, CoreError> {
        self.persist(&self.investigation).await
    }

    /// Save the loaded regeneration cycle; `None` without a store or cycle
    pub async fn persist_regeneration(&self) -> Result<Option<CycleId>, CoreError> {
        self.persist(&self.regeneration).await
    }

    /// Load a stored investigation cycle into the machine
    pub async fn resume_investigation(&self, cycle_id: CycleId) -> Result<(), CoreError> {
        self.resume(&self.investigation, cycle_id).await
    }

    /// Load a stored regeneration cycle into the machine
    pub async fn resume_regeneration(&self, cycle_id: CycleId) -> Result<(), CoreError> {
        self.resume(&self.regeneration, cycle_id).await
    }

    async fn persist<P: Pipeline>(&self, machine: &PhaseStateMachine<P>) -> Result<Option<CycleId>, CoreError> {
        let (Some(store), Some(snapshot)) = (&self.store, machine.snapshot()) else {
            return Ok(None);
        };
        let cycle_id = snapshot.cycle.id;
        store.save(P::NAME, cycle_id, snapshot.to_json()?).await?;
        debug!(%cycle_id, pipeline = P::NAME, phase = %snapshot.cycle.phase, "cycle persisted");
        Ok(Some(cycle_id))
    }

    async fn resume<P: Pipeline>(&self, machine: &PhaseStateMachine<P>, cycle_id: CycleId) -> Result<(), CoreError> {
        let store = self.store.as_ref().ok_or(CoreError::NoStore)?;
        let stored = store
            .load(P::NAME, cycle_id)
            .await?
            .ok_or(CoreError::CycleNotFound {
                pipeline: P::NAME,
                cycle_id,
            })?;
        let snapshot = CycleSnapshot::<P>::from_json(&stored.payload)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        machine.resume(snapshot)?;
        info!(%cycle_id, pipeline = P::NAME, phase = %machine.phase(), "cycle resumed");
        Ok(())
    }

    /// Persist after a driver step; failures are logged, not fatal
    pub(crate) async fn checkpoint<P: Pipeline>(&self, machine: &PhaseStateMachine<P>) {
        if let Err(err) = self.persist(machine).await {
            warn!(pipeline = P::NAME, error = %err, "failed to persist cycle");
        }
    }

    /// Periodically evict idle cooldown entries
    ///
    /// Needs a running Tokio runtime.
    #[must_use]
    pub fn spawn_maintenance(&self, interval: Duration) -> MaintenanceHandle {
        let cooldowns = Arc::clone(&self.cooldowns);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        debug!("maintenance stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let evicted = cooldowns.cleanup();
                        if evicted > 0 {
                            info!(evicted, remaining = cooldowns.len(), "evicted idle cooldown entries");
                        }
                    }
                }
            }
        });

        info!(interval_secs = interval.as_secs(), "maintenance started");
        MaintenanceHandle {
            shutdown: shutdown_tx,
            task,
        }
    }
}

/// Running maintenance task
#[derive(Debug)]
pub struct MaintenanceHandle {
    shutdown: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl MaintenanceHandle {
    /// Signal the task and wait for it to finish
    pub async fn stop(self) {
        let _ = self.shutdown.send(()).await;
        if let Err(err) = self.task.await {
            warn!(error = %err, "maintenance task ended abnormally");
        }
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Position of a cycle at the moment a driver step began
///
/// A deadline can move the cycle while the driver awaits a collaborator; a
/// result is only applied if the stamp still matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Stamp<P> {
    cycle_id: CycleId,
    pub(crate) phase: P,
    retries: u32,
}

impl<P: Pipeline> Stamp<P> {
    pub(crate) fn of(machine: &PhaseStateMachine<P>) -> Option<Self> {
        machine.cycle().map(|cycle| Self {
            cycle_id: cycle.id,
            phase: cycle.phase,
            retries: cycle.retries(cycle.phase),
        })
    }

    /// Cycle is in a working phase
    pub(crate) fn is_open(self) -> bool {
        self.phase != P::IDLE && !self.phase.is_terminal()
    }

    fn current(self, machine: &PhaseStateMachine<P>) -> bool {
        Self::of(machine) == Some(self)
    }

    /// Move to `to` if the cycle has not moved on
    pub(crate) fn advance(self, machine: &PhaseStateMachine<P>, to: P) -> Result<(), CoreError> {
        if !self.current(machine) {
            debug!(phase = %self.phase, "cycle moved while waiting, dropping step result");
            return Ok(());
        }
        match machine.transition(to) {
            Err(_) if !self.current(machine) => Ok(()),
            other => other.map_err(CoreError::from),
        }
    }

    /// Spend a retry (retryable) or fail the cycle (not retryable)
    pub(crate) fn setback(self, machine: &PhaseStateMachine<P>, reason: &str, retryable: bool) -> Result<(), CoreError> {
        if !self.current(machine) {
            return Ok(());
        }
        warn!(phase = %self.phase, reason, retryable, "step failed");
        let outcome = if retryable {
            machine.retry_current(reason).map(|_| ())
        } else {
            machine.fail(reason, false)
        };
        match outcome {
            Err(_) if !self.current(machine) => Ok(()),
            other => other.map_err(CoreError::from),
        }
    }
}
