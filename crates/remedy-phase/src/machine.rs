//! Generic timed phase state machine
//!
//! One [`PhaseStateMachine`] owns at most one live cycle. Every transition
//! bumps a generation counter, aborts the outgoing deadline and arms a new
//! one stamped with the new generation. A deadline only acts if its
//! generation and phase still match when it fires, so a timer racing a
//! transition is a no-op.
//!
//! # Retry policy
//!
//! When a deadline expires (or a caller reports a transient failure through
//! [`PhaseStateMachine::retry_current`]) the phase consumes one unit of its
//! retry budget and moves to its retry target. Once the budget is spent the
//! cycle moves to the failed phase with a non-recoverable error.

use crate::config::PhaseConfig;
use crate::cycle::{Cycle, CycleError, CycleId, CycleSnapshot};
use crate::error::PhaseError;
use crate::events::CycleEvent;
use crate::pipeline::{self, Pipeline};
use chrono::Utc;
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Result of applying the retry policy to the active phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome<P: Pipeline> {
    /// Budget remained; the cycle moved to the retry target
    Retrying {
        phase: P,
        target: P,
        /// Retries consumed by `phase` including this one
        attempt: u32,
        max_retries: u32,
    },
    /// Budget exhausted; the cycle moved to the failed phase
    Exhausted { phase: P, retries: u32 },
}

impl<P: Pipeline> RetryOutcome<P> {
    /// Retry budget for the phase is used up
    #[inline]
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }
}

#[derive(Debug, Clone, Copy)]
enum RetryCause<'a> {
    Deadline,
    Failure(&'a str),
}

struct MachineState<P: Pipeline> {
    cycle: Option<Cycle<P>>,
    generation: u64,
    deadline: Option<JoinHandle<()>>,
    phase_started: Instant,
}

impl<P: Pipeline> MachineState<P> {
    fn cancel_deadline(&mut self) {
        if let Some(handle) = self.deadline.take() {
            handle.abort();
        }
    }

    fn is_active(&self) -> bool {
        self.cycle.as_ref().is_some_and(|c| !c.is_terminal())
    }
}

impl<P: Pipeline> Drop for MachineState<P> {
    fn drop(&mut self) {
        self.cancel_deadline();
    }
}

struct Shared<P: Pipeline> {
    config: PhaseConfig<P>,
    state: Mutex<MachineState<P>>,
    events: broadcast::Sender<CycleEvent<P>>,
}

/// Timed phase state machine driving one cycle at a time
///
/// Cloning yields another handle to the same machine.
pub struct PhaseStateMachine<P: Pipeline> {
    shared: Arc<Shared<P>>,
}

impl<P: Pipeline> Clone for PhaseStateMachine<P> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<P: Pipeline> fmt::Debug for PhaseStateMachine<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("PhaseStateMachine")
            .field("pipeline", &P::NAME)
            .field("cycle_id", &state.cycle.as_ref().map(|c| c.id))
            .field("phase", &state.cycle.as_ref().map(|c| c.phase))
            .field("generation", &state.generation)
            .finish()
    }
}

impl<P: Pipeline> Default for PhaseStateMachine<P> {
    fn default() -> Self {
        Self::new(PhaseConfig::default())
    }
}

impl<P: Pipeline> PhaseStateMachine<P> {
    /// Create an idle machine
    #[must_use]
    pub fn new(config: PhaseConfig<P>) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(MachineState {
                    cycle: None,
                    generation: 0,
                    deadline: None,
                    phase_started: Instant::now(),
                }),
                events,
            }),
        }
    }

    /// Retry and timeout settings
    #[inline]
    #[must_use]
    pub fn config(&self) -> &PhaseConfig<P> {
        &self.shared.config
    }

    /// Subscribe to lifecycle events emitted from now on
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CycleEvent<P>> {
        self.shared.events.subscribe()
    }

    /// Load an idle cycle and move it to the pipeline's first phase
    ///
    /// # Errors
    /// - `PhaseError::AlreadyActive` if a non-terminal cycle is loaded
    /// - `PhaseError::NotIdle` if `cycle` is not in the idle phase
    pub fn start(&self, cycle: Cycle<P>) -> Result<(), PhaseError> {
        let mut state = self.shared.state.lock();
        if let Some(active) = state.cycle.as_ref().filter(|c| !c.is_terminal()) {
            return Err(PhaseError::AlreadyActive {
                cycle_id: active.id,
            });
        }
        if cycle.phase != P::IDLE {
            return Err(PhaseError::NotIdle {
                phase: cycle.phase.to_string(),
            });
        }

        info!(cycle_id = %cycle.id, pipeline = P::NAME, "starting cycle");
        state.cancel_deadline();
        state.phase_started = Instant::now();
        state.cycle = Some(cycle);
        self.transition_locked(&mut state, P::first())
    }

    /// Move the active cycle to `to`
    ///
    /// # Errors
    /// - `PhaseError::NoActiveCycle` if no cycle is loaded
    /// - `PhaseError::InvalidTransition` if the move is not in the table
    pub fn transition(&self, to: P) -> Result<(), PhaseError> {
        let mut state = self.shared.state.lock();
        self.transition_locked(&mut state, to)
    }

    /// Pure transition-table lookup
    #[inline]
    #[must_use]
    pub fn is_valid_transition(&self, from: P, to: P) -> bool {
        pipeline::is_valid_transition(from, to)
    }

    /// Apply deadline handling to the active phase immediately
    pub fn force_timeout(&self) -> Result<RetryOutcome<P>, PhaseError> {
        let mut state = self.shared.state.lock();
        state.deadline = None;
        self.retry_locked(&mut state, RetryCause::Deadline)
    }

    /// Spend one retry on the active phase after a transient failure
    ///
    /// The reason is recorded as a recoverable error on the cycle.
    pub fn retry_current(&self, reason: &str) -> Result<RetryOutcome<P>, PhaseError> {
        let mut state = self.shared.state.lock();
        self.retry_locked(&mut state, RetryCause::Failure(reason))
    }

    /// Record an error against the active phase without moving
    pub fn record_error(&self, message: impl Into<String>, recoverable: bool) -> Result<(), PhaseError> {
        let mut state = self.shared.state.lock();
        let cycle = state.cycle.as_mut().ok_or(PhaseError::NoActiveCycle)?;
        cycle.error = Some(CycleError {
            phase: cycle.phase,
            message: message.into(),
            recoverable,
        });
        cycle.updated_at = Utc::now();
        Ok(())
    }

    /// Record an error and move the cycle to the failed phase
    pub fn fail(&self, message: impl Into<String>, recoverable: bool) -> Result<(), PhaseError> {
        let mut state = self.shared.state.lock();
        let cycle = state.cycle.as_mut().ok_or(PhaseError::NoActiveCycle)?;
        pipeline::validate_transition(cycle.phase, P::FAILED)?;
        cycle.error = Some(CycleError {
            phase: cycle.phase,
            message: message.into(),
            recoverable,
        });
        self.transition_locked(&mut state, P::FAILED)
    }

    /// Move the cycle to the completed phase
    pub fn complete(&self) -> Result<(), PhaseError> {
        self.transition(P::COMPLETED)
    }

    /// Attach a context entry to the active cycle
    pub fn set_context(&self, key: impl Into<String>, value: impl Into<String>) -> Result<(), PhaseError> {
        let mut state = self.shared.state.lock();
        let cycle = state.cycle.as_mut().ok_or(PhaseError::NoActiveCycle)?;
        cycle.context.insert(key.into(), value.into());
        Ok(())
    }

    /// Cancel the deadline and drop the loaded cycle
    pub fn reset(&self) {
        let mut state = self.shared.state.lock();
        state.cancel_deadline();
        state.generation = state.generation.wrapping_add(1);
        if let Some(cycle) = state.cycle.take() {
            debug!(cycle_id = %cycle.id, pipeline = P::NAME, "cycle reset");
        }
    }

    /// Snapshot the loaded cycle for persistence
    #[must_use]
    pub fn snapshot(&self) -> Option<CycleSnapshot<P>> {
        self.shared
            .state
            .lock()
            .cycle
            .clone()
            .map(CycleSnapshot::new)
    }

    /// Rehydrate a persisted cycle without re-running `start`
    ///
    /// Retry counters are kept and the deadline for the snapshot's phase is
    /// re-armed from zero.
    ///
    /// # Errors
    /// - `PhaseError::PipelineMismatch` if the snapshot is from another pipeline
    /// - `PhaseError::AlreadyActive` if a cycle is running
    /// - `PhaseError::NotResumable` if the snapshot is idle or terminal
    pub fn resume(&self, snapshot: CycleSnapshot<P>) -> Result<(), PhaseError> {
        if snapshot.pipeline != P::NAME {
            return Err(PhaseError::PipelineMismatch {
                expected: P::NAME.to_string(),
                found: snapshot.pipeline,
            });
        }

        let mut state = self.shared.state.lock();
        if let Some(active) = state.cycle.as_ref().filter(|c| !c.is_terminal()) {
            return Err(PhaseError::AlreadyActive {
                cycle_id: active.id,
            });
        }

        let cycle = snapshot.cycle;
        let phase = cycle.phase;
        if phase == P::IDLE || phase.is_terminal() {
            return Err(PhaseError::NotResumable {
                phase: phase.to_string(),
            });
        }

        let cycle_id = cycle.id;
        info!(cycle_id = %cycle_id, pipeline = P::NAME, phase = %phase, "resuming cycle");
        state.cancel_deadline();
        state.generation = state.generation.wrapping_add(1);
        state.phase_started = Instant::now();
        state.cycle = Some(cycle);
        self.emit(CycleEvent::PhaseEntered { cycle_id, phase });
        let generation = state.generation;
        state.deadline = self.arm_deadline(phase, generation);
        Ok(())
    }

    /// Current phase, idle when no cycle is loaded
    #[must_use]
    pub fn phase(&self) -> P {
        self.shared
            .state
            .lock()
            .cycle
            .as_ref()
            .map_or(P::IDLE, |c| c.phase)
    }

    /// Clone of the loaded cycle
    /// Copy of the loaded cycle
    #[must_use]
    pub fn cycle(&self) -> Option<Cycle<P>> {
        self.shared.state.lock().cycle.clone()
    }

    /// Id of the loaded cycle
    #[must_use]
    pub fn cycle_id(&self) -> Option<CycleId> {
        self.shared.state.lock().cycle.as_ref().map(|c| c.id)
    }

    /// Whether a non-terminal cycle is loaded
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.shared.state.lock().is_active()
    }

    /// Time spent in the current phase
    #[must_use]
    pub fn phase_elapsed(&self) -> Duration {
        let state = self.shared.state.lock();
        if state.cycle.is_some() {
            state.phase_started.elapsed()
        } else {
            Duration::ZERO
        }
    }

    /// Retries consumed by `phase` in the loaded cycle
    #[must_use]
    pub fn retries(&self, phase: P) -> u32 {
        self.shared
            .state
            .lock()
            .cycle
            .as_ref()
            .map_or(0, |c| c.retries(phase))
    }

    fn transition_locked(&self, state: &mut MachineState<P>, to: P) -> Result<(), PhaseError> {
        let cycle = state.cycle.as_mut().ok_or(PhaseError::NoActiveCycle)?;
        let from = cycle.phase;
        pipeline::validate_transition(from, to)?;

        state.generation = state.generation.wrapping_add(1);
        if let Some(handle) = state.deadline.take() {
            handle.abort();
        }

        let now = Utc::now();
        let elapsed = state.phase_started.elapsed();
        cycle.phase = to;
        cycle.updated_at = now;
        let cycle_id = cycle.id;

        info!(cycle_id = %cycle_id, pipeline = P::NAME, from = %from, to = %to, "phase transition");
        self.emit(CycleEvent::PhaseExited {
            cycle_id,
            phase: from,
            elapsed,
        });
        self.emit(CycleEvent::PhaseChanged { cycle_id, from, to });
        self.emit(CycleEvent::PhaseEntered { cycle_id, phase: to });
        state.phase_started = Instant::now();

        if to == P::COMPLETED {
            cycle.completed_at = Some(now);
            let duration = cycle.total_duration();
            info!(cycle_id = %cycle_id, pipeline = P::NAME, ?duration, "cycle completed");
            self.emit(CycleEvent::CycleCompleted { cycle_id, duration });
        } else if to == P::FAILED {
            let error = cycle.error.clone();
            warn!(
                cycle_id = %cycle_id,
                pipeline = P::NAME,
                phase = %from,
                error = error.as_ref().map_or("unspecified", |e| e.message.as_str()),
                "cycle failed"
            );
            self.emit(CycleEvent::CycleFailed {
                cycle_id,
                phase: from,
                error,
            });
        } else {
            let generation = state.generation;
            state.deadline = self.arm_deadline(to, generation);
        }
        Ok(())
    }

    fn retry_locked(
        &self,
        state: &mut MachineState<P>,
        cause: RetryCause<'_>,
    ) -> Result<RetryOutcome<P>, PhaseError> {
        let cycle = state.cycle.as_mut().ok_or(PhaseError::NoActiveCycle)?;
        let phase = cycle.phase;
        let target = phase.retry_target().ok_or_else(|| PhaseError::NotRetryable {
            phase: phase.to_string(),
        })?;
        let cycle_id = cycle.id;
        let max_retries = self.shared.config.max_retries_for(phase);
        let used = cycle.retries(phase);

        match cause {
            RetryCause::Deadline => {
                warn!(cycle_id = %cycle_id, pipeline = P::NAME, phase = %phase, retries = used, max_retries, "phase timed out");
                self.emit(CycleEvent::PhaseTimeout {
                    cycle_id,
                    phase,
                    retries: used,
                    max_retries,
                });
            }
            RetryCause::Failure(reason) => {
                cycle.error = Some(CycleError {
                    phase,
                    message: reason.to_string(),
                    recoverable: true,
                });
            }
        }

        if used < max_retries {
            let attempt = used + 1;
            cycle.phase_retries.insert(phase, attempt);
            info!(cycle_id = %cycle_id, phase = %phase, target = %target, attempt, max_retries, "retrying phase");
            self.transition_locked(state, target)?;
            Ok(RetryOutcome::Retrying {
                phase,
                target,
                attempt,
                max_retries,
            })
        } else {
            let message = match cause {
                RetryCause::Deadline => {
                    format!("Phase {phase} timed out after exhausting {max_retries} retries")
                }
                RetryCause::Failure(reason) => {
                    format!("Phase {phase} failed after exhausting {max_retries} retries: {reason}")
                }
            };
            cycle.error = Some(CycleError {
                phase,
                message,
                recoverable: false,
            });
            self.transition_locked(state, P::FAILED)?;
            Ok(RetryOutcome::Exhausted {
                phase,
                retries: used,
            })
        }
    }

    fn arm_deadline(&self, phase: P, generation: u64) -> Option<JoinHandle<()>> {
        let timeout = self.shared.config.timeout_for(phase)?;
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(pipeline = P::NAME, phase = %phase, "no tokio runtime, phase deadline disabled");
            return None;
        };
        let weak: Weak<Shared<P>> = Arc::downgrade(&self.shared);
        Some(runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(shared) = weak.upgrade() {
                PhaseStateMachine { shared }.on_deadline(phase, generation);
            }
        }))
    }

    fn on_deadline(&self, phase: P, generation: u64) {
        let mut state = self.shared.state.lock();
        let current = state.cycle.as_ref().map(|c| c.phase);
        if state.generation != generation || current != Some(phase) {
            debug!(pipeline = P::NAME, phase = %phase, generation, "stale phase deadline ignored");
            return;
        }
        // The firing task is this one; drop its handle instead of aborting it.
        state.deadline = None;
        if let Err(err) = self.retry_locked(&mut state, RetryCause::Deadline) {
            warn!(pipeline = P::NAME, phase = %phase, error = %err, "deadline handling failed");
        }
    }

    fn emit(&self, event: CycleEvent<P>) {
        // No subscribers is not an error.
        let _ = self.shared.events.send(event);
    }

    #[cfg(test)]
    fn generation(&self) -> u64 {
        self.shared.state.lock().generation
    }
}
