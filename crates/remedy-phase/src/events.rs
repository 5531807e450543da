//! Cycle lifecycle events
//!
//! Events are fanned out over a `tokio::sync::broadcast` channel in emission
//! order. For a transition the order is always exited, changed, entered.

use crate::cycle::{CycleError, CycleId};
use crate::pipeline::Pipeline;
use std::time::Duration;

/// Lifecycle event emitted by a phase state machine
#[derive(Debug, Clone, PartialEq)]
pub enum CycleEvent<P: Pipeline> {
    PhaseEntered {
        cycle_id: CycleId,
        phase: P,
    },
    PhaseExited {
        cycle_id: CycleId,
        phase: P,
        /// Time spent in the phase
        elapsed: Duration,
    },
    PhaseChanged {
        cycle_id: CycleId,
        from: P,
        to: P,
    },
    PhaseTimeout {
        cycle_id: CycleId,
        phase: P,
        /// Retries already consumed when the deadline fired
        retries: u32,
        max_retries: u32,
    },
    CycleCompleted {
        cycle_id: CycleId,
        duration: Duration,
    },
    CycleFailed {
        cycle_id: CycleId,
        /// Phase the cycle failed from
        phase: P,
        error: Option<CycleError<P>>,
    },
}

impl<P: Pipeline> CycleEvent<P> {
    /// Stable wire name of the event
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::PhaseEntered { .. } => "phase:entered",
            Self::PhaseExited { .. } => "phase:exited",
            Self::PhaseChanged { .. } => "phase:changed",
            Self::PhaseTimeout { .. } => "phase:timeout",
            Self::CycleCompleted { .. } => "cycle:completed",
            Self::CycleFailed { .. } => "cycle:failed",
        }
    }

    /// Cycle the event belongs to
    #[must_use]
    pub fn cycle_id(&self) -> CycleId {
        match self {
            Self::PhaseEntered { cycle_id, .. }
            | Self::PhaseExited { cycle_id, .. }
            | Self::PhaseChanged { cycle_id, .. }
            | Self::PhaseTimeout { cycle_id, .. }
            | Self::CycleCompleted { cycle_id, .. }
            | Self::CycleFailed { cycle_id, .. } => *cycle_id,
        }
    }
}
