//! Error types for the phase state machine
//!
//! Only caller or configuration defects surface as [`PhaseError`]. Phase
//! timeouts and retries are routine and are reported through events and
//! [`RetryOutcome`](crate::machine::RetryOutcome) values instead.

use crate::cycle::CycleId;

/// Phase state machine error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PhaseError {
    /// A cycle is already running on this machine
    #[error("cycle {cycle_id} is already active")]
    AlreadyActive {
        /// The cycle currently owning the machine
        cycle_id: CycleId,
    },

    /// Operation needs a cycle but none is loaded
    #[error("no active cycle")]
    NoActiveCycle,

    /// `start` was handed a cycle that is not idle
    #[error("cycle must start from idle, found phase {phase}")]
    NotIdle { phase: String },

    /// Requested transition is not in the transition table
    #[error("invalid phase transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// Phase has no retry path (idle or terminal)
    #[error("phase {phase} cannot be retried")]
    NotRetryable { phase: String },

    /// Snapshot was produced by a different pipeline
    #[error("snapshot belongs to pipeline {found}, expected {expected}")]
    PipelineMismatch { expected: String, found: String },

    /// Snapshot phase cannot be resumed (idle or terminal)
    #[error("cycle in phase {phase} cannot be resumed")]
    NotResumable { phase: String },

    /// Snapshot could not be encoded or decoded
    #[error("snapshot codec error: {0}")]
    Snapshot(String),
}

impl PhaseError {
    /// Whether the error indicates a caller or configuration defect
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidTransition { .. }
                | Self::NotRetryable { .. }
                | Self::PipelineMismatch { .. }
                | Self::Snapshot(_)
        )
    }
}

impl From<serde_json::Error> for PhaseError {
    fn from(value: serde_json::Error) -> Self {
        Self::Snapshot(value.to_string())
    }
}
