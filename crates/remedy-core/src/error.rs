//! Error types for Remedy Core
//!
//! Provides error handling for:
//! - Configuration loading and validation
//! - Reasoning, verification and delivery collaborators
//! - Cycle persistence
//! - Phase and rollback engine misuse surfacing from the drivers

use remedy_phase::{CycleId, PhaseError};
use remedy_rollback::RollbackError;
use std::path::PathBuf;

/// Main orchestration error type
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Phase machine rejected an operation
    #[error("phase error: {0}")]
    Phase(#[from] PhaseError),

    /// Rollback engine rejected an operation
    #[error("rollback error: {0}")]
    Rollback(#[from] RollbackError),

    /// Configuration could not be loaded or is invalid
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Cycle store failure
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Reasoning service failed outside a running cycle
    #[error("reasoning failed: {0}")]
    Reasoning(#[from] ReasoningError),

    /// Persistence was requested without a store
    #[error("no cycle store configured")]
    NoStore,

    /// Nothing stored under the requested id
    #[error("no stored {pipeline} cycle {cycle_id}")]
    CycleNotFound {
        /// Pipeline name
        pipeline: &'static str,
        /// Requested cycle
        cycle_id: CycleId,
    },
}

impl CoreError {
    /// Check if retrying the operation could succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Reasoning(e) => e.is_retryable(),
            Self::Store(e) => e.is_retryable(),
            Self::Phase(_)
            | Self::Rollback(_)
            | Self::Config(_)
            | Self::NoStore
            | Self::CycleNotFound { .. } => false,
        }
    }

    /// Check if the error points at a programming or configuration defect
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Phase(e) => e.is_fatal(),
            Self::Config(_) | Self::NoStore => true,
            _ => false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// TOML did not parse into the configuration schema
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// A phase override names a phase the pipeline does not have
    #[error("unknown {pipeline} phase: {phase}")]
    UnknownPhase { pipeline: &'static str, phase: String },

    /// A value is outside its allowed range
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Reasoning service errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReasoningError {
    /// Service did not answer in time
    #[error("reasoning timed out after {0}ms")]
    Timeout(u64),

    /// Service could not be reached
    #[error("reasoning service unavailable: {0}")]
    Unavailable(String),

    /// Service answered with something unusable
    #[error("invalid reasoning response: {0}")]
    InvalidResponse(String),
}

impl ReasoningError {
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Unavailable(_))
    }
}

/// Verifier errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifierError {
    /// Signals (metrics, health checks, logs) could not be collected
    #[error("verification signals unavailable: {0}")]
    Unavailable(String),

    /// Verifier cannot judge this kind of action
    #[error("cannot verify: {0}")]
    Unsupported(String),
}

impl VerifierError {
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Delivery backend errors (tests, builds, deploys)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// Backend could not be reached
    #[error("delivery backend unavailable: {0}")]
    Unavailable(String),

    /// Stage ran and failed
    #[error("{stage} failed: {message}")]
    Failed { stage: &'static str, message: String },

    /// Stage cannot be attempted with the given input
    #[error("{stage} rejected: {message}")]
    Rejected { stage: &'static str, message: String },
}

impl DeliveryError {
    /// Transient outages and ordinary stage failures are worth another attempt
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Failed { .. })
    }
}

/// Cycle store errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Backing storage failed
    #[error("storage backend error: {0}")]
    Backend(String),

    /// Stored payload could not be decoded
    #[error("corrupt stored cycle: {0}")]
    Corrupt(String),
}

impl StoreError {
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Backend(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let timeout = CoreError::from(ReasoningError::Timeout(30_000));
        assert!(timeout.is_retryable());
        assert!(!timeout.is_fatal());

        let invalid = CoreError::from(ReasoningError::InvalidResponse("empty".into()));
        assert!(!invalid.is_retryable());

        let transition = CoreError::from(PhaseError::InvalidTransition {
            from: "idle".into(),
            to: "verifying".into(),
        });
        assert!(transition.is_fatal());
        assert!(!transition.is_retryable());
    }

    #[test]
    fn delivery_rejection_is_final() {
        let rejected = DeliveryError::Rejected {
            stage: "deploy",
            message: "no artifact".into(),
        };
        assert!(!rejected.is_retryable());
        assert_eq!(rejected.to_string(), "deploy rejected: no artifact");
    }
}
