//! Error types for actions, executors and the cluster client seam

use crate::types::{ActionKind, ExecutionMode};

/// Registry error
///
/// Only returned by registration calls. Request validation and execution
/// report problems through [`ValidationReport`](crate::types::ValidationReport)
/// and failed [`ActionResult`](crate::types::ActionResult) values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    #[error("Unknown action type: {0}")]
    UnknownKind(ActionKind),

    #[error("action {kind} does not support {mode} execution")]
    UnsupportedMode { kind: ActionKind, mode: ExecutionMode },
}

/// Error raised by an executor back-end
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutorError {
    #[error("executor unavailable: {0}")]
    Unavailable(String),

    #[error("request rejected by executor: {0}")]
    Rejected(String),

    #[error("execution failed: {0}")]
    Failed(String),

    #[error(transparent)]
    Cluster(#[from] ClusterError),
}

impl ExecutorError {
    /// Whether a later attempt could plausibly succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Unavailable(_) | Self::Failed(_) => true,
            Self::Rejected(_) => false,
            Self::Cluster(err) => err.is_retryable(),
        }
    }
}

/// Error raised by a cluster client implementation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClusterError {
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: String,
        namespace: String,
        name: String,
    },

    #[error("cluster API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("cluster request timed out after {0}ms")]
    Timeout(u64),

    #[error("cluster unreachable: {0}")]
    Unreachable(String),
}

impl ClusterError {
    /// Whether the request may succeed if repeated
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Unreachable(_) => true,
            Self::Api { status, .. } => *status >= 500 || *status == 429,
            Self::NotFound { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_kind_message() {
        let err = ActionError::UnknownKind(ActionKind::new("drain_cluster"));
        assert_eq!(err.to_string(), "Unknown action type: drain_cluster");
    }

    #[test]
    fn cluster_error_classification() {
        assert!(ClusterError::Timeout(5_000).is_retryable());
        assert!(ClusterError::Api {
            status: 503,
            message: "overloaded".into()
        }
        .is_retryable());
        assert!(!ClusterError::Api {
            status: 403,
            message: "forbidden".into()
        }
        .is_retryable());

        let wrapped: ExecutorError = ClusterError::NotFound {
            kind: "deployment".into(),
            namespace: "prod".into(),
            name: "api".into(),
        }
        .into();
        assert!(!wrapped.is_retryable());
        assert_eq!(wrapped.to_string(), "deployment prod/api not found");
    }
}
