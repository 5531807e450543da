//! Rollback engine errors
//!
//! Policy refusals and failed executions are values, not errors. These are
//! caller mistakes: unknown ids, wrong lifecycle state, empty requests.

use crate::types::RollbackStatus;
use uuid::Uuid;

/// Misuse of the rollback engine API
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RollbackError {
    /// No request with this id was submitted
    #[error("rollback request {0} not found")]
    NotFound(Uuid),

    /// The request's lifecycle state does not allow the operation
    #[error("cannot {operation} rollback request {id} in status {status}")]
    InvalidStatus {
        /// Request id
        id: Uuid,
        /// Status at the time of the call
        status: RollbackStatus,
        /// Refused operation
        operation: &'static str,
    },

    /// A request with this id is already tracked
    #[error("rollback request {0} was already submitted")]
    Duplicate(Uuid),

    /// Nothing to roll back
    #[error("rollback request has no targets")]
    NoTargets,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_status_message() {
        let id = Uuid::nil();
        let err = RollbackError::InvalidStatus {
            id,
            status: RollbackStatus::Completed,
            operation: "approve",
        };
        assert_eq!(
            err.to_string(),
            format!("cannot approve rollback request {id} in status completed")
        );
    }
}
