//! Rollback engine events

use crate::types::{RollbackDecision, RollbackExecution};
use uuid::Uuid;

/// Event emitted by the rollback engine, in emission order
#[derive(Debug, Clone, PartialEq)]
pub enum RollbackEvent {
    DecisionMade(RollbackDecision),
    RollbackRequested {
        request_id: Uuid,
        correlation_id: String,
    },
    ApprovalRequired {
        request_id: Uuid,
        reason: String,
    },
    RollbackApproved {
        request_id: Uuid,
        approved_by: String,
    },
    RollbackStarted {
        request_id: Uuid,
    },
    RollbackCompleted {
        request_id: Uuid,
        result: RollbackExecution,
    },
    RollbackFailed {
        request_id: Uuid,
        result: RollbackExecution,
    },
    RollbackCancelled {
        request_id: Uuid,
        reason: String,
    },
    CascadeProtection {
        request_id: Uuid,
        correlation_id: String,
        reason: String,
    },
}

impl RollbackEvent {
    /// Stable wire name of the event
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::DecisionMade(_) => "decisionMade",
            Self::RollbackRequested { .. } => "rollbackRequested",
            Self::ApprovalRequired { .. } => "approvalRequired",
            Self::RollbackApproved { .. } => "rollbackApproved",
            Self::RollbackStarted { .. } => "rollbackStarted",
            Self::RollbackCompleted { .. } => "rollbackCompleted",
            Self::RollbackFailed { .. } => "rollbackFailed",
            Self::RollbackCancelled { .. } => "rollbackCancelled",
            Self::CascadeProtection { .. } => "cascadeProtection",
        }
    }
}
