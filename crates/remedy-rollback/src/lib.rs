//! Remedy Rollback (remedy-rollback)
//!
//! Decides whether a failed remediation must be undone and carries out the
//! undo under policy, approval gating and cascade protection.

pub mod decision;
pub mod engine;
pub mod error;
pub mod events;
pub mod policy;
pub mod types;
pub mod verification;

pub use decision::{assess, default_alternatives, select_trigger, Assessment, MAX_CONFIDENCE};
pub use engine::{RollbackEngine, NO_CLUSTER_CLIENT};
pub use error::RollbackError;
pub use events::RollbackEvent;
pub use policy::{CascadeSettings, RollbackPolicy};
pub use types::{
    AlternativeAction, Approval, Requester, RollbackDecision, RollbackExecution, RollbackRequest,
    RollbackStatus, RollbackTarget, RollbackTrigger, TargetOutcome, Urgency,
};
pub use verification::{HealthCheck, LogAnalysis, MetricComparison, VerificationResult};
