//! Remedy Actions (remedy-actions)
//!
//! Action safety layer:
//! - [`ActionRegistry`]: definitions, validation and executor dispatch
//! - [`CooldownManager`]: per-target spacing and windowed rate limits
//! - [`ClusterClient`]: injected cluster API seam used by live executors

pub mod cluster;
pub mod cooldown;
pub mod definition;
pub mod error;
pub mod executor;
pub mod registry;
pub mod types;

pub use cluster::{ClusterClient, DeploymentInfo, RollbackOutcome};
pub use cooldown::{CooldownCheck, CooldownConfig, CooldownEntry, CooldownManager, CooldownStatus};
pub use definition::{builtin_definitions, ActionDefinition};
pub use error::{ActionError, ClusterError, ExecutorError};
pub use executor::{ActionExecutor, ClusterExecutor, ExecutionOutcome, SimulatedExecutor};
pub use registry::ActionRegistry;
pub use types::{
    ActionKind, ActionRequest, ActionResult, ExecutionMode, RiskLevel, Target, ValidationReport,
};
