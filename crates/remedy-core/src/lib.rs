//! Remedy Core - remediation orchestrator
//!
//! Composition root for the remediation engine:
//! - Loads and validates [`RemedyConfig`]
//! - Owns the action registry, cooldown manager, rollback engine and both
//!   phase machines
//! - Drives investigation and regeneration cycles against injected
//!   reasoning, verification and delivery collaborators
//! - Persists and resumes cycles through a [`CycleStore`]
//!
//! # Example
//!
//! ```rust,ignore
//! use remedy_core::prelude::*;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let orchestrator = RemediationOrchestrator::new(RemedyConfig::new())?;
//! let target = Target::new("prod", "api");
//! let incident = Incident::new("inc-42", "api returning 502s", target.clone());
//!
//! let report = orchestrator
//!     .run_investigation(&incident, &SimulatedReasoning::new(target), &SimulatedVerifier::healthy())
//!     .await?;
//! println!("cycle ended in {}", report.cycle.phase);
//! # Ok(())
//! # }
//! ```

#![allow(missing_docs)]

pub mod config;
pub mod delivery;
pub mod error;
pub mod investigation;
pub mod orchestrator;
pub mod reasoning;
pub mod regeneration;
pub mod simulation;
pub mod store;
pub mod verifier;

pub use config::{CooldownSettings, PhaseSettings, PipelineSettings, RemedyConfig, RollbackSettings};
pub use delivery::{BuildArtifact, DeliveryBackend, TestReport};
pub use error::{ConfigError, CoreError, DeliveryError, ReasoningError, StoreError, VerifierError};
pub use investigation::{Incident, InvestigationReport};
pub use orchestrator::{MaintenanceHandle, RemediationAssessment, RemediationOrchestrator};
pub use reasoning::{Hypothesis, Judgment, ProposedAction, ReasoningRequest, ReasoningService, ReasoningTask};
pub use regeneration::{ChangeRequest, RegenerationReport};
pub use simulation::{SimulatedCluster, SimulatedReasoning, SimulatedVerifier};
pub use store::{CycleStore, InMemoryCycleStore, StoredCycle};
pub use verifier::Verifier;

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for driving remediation cycles
    pub use crate::{
        ChangeRequest, CoreError, CycleStore, DeliveryBackend, InMemoryCycleStore, Incident,
        ReasoningService, RemediationOrchestrator, RemedyConfig, SimulatedReasoning,
        SimulatedVerifier, Verifier,
    };
    pub use remedy_actions::{ActionKind, ActionRequest, ActionResult, ExecutionMode, Target};
    pub use remedy_phase::{InvestigationPhase, RegenerationPhase};
    pub use remedy_rollback::{RollbackStatus, VerificationResult};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
