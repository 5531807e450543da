//! Remedy Phase (remedy-phase)
//!
//! Generic timed state machine for multi-phase remediation cycles:
//! 1. **Pipelines**: closed phase enums with static transition tables
//! 2. **Machine**: one live cycle, per-phase deadlines, retry budgets and
//!    fallback paths, lifecycle events
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use remedy_phase::prelude::*;
//!
//! let machine = InvestigationMachine::default();
//! let mut events = machine.subscribe();
//!
//! machine.start(Cycle::new().with_context("incident", "inc-42"))?;
//! machine.transition(InvestigationPhase::Analyzing)?;
//! ```

pub mod config;
pub mod cycle;
pub mod error;
pub mod events;
pub mod investigation;
pub mod machine;
pub mod pipeline;
pub mod regeneration;

pub use config::PhaseConfig;
pub use cycle::{Cycle, CycleError, CycleId, CycleSnapshot};
pub use error::PhaseError;
pub use events::CycleEvent;
pub use investigation::InvestigationPhase;
pub use machine::{PhaseStateMachine, RetryOutcome};
pub use pipeline::{allowed_transitions, is_valid_transition, validate_transition, Pipeline};
pub use regeneration::RegenerationPhase;

/// Machine driving investigate-and-remediate cycles
pub type InvestigationMachine = PhaseStateMachine<InvestigationPhase>;

/// Machine driving regenerate-and-redeploy cycles
pub type RegenerationMachine = PhaseStateMachine<RegenerationPhase>;

/// Re-export common types for convenience
pub mod prelude {
    pub use crate::{
        Cycle, CycleEvent, CycleId, CycleSnapshot, InvestigationMachine, InvestigationPhase,
        PhaseConfig, PhaseError, PhaseStateMachine, Pipeline, RegenerationMachine,
        RegenerationPhase, RetryOutcome,
    };
}
