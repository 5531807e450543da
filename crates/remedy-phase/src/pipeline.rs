//! Pipeline definition trait and transition-table helpers
//!
//! A pipeline is a closed enum of phases with a static transition table.
//! Every pipeline starts in an idle phase and ends in exactly one of two
//! terminal phases (`COMPLETED`, `FAILED`).

use crate::error::PhaseError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::hash::Hash;
use std::time::Duration;

/// A fixed, ordered set of phases with a transition table
///
/// Implementors are plain `Copy` enums; all table lookups are static.
pub trait Pipeline:
    Copy
    + Eq
    + Ord
    + Hash
    + fmt::Debug
    + fmt::Display
    + Send
    + Sync
    + Serialize
    + DeserializeOwned
    + 'static
{
    /// Pipeline name, stamped into snapshots
    const NAME: &'static str;
    /// Phase a fresh cycle sits in before `start`
    const IDLE: Self;
    /// Successful terminal phase
    const COMPLETED: Self;
    /// Failed terminal phase
    const FAILED: Self;

    /// Every phase in pipeline order
    fn all() -> &'static [Self];

    /// First working phase entered by `start`
    fn first() -> Self;

    /// Phases this phase may legally move to
    fn transitions(self) -> &'static [Self];

    /// Where a timed-out or failed phase goes when it retries
    ///
    /// `None` for idle and terminal phases.
    fn retry_target(self) -> Option<Self>;

    /// Built-in deadline for the phase, `None` when untimed
    fn default_timeout(self) -> Option<Duration>;

    /// Stable snake_case name
    fn as_str(self) -> &'static str;

    /// Whether the phase is `COMPLETED` or `FAILED`
    #[inline]
    fn is_terminal(self) -> bool {
        self == Self::COMPLETED || self == Self::FAILED
    }

    /// Look up a phase by its stable name
    fn from_name(name: &str) -> Option<Self> {
        Self::all().iter().copied().find(|p| p.as_str() == name)
    }
}

/// Pure transition-table lookup
#[inline]
#[must_use]
pub fn is_valid_transition<P: Pipeline>(from: P, to: P) -> bool {
    from.transitions().contains(&to)
}

/// Phases reachable from `from` in one step
#[must_use]
pub fn allowed_transitions<P: Pipeline>(from: P) -> Vec<P> {
    from.transitions().to_vec()
}

/// Validates a transition, returning an error for moves outside the table
pub fn validate_transition<P: Pipeline>(from: P, to: P) -> Result<(), PhaseError> {
    if is_valid_transition(from, to) {
        Ok(())
    } else {
        Err(PhaseError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

/// Whether the phase retries itself rather than regressing
#[inline]
#[must_use]
pub fn retries_in_place<P: Pipeline>(phase: P) -> bool {
    phase.retry_target() == Some(phase)
}
