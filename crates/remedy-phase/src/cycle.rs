//! Cycle record and persisted snapshot
//!
//! A [`Cycle`] is one run of a pipeline. The running copy is owned by its
//! [`PhaseStateMachine`](crate::machine::PhaseStateMachine); callers only
//! ever see clones. [`CycleSnapshot`] is the shape written to and read from
//! an external store to resume a cycle after a restart.

use crate::error::PhaseError;
use crate::pipeline::Pipeline;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use ulid::Ulid;

/// Unique cycle identifier (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CycleId(pub Ulid);

impl CycleId {
    /// Generate new cycle ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for CycleId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CycleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CycleId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ulid::from_string(s).map(Self)
    }
}

/// Terminal error recorded on a cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(deserialize = "P: Pipeline"))]
pub struct CycleError<P: Pipeline> {
    /// Phase the error was recorded in
    pub phase: P,
    /// Human-readable description
    pub message: String,
    /// Whether a fresh cycle could plausibly succeed
    pub recoverable: bool,
}

/// One run of a multi-phase pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "P: Pipeline"))]
pub struct Cycle<P: Pipeline> {
    pub id: CycleId,
    pub phase: P,
    /// Retries consumed, keyed by the phase that timed out or failed
    pub phase_retries: BTreeMap<P, u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<CycleError<P>>,
    /// Free-form context (incident id, target service, ...)
    #[serde(default)]
    pub context: BTreeMap<String, String>,
}

impl<P: Pipeline> Cycle<P> {
    /// Create an idle cycle with a fresh id
    #[must_use]
    pub fn new() -> Self {
        Self::with_id(CycleId::new())
    }

    /// Create an idle cycle with a caller-supplied id
    #[must_use]
    pub fn with_id(id: CycleId) -> Self {
        let now = Utc::now();
        Self {
            id,
            phase: P::IDLE,
            phase_retries: BTreeMap::new(),
            created_at: now,
            updated_at: now,
            completed_at: None,
            error: None,
            context: BTreeMap::new(),
        }
    }

    /// Attach a context entry
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Retries consumed by `phase`
    #[inline]
    #[must_use]
    pub fn retries(&self, phase: P) -> u32 {
        self.phase_retries.get(&phase).copied().unwrap_or(0)
    }

    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Wall-clock duration from creation to completion (or now)
    #[must_use]
    pub fn total_duration(&self) -> std::time::Duration {
        let end = self.completed_at.unwrap_or_else(Utc::now);
        (end - self.created_at).to_std().unwrap_or_default()
    }
}

impl<P: Pipeline> Default for Cycle<P> {
    fn default() -> Self {
        Self::new()
    }
}

/// Persisted form of a cycle, tagged with its pipeline name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "P: Pipeline"))]
pub struct CycleSnapshot<P: Pipeline> {
    pub pipeline: String,
    pub cycle: Cycle<P>,
}

impl<P: Pipeline> CycleSnapshot<P> {
    /// Snapshot a cycle
    #[must_use]
    pub fn new(cycle: Cycle<P>) -> Self {
        Self {
            pipeline: P::NAME.to_string(),
            cycle,
        }
    }

    pub fn to_json(&self) -> Result<String, PhaseError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, PhaseError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::investigation::InvestigationPhase;
    use pretty_assertions::assert_eq;

    #[test]
    fn cycle_id_generation() {
        assert_ne!(CycleId::new(), CycleId::new());
    }

    #[test]
    fn cycle_id_parses_display() {
        let id = CycleId::new();
        let parsed: CycleId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn new_cycle_is_idle() {
        let cycle = Cycle::<InvestigationPhase>::new().with_context("incident", "inc-42");
        assert_eq!(cycle.phase, InvestigationPhase::Idle);
        assert_eq!(cycle.retries(InvestigationPhase::Analyzing), 0);
        assert_eq!(cycle.context.get("incident").map(String::as_str), Some("inc-42"));
    }

    #[test]
    fn snapshot_keeps_retry_counters() {
        let mut cycle = Cycle::<InvestigationPhase>::new();
        cycle.phase = InvestigationPhase::Verifying;
        cycle.phase_retries.insert(InvestigationPhase::Verifying, 2);
        cycle.error = Some(CycleError {
            phase: InvestigationPhase::Deciding,
            message: "reasoning service unavailable".to_string(),
            recoverable: true,
        });

        let json = CycleSnapshot::new(cycle.clone()).to_json().unwrap();
        assert!(json.contains("\"verifying\":2"));

        let restored = CycleSnapshot::<InvestigationPhase>::from_json(&json).unwrap();
        assert_eq!(restored.pipeline, "investigation");
        assert_eq!(restored.cycle, cycle);
    }
}
