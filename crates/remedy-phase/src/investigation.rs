//! Investigate-and-remediate pipeline
//!
//! Observing, Analyzing, Deciding and Verifying are dominated by reasoning
//! service or metrics latency and retry in place. Remediating regresses to
//! Deciding so a fresh action is chosen instead of repeating a failed one.

use crate::pipeline::Pipeline;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Phases of an incident investigation cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvestigationPhase {
    /// Cycle created, not started
    Idle,
    /// Collecting signals about the incident
    Observing,
    /// Reasoning service forms hypotheses
    Analyzing,
    /// Choosing a remediation action
    Deciding,
    /// Executing the chosen action
    Remediating,
    /// Checking that the action fixed the incident
    Verifying,
    /// Terminal success
    Completed,
    /// Terminal failure
    Failed,
}

use InvestigationPhase as I;

const ALL: &[InvestigationPhase] = &[
    I::Idle,
    I::Observing,
    I::Analyzing,
    I::Deciding,
    I::Remediating,
    I::Verifying,
    I::Completed,
    I::Failed,
];

impl Pipeline for InvestigationPhase {
    const NAME: &'static str = "investigation";
    const IDLE: Self = I::Idle;
    const COMPLETED: Self = I::Completed;
    const FAILED: Self = I::Failed;

    fn all() -> &'static [Self] {
        ALL
    }

    fn first() -> Self {
        I::Observing
    }

    fn transitions(self) -> &'static [Self] {
        match self {
            I::Idle => &[I::Observing],
            I::Observing => &[I::Observing, I::Analyzing, I::Failed],
            I::Analyzing => &[I::Analyzing, I::Deciding, I::Failed],
            I::Deciding => &[I::Deciding, I::Remediating, I::Analyzing, I::Completed, I::Failed],
            I::Remediating => &[I::Verifying, I::Deciding, I::Failed],
            I::Verifying => &[I::Verifying, I::Completed, I::Deciding, I::Failed],
            I::Completed | I::Failed => &[],
        }
    }

    fn retry_target(self) -> Option<Self> {
        match self {
            I::Observing => Some(I::Observing),
            I::Analyzing => Some(I::Analyzing),
            I::Deciding => Some(I::Deciding),
            I::Remediating => Some(I::Deciding),
            I::Verifying => Some(I::Verifying),
            I::Idle | I::Completed | I::Failed => None,
        }
    }

    fn default_timeout(self) -> Option<Duration> {
        let secs = match self {
            I::Observing => 30,
            I::Analyzing => 120,
            I::Deciding => 60,
            I::Remediating => 180,
            I::Verifying => 120,
            I::Idle | I::Completed | I::Failed => return None,
        };
        Some(Duration::from_secs(secs))
    }

    fn as_str(self) -> &'static str {
        match self {
            I::Idle => "idle",
            I::Observing => "observing",
            I::Analyzing => "analyzing",
            I::Deciding => "deciding",
            I::Remediating => "remediating",
            I::Verifying => "verifying",
            I::Completed => "completed",
            I::Failed => "failed",
        }
    }
}

impl fmt::Display for InvestigationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{is_valid_transition, validate_transition};

    #[test]
    fn forward_path_is_legal() {
        let path = [
            I::Idle,
            I::Observing,
            I::Analyzing,
            I::Deciding,
            I::Remediating,
            I::Verifying,
            I::Completed,
        ];
        for pair in path.windows(2) {
            assert!(validate_transition(pair[0], pair[1]).is_ok(), "{pair:?}");
        }
    }

    #[test]
    fn remediating_regresses_to_deciding() {
        assert_eq!(I::Remediating.retry_target(), Some(I::Deciding));
        assert!(is_valid_transition(I::Remediating, I::Deciding));
        assert!(!is_valid_transition(I::Remediating, I::Remediating));
    }

    #[test]
    fn idle_cannot_skip_ahead() {
        assert!(validate_transition(I::Idle, I::Deciding).is_err());
        assert!(validate_transition(I::Idle, I::Failed).is_err());
    }

    #[test]
    fn names_round_trip() {
        for phase in InvestigationPhase::all() {
            assert_eq!(InvestigationPhase::from_name(phase.as_str()), Some(*phase));
        }
        assert_eq!(InvestigationPhase::from_name("building"), None);
    }
}
