//! Regenerate-and-redeploy pipeline
//!
//! Requirement analysis and code generation are reasoning-bound and retry in
//! place. Test, build and deploy failures regress to regenerate the artifact
//! instead of repeating the same broken build.

use crate::pipeline::Pipeline;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Phases of a code regeneration cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegenerationPhase {
    Idle,
    AnalyzingRequirements,
    GeneratingCode,
    Testing,
    Building,
    Deploying,
    Verifying,
    Completed,
    Failed,
}

use RegenerationPhase as R;

const ALL: &[RegenerationPhase] = &[
    R::Idle,
    R::AnalyzingRequirements,
    R::GeneratingCode,
    R::Testing,
    R::Building,
    R::Deploying,
    R::Verifying,
    R::Completed,
    R::Failed,
];

impl Pipeline for RegenerationPhase {
    const NAME: &'static str = "regeneration";
    const IDLE: Self = R::Idle;
    const COMPLETED: Self = R::Completed;
    const FAILED: Self = R::Failed;

    fn all() -> &'static [Self] {
        ALL
    }

    fn first() -> Self {
        R::AnalyzingRequirements
    }

    fn transitions(self) -> &'static [Self] {
        match self {
            R::Idle => &[R::AnalyzingRequirements],
            R::AnalyzingRequirements => &[R::AnalyzingRequirements, R::GeneratingCode, R::Failed],
            R::GeneratingCode => &[
                R::GeneratingCode,
                R::Testing,
                R::AnalyzingRequirements,
                R::Failed,
            ],
            R::Testing => &[R::Building, R::GeneratingCode, R::Failed],
            R::Building => &[R::Deploying, R::GeneratingCode, R::Failed],
            R::Deploying => &[R::Verifying, R::Building, R::GeneratingCode, R::Failed],
            R::Verifying => &[R::Completed, R::Deploying, R::GeneratingCode, R::Failed],
            R::Completed | R::Failed => &[],
        }
    }

    fn retry_target(self) -> Option<Self> {
        match self {
            R::AnalyzingRequirements => Some(R::AnalyzingRequirements),
            R::GeneratingCode => Some(R::GeneratingCode),
            R::Testing | R::Building => Some(R::GeneratingCode),
            R::Deploying => Some(R::Building),
            R::Verifying => Some(R::Deploying),
            R::Idle | R::Completed | R::Failed => None,
        }
    }

    fn default_timeout(self) -> Option<Duration> {
        let secs = match self {
            R::AnalyzingRequirements => 120,
            R::GeneratingCode | R::Testing | R::Building | R::Deploying => 300,
            R::Verifying => 180,
            R::Idle | R::Completed | R::Failed => return None,
        };
        Some(Duration::from_secs(secs))
    }

    fn as_str(self) -> &'static str {
        match self {
            R::Idle => "idle",
            R::AnalyzingRequirements => "analyzing_requirements",
            R::GeneratingCode => "generating_code",
            R::Testing => "testing",
            R::Building => "building",
            R::Deploying => "deploying",
            R::Verifying => "verifying",
            R::Completed => "completed",
            R::Failed => "failed",
        }
    }
}

impl fmt::Display for RegenerationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{is_valid_transition, retries_in_place};

    #[test]
    fn failing_tests_send_cycle_back_to_generation() {
        assert_eq!(R::Testing.retry_target(), Some(R::GeneratingCode));
        assert!(is_valid_transition(R::Testing, R::GeneratingCode));
    }

    #[test]
    fn only_reasoning_phases_retry_in_place() {
        let in_place: Vec<_> = RegenerationPhase::all()
            .iter()
            .copied()
            .filter(|p| retries_in_place(*p))
            .collect();
        assert_eq!(in_place, vec![R::AnalyzingRequirements, R::GeneratingCode]);
    }

    #[test]
    fn every_retry_target_is_reachable() {
        for phase in RegenerationPhase::all() {
            if let Some(target) = phase.retry_target() {
                assert!(is_valid_transition(*phase, target), "{phase} -> {target}");
            }
        }
    }
}
