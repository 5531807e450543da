//! Phase machine configuration

use crate::pipeline::Pipeline;
use std::collections::HashMap;
use std::time::Duration;

/// Default retry budget for every timed phase
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default broadcast capacity for lifecycle events
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Retry budgets and deadlines for one pipeline
#[derive(Debug, Clone)]
pub struct PhaseConfig<P: Pipeline> {
    /// Retry budget for phases without an override
    pub default_max_retries: u32,
    /// Per-phase retry budget overrides
    pub max_retries: HashMap<P, u32>,
    /// Per-phase deadline overrides
    pub timeouts: HashMap<P, Duration>,
    /// Capacity of the lifecycle event channel
    pub event_capacity: usize,
}

impl<P: Pipeline> PhaseConfig<P> {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With global retry budget
    #[inline]
    #[must_use]
    pub fn with_default_max_retries(mut self, retries: u32) -> Self {
        self.default_max_retries = retries;
        self
    }

    /// With retry budget override for one phase
    #[inline]
    #[must_use]
    pub fn with_max_retries(mut self, phase: P, retries: u32) -> Self {
        self.max_retries.insert(phase, retries);
        self
    }

    /// With deadline override for one phase
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, phase: P, timeout: Duration) -> Self {
        self.timeouts.insert(phase, timeout);
        self
    }

    /// Retry budget for `phase`
    #[inline]
    #[must_use]
    pub fn max_retries_for(&self, phase: P) -> u32 {
        self.max_retries
            .get(&phase)
            .copied()
            .unwrap_or(self.default_max_retries)
    }

    /// Deadline for `phase`; idle and terminal phases are never timed
    #[must_use]
    pub fn timeout_for(&self, phase: P) -> Option<Duration> {
        if phase == P::IDLE || phase.is_terminal() {
            return None;
        }
        self.timeouts
            .get(&phase)
            .copied()
            .or_else(|| phase.default_timeout())
    }
}

impl<P: Pipeline> Default for PhaseConfig<P> {
    fn default() -> Self {
        Self {
            default_max_retries: DEFAULT_MAX_RETRIES,
            max_retries: HashMap::new(),
            timeouts: HashMap::new(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::investigation::InvestigationPhase;

    #[test]
    fn overrides_take_precedence() {
        let config = PhaseConfig::new()
            .with_default_max_retries(2)
            .with_max_retries(InvestigationPhase::Analyzing, 5)
            .with_timeout(InvestigationPhase::Analyzing, Duration::from_secs(9));

        assert_eq!(config.max_retries_for(InvestigationPhase::Analyzing), 5);
        assert_eq!(config.max_retries_for(InvestigationPhase::Deciding), 2);
        assert_eq!(
            config.timeout_for(InvestigationPhase::Analyzing),
            Some(Duration::from_secs(9))
        );
        assert_eq!(
            config.timeout_for(InvestigationPhase::Observing),
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn terminal_phases_are_untimed() {
        let config = PhaseConfig::<InvestigationPhase>::new()
            .with_timeout(InvestigationPhase::Completed, Duration::from_secs(1));
        assert_eq!(config.timeout_for(InvestigationPhase::Completed), None);
        assert_eq!(config.timeout_for(InvestigationPhase::Idle), None);
    }
}
