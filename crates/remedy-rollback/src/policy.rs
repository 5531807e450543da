//! Rollback policy

use crate::types::RollbackTrigger;
use remedy_actions::Target;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Cascade-protection thresholds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeSettings {
    /// Lookback for counting failed rollbacks
    pub failure_window: Duration,
    /// Failed rollbacks inside the window that stop further attempts
    pub max_recent_failures: u32,
    /// Successful rollbacks per correlation that stop further attempts
    pub escalation_threshold: u32,
}

impl Default for CascadeSettings {
    fn default() -> Self {
        Self {
            failure_window: Duration::from_secs(300),
            max_recent_failures: 2,
            escalation_threshold: 3,
        }
    }
}

/// Policy governing rollback decisions and execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackPolicy {
    pub enabled_triggers: BTreeSet<RollbackTrigger>,
    pub max_rollbacks_per_correlation: u32,
    /// Minimum spacing between rollbacks for one correlation
    pub cooldown: Duration,
    pub confidence_threshold: f64,
    /// Regression (percent) at which urgency is at least high
    pub severe_regression_pct: f64,
    /// Require approval for every rollback
    pub require_approval: bool,
    pub protected_namespaces: BTreeSet<String>,
    /// Deployments as `namespace/name`
    pub protected_deployments: BTreeSet<String>,
    pub cascade: CascadeSettings,
}

impl Default for RollbackPolicy {
    fn default() -> Self {
        Self {
            enabled_triggers: RollbackTrigger::ALL.into_iter().collect(),
            max_rollbacks_per_correlation: 3,
            cooldown: Duration::from_secs(60),
            confidence_threshold: 0.6,
            severe_regression_pct: 50.0,
            require_approval: false,
            protected_namespaces: BTreeSet::from(["kube-system".to_string()]),
            protected_deployments: BTreeSet::new(),
            cascade: CascadeSettings::default(),
        }
    }
}

impl RollbackPolicy {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn with_require_approval(mut self, required: bool) -> Self {
        self.require_approval = required;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_confidence_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_max_rollbacks(mut self, max: u32) -> Self {
        self.max_rollbacks_per_correlation = max;
        self
    }

    #[must_use]
    pub fn with_trigger_disabled(mut self, trigger: RollbackTrigger) -> Self {
        self.enabled_triggers.remove(&trigger);
        self
    }

    #[must_use]
    pub fn with_protected_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.protected_namespaces.insert(namespace.into());
        self
    }

    #[must_use]
    pub fn with_protected_deployment(mut self, target: &Target) -> Self {
        self.protected_deployments.insert(target.to_string());
        self
    }

    #[inline]
    #[must_use]
    pub fn with_cascade(mut self, cascade: CascadeSettings) -> Self {
        self.cascade = cascade;
        self
    }

    #[inline]
    #[must_use]
    pub fn is_trigger_enabled(&self, trigger: RollbackTrigger) -> bool {
        self.enabled_triggers.contains(&trigger)
    }

    /// Whether the target sits in a protected namespace or is protected itself
    #[must_use]
    pub fn is_protected(&self, target: &Target) -> bool {
        self.protected_namespaces.contains(&target.namespace)
            || self.protected_deployments.contains(&target.to_string())
    }
}
