//! Action definitions and the built-in catalogue

use crate::types::{ActionKind, ExecutionMode, RiskLevel};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Static description of an action kind
///
/// Immutable after registration except for `enabled`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDefinition {
    pub kind: ActionKind,
    /// Human-readable name
    pub name: String,
    pub description: String,
    pub required_params: Vec<String>,
    pub optional_params: Vec<String>,
    pub risk: RiskLevel,
    /// Whether the caller is expected to confirm (and give a reason)
    pub requires_confirmation: bool,
    pub supported_modes: Vec<ExecutionMode>,
    /// Minimum spacing between two actions of this kind on one target
    pub cooldown: Duration,
    pub enabled: bool,
}

impl ActionDefinition {
    /// Create definition supporting both modes, enabled, low risk
    #[must_use]
    pub fn new(kind: ActionKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            description: String::new(),
            required_params: Vec::new(),
            optional_params: Vec::new(),
            risk: RiskLevel::Low,
            requires_confirmation: false,
            supported_modes: vec![ExecutionMode::Live, ExecutionMode::Simulated],
            cooldown: Duration::from_secs(60),
            enabled: true,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[inline]
    #[must_use]
    pub fn with_required(mut self, param: impl Into<String>) -> Self {
        self.required_params.push(param.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn with_optional(mut self, param: impl Into<String>) -> Self {
        self.optional_params.push(param.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn with_risk(mut self, risk: RiskLevel) -> Self {
        self.risk = risk;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_confirmation(mut self, required: bool) -> Self {
        self.requires_confirmation = required;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_modes(mut self, modes: impl IntoIterator<Item = ExecutionMode>) -> Self {
        self.supported_modes = modes.into_iter().collect();
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
    pub fn supports(&self, mode: ExecutionMode) -> bool {
        self.supported_modes.contains(&mode)
    }
}

/// Built-in definitions registered by
/// [`ActionRegistry::with_defaults`](crate::registry::ActionRegistry::with_defaults)
#[must_use]
pub fn builtin_definitions() -> Vec<ActionDefinition> {
    vec![
        ActionDefinition::new(ActionKind::RESTART, "Restart deployment")
            .with_description("Rolling restart of every pod in a deployment")
            .with_risk(RiskLevel::Medium)
            .with_cooldown(Duration::from_secs(60)),
        ActionDefinition::new(ActionKind::SCALE, "Scale deployment")
            .with_description("Set the replica count of a deployment")
            .with_required("replicas")
            .with_risk(RiskLevel::Medium)
            .with_cooldown(Duration::from_secs(30)),
        ActionDefinition::new(ActionKind::ROLLBACK, "Roll back deployment")
            .with_description("Revert a deployment to a previous revision")
            .with_optional("revision")
            .with_risk(RiskLevel::High)
            .with_cooldown(Duration::from_secs(120)),
        ActionDefinition::new(ActionKind::DELETE_POD, "Delete pod")
            .with_description("Delete a single pod so its controller recreates it")
            .with_optional("grace_period_seconds")
            .with_risk(RiskLevel::Low)
            .with_cooldown(Duration::from_secs(30)),
        ActionDefinition::new(ActionKind::CORDON, "Cordon node")
            .with_description("Mark a node unschedulable")
            .with_risk(RiskLevel::Critical)
            .with_confirmation(true)
            .with_modes([ExecutionMode::Simulated])
            .with_cooldown(Duration::from_secs(300)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_unique_and_enabled() {
        let defs = builtin_definitions();
        let mut kinds: Vec<_> = defs.iter().map(|d| d.kind.clone()).collect();
        kinds.sort();
        kinds.dedup();
        assert_eq!(kinds.len(), defs.len());
        assert!(defs.iter().all(|d| d.enabled));
    }

    #[test]
    fn scale_requires_replicas() {
        let scale = builtin_definitions()
            .into_iter()
            .find(|d| d.kind == ActionKind::SCALE)
            .unwrap();
        assert_eq!(scale.required_params, vec!["replicas".to_string()]);
        assert!(scale.supports(ExecutionMode::Live));
    }
}
