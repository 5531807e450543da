//! Remedy configuration
//!
//! One TOML document configures every crate. Durations are whole seconds and
//! phase overrides are keyed by phase name:
//!
//! ```toml
//! maintenance_interval_secs = 30
//! default_mode = "simulated"
//!
//! [phases.investigation.max_retries]
//! analyzing = 5
//!
//! [phases.regeneration.timeout_secs]
//! testing = 600
//!
//! [cooldown]
//! max_actions_per_window = 3
//!
//! [rollback]
//! require_approval = true
//! protected_namespaces = ["kube-system", "payments"]
//! ```

use crate::error::ConfigError;
use remedy_actions::{ActionDefinition, ActionKind, CooldownConfig, ExecutionMode};
use remedy_phase::config::DEFAULT_MAX_RETRIES;
use remedy_phase::{InvestigationPhase, PhaseConfig, Pipeline, RegenerationPhase};
use remedy_rollback::{CascadeSettings, RollbackPolicy, RollbackTrigger};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemedyConfig {
    pub phases: PhaseSettings,
    pub cooldown: CooldownSettings,
    pub rollback: RollbackSettings,
    /// Period of the cooldown cleanup task
    pub maintenance_interval_secs: u64,
    /// Mode used by the cycle drivers when executing proposed actions
    pub default_mode: ExecutionMode,
}

impl Default for RemedyConfig {
    fn default() -> Self {
        Self {
            phases: PhaseSettings::default(),
            cooldown: CooldownSettings::default(),
            rollback: RollbackSettings::default(),
            maintenance_interval_secs: 60,
            default_mode: ExecutionMode::Live,
        }
    }
}

/// Retry and deadline settings for both pipelines
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseSettings {
    /// Retry budget for phases without an override
    pub default_max_retries: u32,
    pub investigation: PipelineSettings,
    pub regeneration: PipelineSettings,
}

impl Default for PhaseSettings {
    fn default() -> Self {
        Self {
            default_max_retries: DEFAULT_MAX_RETRIES,
            investigation: PipelineSettings::default(),
            regeneration: PipelineSettings::default(),
        }
    }
}

/// Per-phase overrides for one pipeline, keyed by phase name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub max_retries: BTreeMap<String, u32>,
    pub timeout_secs: BTreeMap<String, u64>,
}

/// Action spacing and rate limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CooldownSettings {
    pub default_cooldown_secs: u64,
    pub window_secs: u64,
    pub max_actions_per_window: u32,
    /// Per-kind overrides; applied on top of the registry's definitions
    pub per_kind_secs: BTreeMap<String, u64>,
}

impl Default for CooldownSettings {
    fn default() -> Self {
        let defaults = CooldownConfig::default();
        Self {
            default_cooldown_secs: defaults.default_cooldown.as_secs(),
            window_secs: defaults.window.as_secs(),
            max_actions_per_window: defaults.max_actions_per_window,
            per_kind_secs: BTreeMap::new(),
        }
    }
}

/// Rollback policy thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RollbackSettings {
    pub confidence_threshold: f64,
    pub max_rollbacks_per_correlation: u32,
    pub cooldown_secs: u64,
    pub severe_regression_pct: f64,
    pub require_approval: bool,
    pub protected_namespaces: Vec<String>,
    /// Deployments as `namespace/name`
    pub protected_deployments: Vec<String>,
    pub disabled_triggers: Vec<RollbackTrigger>,
    pub cascade_failure_window_secs: u64,
    pub cascade_max_recent_failures: u32,
    pub cascade_escalation_threshold: u32,
}

impl Default for RollbackSettings {
    fn default() -> Self {
        let policy = RollbackPolicy::default();
        Self {
            confidence_threshold: policy.confidence_threshold,
            max_rollbacks_per_correlation: policy.max_rollbacks_per_correlation,
            cooldown_secs: policy.cooldown.as_secs(),
            severe_regression_pct: policy.severe_regression_pct,
            require_approval: policy.require_approval,
            protected_namespaces: policy.protected_namespaces.into_iter().collect(),
            protected_deployments: policy.protected_deployments.into_iter().collect(),
            disabled_triggers: Vec::new(),
            cascade_failure_window_secs: policy.cascade.failure_window.as_secs(),
            cascade_max_recent_failures: policy.cascade.max_recent_failures,
            cascade_escalation_threshold: policy.cascade.escalation_threshold,
        }
    }
}

impl RemedyConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// With global retry budget
    #[inline]
    #[must_use]
    pub fn with_default_max_retries(mut self, retries: u32) -> Self {
        self.phases.default_max_retries = retries;
        self
    }

    /// With execution mode for driver-initiated actions
    #[inline]
    #[must_use]
    pub fn with_default_mode(mut self, mode: ExecutionMode) -> Self {
        self.default_mode = mode;
        self
    }

    /// With approval required for every rollback
    #[inline]
    #[must_use]
    pub fn with_require_approval(mut self, required: bool) -> Self {
        self.rollback.require_approval = required;
        self
    }

    /// With cooldown cleanup period
    #[inline]
    #[must_use]
    pub fn with_maintenance_interval(mut self, interval: Duration) -> Self {
        self.maintenance_interval_secs = interval.as_secs();
        self
    }

    /// With cooldown limits
    #[inline]
    #[must_use]
    pub fn with_cooldown(mut self, cooldown: CooldownSettings) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Check ranges and phase names
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.maintenance_interval_secs == 0 {
            return Err(invalid("maintenance_interval_secs", "must be greater than zero"));
        }
        if self.cooldown.window_secs == 0 {
            return Err(invalid("cooldown.window_secs", "must be greater than zero"));
        }
        if self.cooldown.max_actions_per_window == 0 {
            return Err(invalid("cooldown.max_actions_per_window", "must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.rollback.confidence_threshold) {
            return Err(invalid(
                "rollback.confidence_threshold",
                format!("{} is outside [0, 1]", self.rollback.confidence_threshold),
            ));
        }
        if self.rollback.severe_regression_pct <= 0.0 {
            return Err(invalid("rollback.severe_regression_pct", "must be positive"));
        }
        if self.rollback.cascade_failure_window_secs == 0 {
            return Err(invalid("rollback.cascade_failure_window_secs", "must be greater than zero"));
        }
        if let Some(bad) = self
            .rollback
            .protected_deployments
            .iter()
            .find(|d| d.split_once('/').map_or(true, |(ns, name)| ns.is_empty() || name.is_empty()))
        {
            return Err(invalid(
                "rollback.protected_deployments",
                format!("{bad:?} is not namespace/name"),
            ));
        }
        self.investigation_config()?;
        self.regeneration_config()?;
        Ok(())
    }

    /// Phase machine configuration for the investigation pipeline
    pub fn investigation_config(&self) -> Result<PhaseConfig<InvestigationPhase>, ConfigError> {
        self.phase_config(&self.phases.investigation)
    }

    /// Phase machine configuration for the regeneration pipeline
    pub fn regeneration_config(&self) -> Result<PhaseConfig<RegenerationPhase>, ConfigError> {
        self.phase_config(&self.phases.regeneration)
    }

    fn phase_config<P: Pipeline>(&self, settings: &PipelineSettings) -> Result<PhaseConfig<P>, ConfigError> {
        let mut config = PhaseConfig::new().with_default_max_retries(self.phases.default_max_retries);
        for (name, retries) in &settings.max_retries {
            config = config.with_max_retries(timed_phase::<P>(name)?, *retries);
        }
        for (name, secs) in &settings.timeout_secs {
            if *secs == 0 {
                return Err(invalid("phases.timeout_secs", format!("{name} timeout must be greater than zero")));
            }
            config = config.with_timeout(timed_phase::<P>(name)?, Duration::from_secs(*secs));
        }
        Ok(config)
    }

    /// Cooldown limits, seeded with each definition's spacing
    #[must_use]
    pub fn cooldown_config<'a>(&self, definitions: impl IntoIterator<Item = &'a ActionDefinition>) -> CooldownConfig {
        let mut config = CooldownConfig::from_definitions(definitions)
            .with_default_cooldown(Duration::from_secs(self.cooldown.default_cooldown_secs))
            .with_window(
                Duration::from_secs(self.cooldown.window_secs),
                self.cooldown.max_actions_per_window,
            );
        for (kind, secs) in &self.cooldown.per_kind_secs {
            config = config.with_kind_cooldown(ActionKind::new(kind.clone()), Duration::from_secs(*secs));
        }
        config
    }

    /// Rollback policy
    #[must_use]
    pub fn rollback_policy(&self) -> RollbackPolicy {
        let settings = &self.rollback;
        let mut policy = RollbackPolicy::new()
            .with_require_approval(settings.require_approval)
            .with_cooldown(Duration::from_secs(settings.cooldown_secs))
            .with_confidence_threshold(settings.confidence_threshold)
            .with_max_rollbacks(settings.max_rollbacks_per_correlation)
            .with_cascade(CascadeSettings {
                failure_window: Duration::from_secs(settings.cascade_failure_window_secs),
                max_recent_failures: settings.cascade_max_recent_failures,
                escalation_threshold: settings.cascade_escalation_threshold,
            });
        policy.severe_regression_pct = settings.severe_regression_pct;
        policy.protected_namespaces = settings.protected_namespaces.iter().cloned().collect();
        policy.protected_deployments = settings.protected_deployments.iter().cloned().collect();
        for trigger in &settings.disabled_triggers {
            policy = policy.with_trigger_disabled(*trigger);
        }
        policy
    }

    /// Cooldown cleanup period
    #[inline]
    #[must_use]
    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance_interval_secs)
    }
}

/// Resolve a phase name that can carry retry or deadline overrides
fn timed_phase<P: Pipeline>(name: &str) -> Result<P, ConfigError> {
    match P::from_name(name) {
        Some(phase) if phase != P::IDLE && !phase.is_terminal() => Ok(phase),
        _ => Err(ConfigError::UnknownPhase {
            pipeline: P::NAME,
            phase: name.to_string(),
        }),
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}
