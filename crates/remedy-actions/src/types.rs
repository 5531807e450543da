//! Core action types
//!
//! Requests are immutable once built; every execution attempt produces its
//! own [`ActionResult`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Remediation action kind
///
/// Built-in kinds are associated constants; custom kinds are created with
/// [`ActionKind::new`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionKind(Cow<'static, str>);

impl ActionKind {
    pub const RESTART: Self = Self(Cow::Borrowed("restart_deployment"));
    pub const SCALE: Self = Self(Cow::Borrowed("scale_deployment"));
    pub const ROLLBACK: Self = Self(Cow::Borrowed("rollback_deployment"));
    pub const DELETE_POD: Self = Self(Cow::Borrowed("delete_pod"));
    pub const CORDON: Self = Self(Cow::Borrowed("cordon_node"));

    /// Custom action kind
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActionKind {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Namespaced resource an action applies to
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Target {
    pub namespace: String,
    pub name: String,
}

impl Target {
    #[inline]
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// How an action is carried out
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Against the real cluster
    Live,
    /// Deterministic simulation with no side effects
    Simulated,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Live => "live",
            Self::Simulated => "simulated",
        })
    }
}

/// Blast radius of an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// High or critical
    #[inline]
    #[must_use]
    pub fn is_elevated(self) -> bool {
        self >= Self::High
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        })
    }
}

/// Request to run one action against one target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub id: Uuid,
    pub kind: ActionKind,
    pub target: Target,
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub dry_run: bool,
    pub reason: Option<String>,
    /// Links the request to an incident or cycle
    pub correlation_id: Option<String>,
    pub requested_at: DateTime<Utc>,
}

impl ActionRequest {
    /// Create new request
    #[must_use]
    pub fn new(kind: ActionKind, target: Target) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            target,
            parameters: BTreeMap::new(),
            dry_run: false,
            reason: None,
            correlation_id: None,
            requested_at: Utc::now(),
        }
    }

    /// With parameter
    #[inline]
    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// With dry-run flag
    #[inline]
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// With reason
    #[inline]
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// With correlation id
    #[inline]
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Whether a parameter is present and not null
    #[inline]
    #[must_use]
    pub fn has_parameter(&self, name: &str) -> bool {
        self.parameters.get(name).is_some_and(|v| !v.is_null())
    }

    /// Integer parameter, accepting numeric strings
    #[must_use]
    pub fn int_parameter(&self, name: &str) -> Option<i64> {
        match self.parameters.get(name)? {
            serde_json::Value::Number(n) => n.as_i64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn str_parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name)?.as_str()
    }
}

/// Outcome of validating a request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    /// Empty, valid report
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Report holding a single error
    #[must_use]
    pub fn rejected(error: impl Into<String>) -> Self {
        let mut report = Self::new();
        report.error(error);
        report
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.valid = false;
        self.errors.push(message.into());
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Errors joined for a result message
    #[must_use]
    pub fn error_summary(&self) -> String {
        self.errors.join("; ")
    }
}

/// Result of one execution attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub request_id: Uuid,
    pub kind: ActionKind,
    pub target: Target,
    pub success: bool,
    pub mode: ExecutionMode,
    pub dry_run: bool,
    pub timestamp: DateTime<Utc>,
    pub duration: Duration,
    pub message: String,
    #[serde(default)]
    pub details: serde_json::Value,
}

impl ActionResult {
    /// Successful result for `request`
    #[must_use]
    pub fn success(request: &ActionRequest, mode: ExecutionMode, message: impl Into<String>) -> Self {
        Self::build(request, mode, true, message.into())
    }

    /// Failed result for `request`
    #[must_use]
    pub fn failure(request: &ActionRequest, mode: ExecutionMode, message: impl Into<String>) -> Self {
        Self::build(request, mode, false, message.into())
    }

    /// With details payload
    #[inline]
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    /// With measured duration
    #[inline]
    #[must_use]
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    fn build(request: &ActionRequest, mode: ExecutionMode, success: bool, message: String) -> Self {
        Self {
            request_id: request.id,
            kind: request.kind.clone(),
            target: request.target.clone(),
            success,
            mode,
            dry_run: request.dry_run,
            timestamp: Utc::now(),
            duration: Duration::ZERO,
            message,
            details: serde_json::Value::Null,
        }
    }
}
