//! Rollback decisions and requests

use chrono::{DateTime, Utc};
use remedy_actions::{ActionKind, Target};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// What caused a rollback to be considered
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackTrigger {
    HealthCheckFailure,
    MetricRegression,
    ErrorSpike,
    VerificationFailure,
    Timeout,
    Manual,
    CascadeProtection,
}

impl RollbackTrigger {
    pub const ALL: [Self; 7] = [
        Self::HealthCheckFailure,
        Self::MetricRegression,
        Self::ErrorSpike,
        Self::VerificationFailure,
        Self::Timeout,
        Self::Manual,
        Self::CascadeProtection,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HealthCheckFailure => "health_check_failure",
            Self::MetricRegression => "metric_regression",
            Self::ErrorSpike => "error_spike",
            Self::VerificationFailure => "verification_failure",
            Self::Timeout => "timeout",
            Self::Manual => "manual",
            Self::CascadeProtection => "cascade_protection",
        }
    }
}

impl fmt::Display for RollbackTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How soon a rollback should happen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        })
    }
}

/// Suggested course of action when not rolling back
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlternativeAction {
    pub name: String,
    pub description: String,
    /// Action kind to request, if the alternative maps onto one
    pub action_kind: Option<ActionKind>,
}

impl AlternativeAction {
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            action_kind: None,
        }
    }

    #[must_use]
    pub fn with_action_kind(mut self, kind: ActionKind) -> Self {
        self.action_kind = Some(kind);
        self
    }
}

/// Outcome of evaluating whether a remediation must be undone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackDecision {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: String,
    pub trigger: RollbackTrigger,
    /// In `[0, 0.95]`
    pub confidence: f64,
    pub should_rollback: bool,
    /// Refused by policy before any signal was scored
    #[serde(default)]
    pub refused: bool,
    pub urgency: Urgency,
    pub affected_resources: Vec<Target>,
    pub reasoning: String,
    #[serde(default)]
    pub alternatives: Vec<AlternativeAction>,
    /// Set when refused because of the between-rollbacks cooldown
    pub retry_after: Option<Duration>,
}

/// Lifecycle of a rollback request
///
/// `Pending -> Approved -> Executing -> Completed | Failed`, with
/// `Cancelled` reachable from `Pending` (operator) and `Approved`
/// (cascade protection).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RollbackStatus {
    Pending,
    Approved,
    Executing,
    Completed,
    Failed,
    Cancelled,
}

impl RollbackStatus {
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether moving to `next` keeps the lifecycle strictly forward
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Approved | Self::Cancelled)
                | (Self::Approved, Self::Executing | Self::Cancelled)
                | (Self::Executing, Self::Completed | Self::Failed)
        )
    }
}

impl fmt::Display for RollbackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        })
    }
}

/// Who asked for the rollback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "name")]
pub enum Requester {
    /// The remediation loop itself
    Automated,
    /// A named operator
    Operator(String),
}

/// One deployment to roll back
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackTarget {
    pub target: Target,
    /// Revision to return to, previous one when `None`
    pub revision: Option<i64>,
}

/// Per-target rollback outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetOutcome {
    pub target: Target,
    pub success: bool,
    pub from_revision: Option<i64>,
    pub to_revision: Option<i64>,
    pub error: Option<String>,
}

impl TargetOutcome {
    #[must_use]
    pub fn failed(target: Target, error: impl Into<String>) -> Self {
        Self {
            target,
            success: false,
            from_revision: None,
            to_revision: None,
            error: Some(error.into()),
        }
    }
}

/// Result of executing a rollback request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackExecution {
    /// True only if every target succeeded
    pub success: bool,
    pub outcomes: Vec<TargetOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Approval metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    pub approved_by: String,
    pub approved_at: DateTime<Utc>,
}

/// Request to roll back one or more deployments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackRequest {
    pub id: Uuid,
    pub correlation_id: String,
    pub status: RollbackStatus,
    pub trigger: RollbackTrigger,
    pub targets: Vec<RollbackTarget>,
    pub reason: String,
    pub requester: Requester,
    #[serde(default)]
    pub dry_run: bool,
    /// Decision that prompted the request
    pub decision_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub approval: Option<Approval>,
    /// Why approval was required, if it was
    pub approval_reason: Option<String>,
    pub cancel_reason: Option<String>,
    pub result: Option<RollbackExecution>,
}

impl RollbackRequest {
    /// Create new pending request
    #[must_use]
    pub fn new(correlation_id: impl Into<String>, trigger: RollbackTrigger, requester: Requester) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            correlation_id: correlation_id.into(),
            status: RollbackStatus::Pending,
            trigger,
            targets: Vec::new(),
            reason: String::new(),
            requester,
            dry_run: false,
            decision_id: None,
            created_at: now,
            updated_at: now,
            approval: None,
            approval_reason: None,
            cancel_reason: None,
            result: None,
        }
    }

    /// Request derived from a decision, targeting its affected resources
    #[must_use]
    pub fn from_decision(decision: &RollbackDecision) -> Self {
        let mut request = Self::new(decision.correlation_id.clone(), decision.trigger, Requester::Automated)
            .with_reason(decision.reasoning.clone());
        request.decision_id = Some(decision.id);
        for target in &decision.affected_resources {
            request = request.with_target(target.clone(), None);
        }
        request
    }

    #[must_use]
    pub fn with_target(mut self, target: Target, revision: Option<i64>) -> Self {
        self.targets.push(RollbackTarget { target, revision });
        self
    }

    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub(crate) fn set_status(&mut self, status: RollbackStatus) {
        debug_assert!(self.status.can_transition_to(status), "{} -> {status}", self.status);
        self.status = status;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_is_strictly_forward() {
        use RollbackStatus::*;
        assert!(Pending.can_transition_to(Approved));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Approved.can_transition_to(Executing));
        assert!(Executing.can_transition_to(Failed));

        assert!(!Executing.can_transition_to(Cancelled));
        assert!(!Completed.can_transition_to(Pending));
        assert!(!Approved.can_transition_to(Pending));
        for status in [Completed, Failed, Cancelled] {
            assert!(status.is_terminal());
        }
    }

    #[test]
    fn requester_serialization() {
        let json = serde_json::to_string(&Requester::Operator("sre-oncall".into())).unwrap();
        assert_eq!(json, r#"{"kind":"operator","name":"sre-oncall"}"#);
        let json = serde_json::to_string(&Requester::Automated).unwrap();
        assert_eq!(json, r#"{"kind":"automated"}"#);
    }
}
