//! Rollback need scoring
//!
//! Pure functions over an action result and its verification. Confidence is
//! accumulated additively from independent negative signals and capped, so
//! adding a signal never lowers it.
//!
//! | signal                         | confidence | urgency            |
//! |--------------------------------|-----------:|--------------------|
//! | health check failed            |      +0.40 | critical if all, else high |
//! | metric regression              |      +0.25 | high if severe, else medium |
//! | error spike                    |      +0.20 | at least medium    |
//! | verification unsuccessful      |      +0.10 |                    |
//! | the action itself failed       |      +0.10 |                    |

use crate::policy::RollbackPolicy;
use crate::types::{AlternativeAction, RollbackTrigger, Urgency};
use crate::verification::VerificationResult;
use remedy_actions::{ActionKind, ActionResult};

/// Upper bound on accumulated confidence
pub const MAX_CONFIDENCE: f64 = 0.95;

/// Added when any health check failed
pub const HEALTH_CHECK_WEIGHT: f64 = 0.4;
/// Added when a metric regressed past tolerance
pub const METRIC_REGRESSION_WEIGHT: f64 = 0.25;
/// Added on an error-log spike
pub const ERROR_SPIKE_WEIGHT: f64 = 0.2;
/// Added when verification failed for any reason
pub const VERIFICATION_FAILURE_WEIGHT: f64 = 0.1;
/// Added when the remediation itself failed
pub const ACTION_FAILURE_WEIGHT: f64 = 0.1;

/// Scored signals before policy thresholds are applied
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub confidence: f64,
    pub urgency: Urgency,
    pub reasons: Vec<String>,
}

impl Assessment {
    /// Apply the threshold; critical urgency always rolls back
    #[must_use]
    pub fn should_rollback(&self, threshold: f64) -> bool {
        self.confidence >= threshold || self.urgency == Urgency::Critical
    }
}

/// Most specific trigger present in the verification
///
/// Health check > metric regression > error spike > generic failure.
#[must_use]
pub fn select_trigger(verification: &VerificationResult) -> RollbackTrigger {
    if verification.failed_health_checks() > 0 {
        RollbackTrigger::HealthCheckFailure
    } else if verification.regressions().next().is_some() {
        RollbackTrigger::MetricRegression
    } else if verification.has_error_spike() {
        RollbackTrigger::ErrorSpike
    } else {
        RollbackTrigger::VerificationFailure
    }
}

/// Score the negative signals in an action result and its verification
#[must_use]
pub fn assess(result: &ActionResult, verification: &VerificationResult, policy: &RollbackPolicy) -> Assessment {
    let mut confidence = 0.0;
    let mut urgency = Urgency::Low;
    let mut reasons = Vec::new();

    let failed_checks = verification.failed_health_checks();
    if failed_checks > 0 {
        confidence += HEALTH_CHECK_WEIGHT;
        urgency = urgency.max(if verification.all_health_checks_failed() {
            Urgency::Critical
        } else {
            Urgency::High
        });
        reasons.push(format!(
            "{failed_checks}/{} health checks failed",
            verification.health_checks.len()
        ));
    }

    let regressed: Vec<_> = verification.regressions().collect();
    if !regressed.is_empty() {
        confidence += METRIC_REGRESSION_WEIGHT;
        let worst = regressed
            .iter()
            .map(|m| m.change_pct.abs())
            .fold(0.0_f64, f64::max);
        urgency = urgency.max(if worst >= policy.severe_regression_pct {
            Urgency::High
        } else {
            Urgency::Medium
        });
        let names: Vec<_> = regressed.iter().map(|m| m.name.as_str()).collect();
        reasons.push(format!(
            "metrics regressed: {} (worst {worst:.1}%)",
            names.join(", ")
        ));
    }

    if verification.has_error_spike() {
        confidence += ERROR_SPIKE_WEIGHT;
        urgency = urgency.max(Urgency::Medium);
        if let Some(logs) = &verification.logs {
            reasons.push(format!(
                "error spike: {} errors vs {} baseline",
                logs.error_count, logs.baseline_error_count
            ));
        }
    }

    if !verification.success {
        confidence += VERIFICATION_FAILURE_WEIGHT;
        reasons.push(format!("verification failed: {}", verification.message));
    }

    if !result.success {
        confidence += ACTION_FAILURE_WEIGHT;
        reasons.push(format!("remediation action failed: {}", result.message));
    }

    Assessment {
        confidence: f64::min(confidence, MAX_CONFIDENCE),
        urgency,
        reasons,
    }
}

/// Alternatives offered when a rollback is not performed
#[must_use]
pub fn default_alternatives() -> Vec<AlternativeAction> {
    vec![
        AlternativeAction::new(
            "retry_with_longer_timeout",
            "Re-run verification with a longer timeout before deciding",
        ),
        AlternativeAction::new("scale_up", "Scale up the deployment while investigating")
            .with_action_kind(ActionKind::SCALE),
        AlternativeAction::new("escalate_to_human", "Escalate the incident to an on-call operator"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verification::{HealthCheck, LogAnalysis, MetricComparison};
    use remedy_actions::{ActionRequest, ExecutionMode, Target};

    fn action(success: bool) -> ActionResult {
        let request = ActionRequest::new(ActionKind::RESTART, Target::new("prod", "api"));
        if success {
            ActionResult::success(&request, ExecutionMode::Live, "restarted")
        } else {
            ActionResult::failure(&request, ExecutionMode::Live, "timed out")
        }
    }

    #[test]
    fn trigger_priority() {
        let spike = LogAnalysis {
            error_spike: true,
            ..LogAnalysis::default()
        };
        let v = VerificationResult::failed("bad")
            .with_logs(spike)
            .with_metric(MetricComparison::higher_is_worse("latency", 100.0, 200.0, 10.0));
        assert_eq!(select_trigger(&v), RollbackTrigger::MetricRegression);

        let v = v.with_health_check(HealthCheck::failed("readiness", "0/3"));
        assert_eq!(select_trigger(&v), RollbackTrigger::HealthCheckFailure);

        assert_eq!(
            select_trigger(&VerificationResult::failed("unclear")),
            RollbackTrigger::VerificationFailure
        );
    }

    #[test]
    fn all_signals_cap_confidence() {
        let v = VerificationResult::failed("bad")
            .with_health_check(HealthCheck::failed("readiness", "0/3"))
            .with_metric(MetricComparison::higher_is_worse("latency", 100.0, 200.0, 10.0))
            .with_logs(LogAnalysis {
                error_count: 120,
                baseline_error_count: 4,
                new_patterns: vec!["NullPointerException".into()],
                error_spike: true,
            });
        let a = assess(&action(false), &v, &RollbackPolicy::default());

        assert!((a.confidence - MAX_CONFIDENCE).abs() < 1e-9);
        assert_eq!(a.urgency, Urgency::Critical);
        assert_eq!(a.reasons.len(), 5);
    }

    #[test]
    fn partial_health_failure_is_high() {
        let v = VerificationResult::failed("degraded")
            .with_health_check(HealthCheck::failed("readiness", "1/3"))
            .with_health_check(HealthCheck::passed("liveness"));
        let a = assess(&action(true), &v, &RollbackPolicy::default());

        assert!((a.confidence - 0.5).abs() < 1e-9);
        assert_eq!(a.urgency, Urgency::High);
        assert!(!a.should_rollback(0.6));
    }

    #[test]
    fn critical_urgency_forces_rollback() {
        // Every health check down but the verifier still reported success.
        let v = VerificationResult::healthy("inconclusive")
            .with_health_check(HealthCheck::failed("readiness", "0/3"));
        let a = assess(&action(true), &v, &RollbackPolicy::default());

        assert!(a.confidence < 0.6);
        assert_eq!(a.urgency, Urgency::Critical);
        assert!(a.should_rollback(0.6));
    }

    #[test]
    fn mild_regression_is_medium() {
        let v = VerificationResult::failed("slow")
            .with_metric(MetricComparison::higher_is_worse("latency", 100.0, 130.0, 10.0));
        let a = assess(&action(true), &v, &RollbackPolicy::default());
        assert_eq!(a.urgency, Urgency::Medium);
        assert!((a.confidence - 0.35).abs() < 1e-9);
    }
}
