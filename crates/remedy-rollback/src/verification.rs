//! Post-remediation verification result
//!
//! Produced by an external verifier after an action runs and consumed by
//! the decision scorer.

use serde::{Deserialize, Serialize};

/// One health check outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub name: String,
    pub healthy: bool,
    pub message: Option<String>,
}

impl HealthCheck {
    #[must_use]
    pub fn passed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            healthy: true,
            message: None,
        }
    }

    #[must_use]
    pub fn failed(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            healthy: false,
            message: Some(message.into()),
        }
    }
}

/// Baseline vs. current value of one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricComparison {
    pub name: String,
    pub baseline: f64,
    pub current: f64,
    /// Signed change relative to baseline, in percent
    pub change_pct: f64,
    /// Whether the change moved in the bad direction past tolerance
    pub regressed: bool,
}

impl MetricComparison {
    /// Compare values where higher is worse (latency, error rate)
    #[must_use]
    pub fn higher_is_worse(name: impl Into<String>, baseline: f64, current: f64, tolerance_pct: f64) -> Self {
        let change_pct = if baseline.abs() < f64::EPSILON {
            if current > 0.0 {
                100.0
            } else {
                0.0
            }
        } else {
            (current - baseline) / baseline.abs() * 100.0
        };
        Self {
            name: name.into(),
            baseline,
            current,
            change_pct,
            regressed: change_pct > tolerance_pct,
        }
    }
}

/// Log error analysis around the action
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogAnalysis {
    pub error_count: u64,
    pub baseline_error_count: u64,
    /// Error signatures not present before the action
    pub new_patterns: Vec<String>,
    pub error_spike: bool,
}

/// Verification of a remediation action
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub success: bool,
    #[serde(default)]
    pub health_checks: Vec<HealthCheck>,
    #[serde(default)]
    pub metrics: Vec<MetricComparison>,
    pub logs: Option<LogAnalysis>,
    pub message: String,
}

impl VerificationResult {
    /// Passing verification with no signals
    #[must_use]
    pub fn healthy(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            ..Self::default()
        }
    }

    /// Failing verification with no signals yet
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_health_check(mut self, check: HealthCheck) -> Self {
        self.health_checks.push(check);
        self
    }

    #[must_use]
    pub fn with_metric(mut self, metric: MetricComparison) -> Self {
        self.metrics.push(metric);
        self
    }

    #[must_use]
    pub fn with_logs(mut self, logs: LogAnalysis) -> Self {
        self.logs = Some(logs);
        self
    }

    #[must_use]
    pub fn failed_health_checks(&self) -> usize {
        self.health_checks.iter().filter(|c| !c.healthy).count()
    }

    #[must_use]
    pub fn all_health_checks_failed(&self) -> bool {
        !self.health_checks.is_empty() && self.health_checks.iter().all(|c| !c.healthy)
    }

    pub fn regressions(&self) -> impl Iterator<Item = &MetricComparison> {
        self.metrics.iter().filter(|m| m.regressed)
    }

    #[must_use]
    pub fn has_error_spike(&self) -> bool {
        self.logs.as_ref().is_some_and(|l| l.error_spike)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latency_regression() {
        let m = MetricComparison::higher_is_worse("p99_latency_ms", 200.0, 320.0, 20.0);
        assert!(m.regressed);
        assert!((m.change_pct - 60.0).abs() < 1e-9);

        let ok = MetricComparison::higher_is_worse("p99_latency_ms", 200.0, 210.0, 20.0);
        assert!(!ok.regressed);
    }

    #[test]
    fn zero_baseline() {
        let m = MetricComparison::higher_is_worse("errors", 0.0, 3.0, 10.0);
        assert!(m.regressed);
    }

    #[test]
    fn health_summary() {
        let v = VerificationResult::failed("pods not ready")
            .with_health_check(HealthCheck::failed("readiness", "0/3 ready"))
            .with_health_check(HealthCheck::passed("liveness"));
        assert_eq!(v.failed_health_checks(), 1);
        assert!(!v.all_health_checks_failed());
        assert!(!VerificationResult::healthy("ok").all_health_checks_failed());
    }
}
