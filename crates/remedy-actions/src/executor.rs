//! Executor back-ends
//!
//! An [`ActionExecutor`] is registered per (kind, mode) pair. The registry
//! calls `is_available`, then `validate`, then `execute`.

use crate::cluster::ClusterClient;
use crate::error::ExecutorError;
use crate::types::{ActionKind, ActionRequest, ValidationReport};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Successful execution payload
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutcome {
    pub message: String,
    pub details: serde_json::Value,
}

impl ExecutionOutcome {
    #[inline]
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: serde_json::Value::Null,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// Action executor trait
///
/// Implement this trait to plug a back-end into the registry.
#[async_trait::async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Whether the back-end can take work right now
    async fn is_available(&self) -> bool;

    /// Back-end specific request checks
    fn validate(&self, request: &ActionRequest) -> ValidationReport;

    /// Carry out the request
    async fn execute(&self, request: &ActionRequest) -> Result<ExecutionOutcome, ExecutorError>;
}

/// Deterministic executor with no side effects
#[derive(Debug, Clone, Default)]
pub struct SimulatedExecutor {
    latency: Duration,
}

impl SimulatedExecutor {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With artificial latency per execution
    #[inline]
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

#[async_trait::async_trait]
impl ActionExecutor for SimulatedExecutor {
    async fn is_available(&self) -> bool {
        true
    }

    fn validate(&self, _request: &ActionRequest) -> ValidationReport {
        ValidationReport::new()
    }

    async fn execute(&self, request: &ActionRequest) -> Result<ExecutionOutcome, ExecutorError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        debug!(kind = %request.kind, target = %request.target, "simulated action");
        Ok(
            ExecutionOutcome::new(format!("Simulated {} on {}", request.kind, request.target))
                .with_details(json!({
                    "simulated": true,
                    "parameters": request.parameters,
                })),
        )
    }
}

/// Live executor backed by a [`ClusterClient`]
///
/// Supports restart, scale, rollback and pod deletion. Dry-run requests are
/// forwarded to the client with the dry-run flag set.
#[derive(Clone)]
pub struct ClusterExecutor {
    client: Arc<dyn ClusterClient>,
    availability_namespace: Option<String>,
}

impl std::fmt::Debug for ClusterExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterExecutor")
            .field("availability_namespace", &self.availability_namespace)
            .finish_non_exhaustive()
    }
}

impl ClusterExecutor {
    #[must_use]
    pub fn new(client: Arc<dyn ClusterClient>) -> Self {
        Self {
            client,
            availability_namespace: None,
        }
    }

    /// Report availability by listing deployments in `namespace`
    #[inline]
    #[must_use]
    pub fn with_availability_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.availability_namespace = Some(namespace.into());
        self
    }

    /// Kinds this executor can carry out
    #[must_use]
    pub fn supported_kinds() -> [ActionKind; 4] {
        [
            ActionKind::RESTART,
            ActionKind::SCALE,
            ActionKind::ROLLBACK,
            ActionKind::DELETE_POD,
        ]
    }

    fn replicas(request: &ActionRequest) -> Result<u32, ExecutorError> {
        request
            .int_parameter("replicas")
            .and_then(|r| u32::try_from(r).ok())
            .ok_or_else(|| ExecutorError::Rejected("replicas must be a non-negative integer".into()))
    }
}

#[async_trait::async_trait]
impl ActionExecutor for ClusterExecutor {
    async fn is_available(&self) -> bool {
        match &self.availability_namespace {
            Some(ns) => self.client.list_deployments(ns).await.is_ok(),
            None => true,
        }
    }

    fn validate(&self, request: &ActionRequest) -> ValidationReport {
        let mut report = ValidationReport::new();
        if !Self::supported_kinds().contains(&request.kind) {
            report.error(format!("Cluster executor cannot run {}", request.kind));
        }
        if request.kind == ActionKind::SCALE {
            if let Err(err) = Self::replicas(request) {
                report.error(err.to_string());
            }
        }
        report
    }

    async fn execute(&self, request: &ActionRequest) -> Result<ExecutionOutcome, ExecutorError> {
        let target = &request.target;
        let dry_run = request.dry_run;
        let prefix = if dry_run { "[dry-run] " } else { "" };

        let outcome = match request.kind.as_str() {
            "restart_deployment" => {
                self.client.restart_deployment(target, dry_run).await?;
                ExecutionOutcome::new(format!("{prefix}Restarted deployment {target}"))
            }
            "scale_deployment" => {
                let replicas = Self::replicas(request)?;
                self.client.scale_deployment(target, replicas, dry_run).await?;
                ExecutionOutcome::new(format!("{prefix}Scaled {target} to {replicas} replicas"))
                    .with_details(json!({ "replicas": replicas }))
            }
            "rollback_deployment" => {
                let revision = request.int_parameter("revision");
                let reason = request.reason.as_deref().unwrap_or("remediation action");
                let result = self.client.rollback(target, revision, reason, dry_run).await?;
                if !result.success {
                    return Err(ExecutorError::Failed(
                        result.error.unwrap_or_else(|| format!("rollback of {target} failed")),
                    ));
                }
                ExecutionOutcome::new(format!("{prefix}Rolled back {target}"))
                    .with_details(json!({
                        "from_revision": result.from_revision,
                        "to_revision": result.to_revision,
                    }))
            }
            "delete_pod" => {
                self.client.delete_pod(target, dry_run).await?;
                ExecutionOutcome::new(format!("{prefix}Deleted pod {target}"))
            }
            other => {
                return Err(ExecutorError::Rejected(format!(
                    "Cluster executor cannot run {other}"
                )))
            }
        };
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Target;

    #[tokio::test]
    async fn simulated_executor_echoes_request() {
        let request = ActionRequest::new(ActionKind::SCALE, Target::new("prod", "api"))
            .with_parameter("replicas", 3);
        let outcome = SimulatedExecutor::new().execute(&request).await.unwrap();

        assert_eq!(outcome.message, "Simulated scale_deployment on prod/api");
        assert_eq!(outcome.details["simulated"], true);
        assert_eq!(outcome.details["parameters"]["replicas"], 3);
    }
}
