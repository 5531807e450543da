//! Action registry
//!
//! Provides [`ActionRegistry`], holding two independent maps: kind to
//! definition, and (kind, mode) to executor. Validation and execution never
//! return errors; every problem becomes a report entry or a failed result.

use crate::definition::{builtin_definitions, ActionDefinition};
use crate::error::ActionError;
use crate::executor::ActionExecutor;
use crate::types::{ActionKind, ActionRequest, ActionResult, ExecutionMode, ValidationReport};
use parking_lot::RwLock;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Upper bound accepted for `replicas` on scale requests
pub const MAX_REPLICAS: i64 = 1000;

type ExecutorKey = (ActionKind, ExecutionMode);

/// Registry of remediation action definitions and executors
#[derive(Default)]
pub struct ActionRegistry {
    definitions: RwLock<HashMap<ActionKind, ActionDefinition>>,
    executors: RwLock<HashMap<ExecutorKey, Arc<dyn ActionExecutor>>>,
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("definitions", &self.definitions.read().len())
            .field("executors", &self.executors.read().len())
            .finish()
    }
}

impl ActionRegistry {
    /// Create new empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create registry with built-in definitions (no executors)
    #[must_use]
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        for definition in builtin_definitions() {
            registry.register_action(definition);
        }
        registry
    }

    /// Register a definition, returning the one it replaced
    pub fn register_action(&self, definition: ActionDefinition) -> Option<ActionDefinition> {
        info!(kind = %definition.kind, risk = %definition.risk, "registered action");
        self.definitions
            .write()
            .insert(definition.kind.clone(), definition)
    }

    /// Register the executor for one (kind, mode) pair
    ///
    /// # Errors
    /// - `ActionError::UnknownKind` if the kind has no definition
    /// - `ActionError::UnsupportedMode` if the definition excludes `mode`
    pub fn register_executor(
        &self,
        kind: ActionKind,
        mode: ExecutionMode,
        executor: Arc<dyn ActionExecutor>,
    ) -> Result<(), ActionError> {
        {
            let definitions = self.definitions.read();
            let definition = definitions
                .get(&kind)
                .ok_or_else(|| ActionError::UnknownKind(kind.clone()))?;
            if !definition.supports(mode) {
                return Err(ActionError::UnsupportedMode { kind, mode });
            }
        }
        self.executors.write().insert((kind, mode), executor);
        Ok(())
    }

    /// Register one executor for every supporting kind in `kinds`
    pub fn register_executor_for_all(
        &self,
        kinds: impl IntoIterator<Item = ActionKind>,
        mode: ExecutionMode,
        executor: &Arc<dyn ActionExecutor>,
    ) -> usize {
        kinds
            .into_iter()
            .filter(|kind| {
                self.register_executor(kind.clone(), mode, Arc::clone(executor))
                    .is_ok()
            })
            .count()
    }

    /// Enable or disable a kind; false if the kind is unknown
    pub fn set_enabled(&self, kind: &ActionKind, enabled: bool) -> bool {
        match self.definitions.write().get_mut(kind) {
            Some(definition) => {
                definition.enabled = enabled;
                info!(kind = %kind, enabled, "action toggled");
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn definition(&self, kind: &ActionKind) -> Option<ActionDefinition> {
        self.definitions.read().get(kind).cloned()
    }

    /// All definitions, sorted by kind
    #[must_use]
    pub fn definitions(&self) -> Vec<ActionDefinition> {
        let mut defs: Vec<_> = self.definitions.read().values().cloned().collect();
        defs.sort_by(|a, b| a.kind.cmp(&b.kind));
        defs
    }

    #[inline]
    #[must_use]
    pub fn has_executor(&self, kind: &ActionKind, mode: ExecutionMode) -> bool {
        self.executors.read().contains_key(&(kind.clone(), mode))
    }

    /// Validate a request against its definition
    #[must_use]
    pub fn validate_request(&self, request: &ActionRequest) -> ValidationReport {
        let Some(definition) = self.definition(&request.kind) else {
            return ValidationReport::rejected(format!("Unknown action type: {}", request.kind));
        };

        let mut report = ValidationReport::new();
        if !definition.enabled {
            report.error(format!("Action {} is disabled", request.kind));
        }
        if request.target.namespace.trim().is_empty() {
            report.error("Target namespace is required");
        }
        if request.target.name.trim().is_empty() {
            report.error("Target name is required");
        }
        for param in &definition.required_params {
            if !request.has_parameter(param) {
                report.error(format!("Missing required parameter: {param}"));
            }
        }
        for param in request.parameters.keys() {
            if !definition.required_params.contains(param) && !definition.optional_params.contains(param) {
                report.warn(format!("Unknown parameter: {param}"));
            }
        }

        Self::validate_kind_specific(request, &mut report);

        if definition.risk.is_elevated() {
            report.warn(format!("{} risk action: {}", definition.risk, definition.name));
        }
        if !request.dry_run && request.reason.is_none() {
            if definition.requires_confirmation {
                report.error(format!("Action {} requires a reason to confirm execution", request.kind));
            } else {
                report.warn("No reason given for a live action");
            }
        }
        report
    }

    fn validate_kind_specific(request: &ActionRequest, report: &mut ValidationReport) {
        if request.kind == ActionKind::SCALE && request.has_parameter("replicas") {
            match request.int_parameter("replicas") {
                Some(r) if (0..=MAX_REPLICAS).contains(&r) => {
                    if r == 0 {
                        report.warn("Scaling to zero replicas stops the workload");
                    }
                }
                _ => report.error(format!("replicas must be an integer between 0 and {MAX_REPLICAS}")),
            }
        } else if request.kind == ActionKind::ROLLBACK && request.has_parameter("revision") {
            if !request.int_parameter("revision").is_some_and(|r| r > 0) {
                report.error("revision must be a positive integer");
            }
        } else if request.kind == ActionKind::DELETE_POD && request.has_parameter("grace_period_seconds") {
            if !request.int_parameter("grace_period_seconds").is_some_and(|g| g >= 0) {
                report.error("grace_period_seconds must be a non-negative integer");
            }
        }
    }

    /// Validate and execute a request in `mode`
    ///
    /// Always returns a result; every miss is a failed result with a message.
    pub async fn execute(&self, request: &ActionRequest, mode: ExecutionMode) -> ActionResult {
        let started = Instant::now();
        let result = self.execute_inner(request, mode).await.with_duration(started.elapsed());
        if result.success {
            info!(
                request_id = %request.id,
                kind = %request.kind,
                target = %request.target,
                %mode,
                dry_run = request.dry_run,
                duration_ms = result.duration.as_millis() as u64,
                "action executed"
            );
        } else {
            warn!(
                request_id = %request.id,
                kind = %request.kind,
                target = %request.target,
                %mode,
                message = %result.message,
                "action failed"
            );
        }
        result
    }

    async fn execute_inner(&self, request: &ActionRequest, mode: ExecutionMode) -> ActionResult {
        let report = self.validate_request(request);
        if !report.valid {
            return ActionResult::failure(request, mode, report.error_summary()).with_details(json!({
                "errors": report.errors,
                "warnings": report.warnings,
            }));
        }

        if let Some(definition) = self.definition(&request.kind) {
            if !definition.supports(mode) {
                return ActionResult::failure(
                    request,
                    mode,
                    format!("Action {} does not support {mode} execution", request.kind),
                );
            }
        }

        let executor = self
            .executors
            .read()
            .get(&(request.kind.clone(), mode))
            .cloned();
        let Some(executor) = executor else {
            return ActionResult::failure(
                request,
                mode,
                format!("No executor registered for {} ({mode})", request.kind),
            );
        };

        if !executor.is_available().await {
            return ActionResult::failure(
                request,
                mode,
                format!("Executor for {} ({mode}) is not available", request.kind),
            )
            .with_details(json!({ "retryable": true }));
        }

        let executor_report = executor.validate(request);
        if !executor_report.valid {
            return ActionResult::failure(
                request,
                mode,
                format!("Executor rejected request: {}", executor_report.error_summary()),
            );
        }

        match executor.execute(request).await {
            Ok(outcome) => {
                let mut details = outcome.details;
                if !report.warnings.is_empty() {
                    details = match details {
                        serde_json::Value::Object(mut map) => {
                            map.insert("warnings".into(), json!(report.warnings));
                            serde_json::Value::Object(map)
                        }
                        serde_json::Value::Null => json!({ "warnings": report.warnings }),
                        other => json!({ "result": other, "warnings": report.warnings }),
                    };
                }
                ActionResult::success(request, mode, outcome.message).with_details(details)
            }
            Err(err) => ActionResult::failure(request, mode, err.to_string())
                .with_details(json!({ "retryable": err.is_retryable() })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Target;

    fn scale(replicas: serde_json::Value) -> ActionRequest {
        ActionRequest::new(ActionKind::SCALE, Target::new("prod", "api"))
            .with_parameter("replicas", replicas)
            .with_reason("latency above SLO")
    }

    #[test]
    fn with_defaults_registers_builtins() {
        let registry = ActionRegistry::with_defaults();
        assert_eq!(registry.definitions().len(), 5);
        assert!(registry.definition(&ActionKind::CORDON).is_some());
    }

    #[test]
    fn scale_replicas_are_checked() {
        let registry = ActionRegistry::with_defaults();
        assert!(registry.validate_request(&scale(json!(3))).valid);
        assert!(!registry.validate_request(&scale(json!(-1))).valid);
        assert!(!registry.validate_request(&scale(json!("many"))).valid);

        let zero = registry.validate_request(&scale(json!(0)));
        assert!(zero.valid);
        assert_eq!(zero.warnings.len(), 1);
    }

    #[test]
    fn missing_required_parameter() {
        let registry = ActionRegistry::with_defaults();
        let request = ActionRequest::new(ActionKind::SCALE, Target::new("prod", "api"));
        let report = registry.validate_request(&request);
        assert!(!report.valid);
        assert!(report.errors.contains(&"Missing required parameter: replicas".to_string()));
    }

    #[test]
    fn elevated_risk_and_missing_reason_warn() {
        let registry = ActionRegistry::with_defaults();
        let request = ActionRequest::new(ActionKind::ROLLBACK, Target::new("prod", "api"));
        let report = registry.validate_request(&request);
        assert!(report.valid);
        assert_eq!(report.warnings.len(), 2);

        let dry = request.clone().with_dry_run(true).with_reason("bad deploy");
        assert_eq!(registry.validate_request(&dry).warnings.len(), 1);
    }

    #[test]
    fn confirmation_kinds_need_a_reason() {
        let registry = ActionRegistry::with_defaults();
        let request = ActionRequest::new(ActionKind::CORDON, Target::new("nodes", "node-7"));
        assert!(!registry.validate_request(&request).valid);
        assert!(registry
            .validate_request(&request.with_reason("disk pressure"))
            .valid);
    }

    #[test]
    fn executor_needs_known_kind_and_mode() {
        let registry = ActionRegistry::with_defaults();
        let executor: Arc<dyn ActionExecutor> = Arc::new(crate::executor::SimulatedExecutor::new());

        assert_eq!(
            registry.register_executor(ActionKind::new("drain"), ExecutionMode::Simulated, Arc::clone(&executor)),
            Err(ActionError::UnknownKind(ActionKind::new("drain")))
        );
        assert!(matches!(
            registry.register_executor(ActionKind::CORDON, ExecutionMode::Live, Arc::clone(&executor)),
            Err(ActionError::UnsupportedMode { .. })
        ));
        assert_eq!(
            registry.register_executor_for_all(
                builtin_definitions().into_iter().map(|d| d.kind),
                ExecutionMode::Simulated,
                &executor
            ),
            5
        );
    }
}
