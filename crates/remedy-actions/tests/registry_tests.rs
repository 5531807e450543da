use mockall::mock;
use mockall::predicate::always;
use pretty_assertions::assert_eq;
use remedy_actions::*;
use serde_json::json;
use std::sync::Arc;

mock! {
    pub Executor {}

    #[async_trait::async_trait]
    impl ActionExecutor for Executor {
        async fn is_available(&self) -> bool;
        fn validate(&self, request: &ActionRequest) -> ValidationReport;
        async fn execute(&self, request: &ActionRequest) -> Result<ExecutionOutcome, ExecutorError>;
    }
}

fn restart() -> ActionRequest {
    ActionRequest::new(ActionKind::RESTART, Target::new("prod", "checkout"))
        .with_reason("pods stuck in CrashLoopBackOff")
        .with_correlation_id("inc-42")
}

#[tokio::test]
async fn test_unknown_kind_fails_without_error() {
    let registry = ActionRegistry::with_defaults();
    let request = ActionRequest::new(ActionKind::new("drain_cluster"), Target::new("prod", "all"));

    let result = registry.execute(&request, ExecutionMode::Live).await;

    assert!(!result.success);
    assert!(result.message.contains("Unknown action type"));
    assert_eq!(result.kind, ActionKind::new("drain_cluster"));
}

#[tokio::test]
async fn test_missing_executor_is_reported() {
    let registry = ActionRegistry::with_defaults();
    let result = registry.execute(&restart(), ExecutionMode::Live).await;

    assert!(!result.success);
    assert_eq!(result.message, "No executor registered for restart_deployment (live)");
}

#[tokio::test]
async fn test_disabled_kind_is_rejected_before_executor() {
    let registry = ActionRegistry::with_defaults();
    let mut executor = MockExecutor::new();
    executor.expect_execute().never();
    registry
        .register_executor(ActionKind::RESTART, ExecutionMode::Live, Arc::new(executor))
        .unwrap();

    assert!(registry.set_enabled(&ActionKind::RESTART, false));
    let result = registry.execute(&restart(), ExecutionMode::Live).await;

    assert!(!result.success);
    assert_eq!(result.message, "Action restart_deployment is disabled");
}

#[tokio::test]
async fn test_successful_execution_delegates_once() {
    let registry = ActionRegistry::with_defaults();
    let mut executor = MockExecutor::new();
    executor.expect_is_available().times(1).return_const(true);
    executor
        .expect_validate()
        .with(always())
        .times(1)
        .returning(|_| ValidationReport::new());
    executor.expect_execute().times(1).returning(|request| {
        Ok(ExecutionOutcome::new(format!("restarted {}", request.target))
            .with_details(json!({ "pods": 3 })))
    });
    registry
        .register_executor(ActionKind::RESTART, ExecutionMode::Live, Arc::new(executor))
        .unwrap();

    let request = restart();
    let result = registry.execute(&request, ExecutionMode::Live).await;

    assert!(result.success, "{}", result.message);
    assert_eq!(result.request_id, request.id);
    assert_eq!(result.mode, ExecutionMode::Live);
    assert_eq!(result.message, "restarted prod/checkout");
    assert_eq!(result.details["pods"], 3);
}

#[tokio::test]
async fn test_unavailable_executor_is_retryable_failure() {
    let registry = ActionRegistry::with_defaults();
    let mut executor = MockExecutor::new();
    executor.expect_is_available().return_const(false);
    executor.expect_execute().never();
    registry
        .register_executor(ActionKind::RESTART, ExecutionMode::Live, Arc::new(executor))
        .unwrap();

    let result = registry.execute(&restart(), ExecutionMode::Live).await;
    assert!(!result.success);
    assert_eq!(result.details["retryable"], true);
}

#[tokio::test]
async fn test_executor_error_becomes_failed_result() {
    let registry = ActionRegistry::with_defaults();
    let mut executor = MockExecutor::new();
    executor.expect_is_available().return_const(true);
    executor.expect_validate().returning(|_| ValidationReport::new());
    executor
        .expect_execute()
        .returning(|_| Err(ExecutorError::Cluster(ClusterError::Timeout(30_000))));
    registry
        .register_executor(ActionKind::RESTART, ExecutionMode::Live, Arc::new(executor))
        .unwrap();

    let result = registry.execute(&restart(), ExecutionMode::Live).await;
    assert!(!result.success);
    assert_eq!(result.message, "cluster request timed out after 30000ms");
    assert_eq!(result.details["retryable"], true);
}

#[tokio::test]
async fn test_executor_validation_blocks_execution() {
    let registry = ActionRegistry::with_defaults();
    let mut executor = MockExecutor::new();
    executor.expect_is_available().return_const(true);
    executor
        .expect_validate()
        .returning(|_| ValidationReport::rejected("namespace is frozen"));
    executor.expect_execute().never();
    registry
        .register_executor(ActionKind::RESTART, ExecutionMode::Live, Arc::new(executor))
        .unwrap();

    let result = registry.execute(&restart(), ExecutionMode::Live).await;
    assert_eq!(result.message, "Executor rejected request: namespace is frozen");
}

#[tokio::test]
async fn test_simulated_mode_carries_warnings() {
    let registry = ActionRegistry::with_defaults();
    registry
        .register_executor(
            ActionKind::ROLLBACK,
            ExecutionMode::Simulated,
            Arc::new(SimulatedExecutor::new()),
        )
        .unwrap();

    let request = ActionRequest::new(ActionKind::ROLLBACK, Target::new("prod", "api"))
        .with_parameter("revision", 4)
        .with_dry_run(true);
    let result = registry.execute(&request, ExecutionMode::Simulated).await;

    assert!(result.success);
    assert!(result.dry_run);
    assert_eq!(result.details["warnings"].as_array().map(Vec::len), Some(1));
}
