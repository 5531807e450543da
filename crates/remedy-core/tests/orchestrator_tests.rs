use pretty_assertions::assert_eq;
use remedy_actions::{ActionKind, ActionRequest, ExecutionMode};
use remedy_core::{CooldownSettings, RemedyConfig};
use remedy_rollback::{RollbackStatus, VerificationResult};
use remedy_test_utils::{setup_orchestrator, target, unhealthy, ClusterCall};
use std::time::Duration;

fn restart() -> ActionRequest {
    ActionRequest::new(ActionKind::RESTART, target())
        .with_reason("pods wedged")
        .with_correlation_id("inc-100")
}

#[tokio::test(start_paused = true)]
async fn test_second_action_blocked_until_spacing_elapses() {
    let (orchestrator, _) = setup_orchestrator(RemedyConfig::new());

    let first = orchestrator.execute_action(&restart(), ExecutionMode::Simulated).await;
    assert!(first.success, "{}", first.message);

    let blocked = orchestrator.execute_action(&restart(), ExecutionMode::Simulated).await;
    assert!(!blocked.success);
    assert_eq!(blocked.details["blocked"], "cooldown");
    assert_eq!(blocked.details["retry_after_ms"], 60_000);

    tokio::time::advance(Duration::from_secs(61)).await;
    let later = orchestrator.execute_action(&restart(), ExecutionMode::Simulated).await;
    assert!(later.success, "{}", later.message);
}

#[tokio::test(start_paused = true)]
async fn test_window_limit_applies_across_kinds() {
    let config = RemedyConfig::new().with_cooldown(CooldownSettings {
        default_cooldown_secs: 0,
        window_secs: 300,
        max_actions_per_window: 2,
        per_kind_secs: [("restart_deployment".to_string(), 0), ("delete_pod".to_string(), 0)]
            .into_iter()
            .collect(),
    });
    let (orchestrator, _) = setup_orchestrator(config);
    let delete = ActionRequest::new(ActionKind::DELETE_POD, target()).with_reason("stuck pod");

    assert!(orchestrator.execute_action(&restart(), ExecutionMode::Simulated).await.success);
    assert!(orchestrator.execute_action(&delete, ExecutionMode::Simulated).await.success);

    let third = orchestrator.execute_action(&restart(), ExecutionMode::Simulated).await;
    assert!(!third.success);
    assert!(third.message.contains("Rate limit"), "{}", third.message);
}

#[tokio::test]
async fn test_invalid_request_does_not_consume_slot() {
    let (orchestrator, _) = setup_orchestrator(RemedyConfig::new());
    let scale = ActionRequest::new(ActionKind::SCALE, target());

    let rejected = orchestrator.execute_action(&scale, ExecutionMode::Simulated).await;
    assert!(!rejected.success);
    assert!(rejected.details["errors"].as_array().is_some_and(|e| !e.is_empty()));
    assert!(orchestrator.cooldowns().is_empty());

    let valid = scale.with_parameter("replicas", 4);
    assert!(orchestrator.execute_action(&valid, ExecutionMode::Simulated).await.success);
}

#[tokio::test]
async fn test_dry_run_skips_cooldown() {
    let (orchestrator, _) = setup_orchestrator(RemedyConfig::new());

    for _ in 0..3 {
        let result = orchestrator
            .execute_action(&restart().with_dry_run(true), ExecutionMode::Simulated)
            .await;
        assert!(result.success);
        assert!(result.dry_run);
    }
    assert!(orchestrator.cooldowns().is_empty());
}

#[tokio::test]
async fn test_live_actions_reach_cluster() {
    let (orchestrator, cluster) = setup_orchestrator(RemedyConfig::new());

    let result = orchestrator.execute_action(&restart(), ExecutionMode::Live).await;
    assert!(result.success, "{}", result.message);
    assert_eq!(
        cluster.calls(),
        vec![ClusterCall::Restart {
            target: target(),
            dry_run: false
        }]
    );
}

#[tokio::test]
async fn test_healthy_remediation_clears_cooldown() {
    let (orchestrator, cluster) = setup_orchestrator(RemedyConfig::new());
    let result = orchestrator.execute_action(&restart(), ExecutionMode::Simulated).await;
    assert_eq!(orchestrator.cooldowns().len(), 1);

    let assessment = orchestrator
        .assess_remediation(&result, &VerificationResult::healthy("recovered"), "inc-100")
        .await
        .unwrap();

    assert!(assessment.healthy);
    assert!(assessment.decision.is_none());
    assert!(orchestrator.cooldowns().is_empty());
    assert_eq!(cluster.rollbacks(), 0);
}

#[tokio::test]
async fn test_unhealthy_remediation_rolls_back() {
    let (orchestrator, cluster) = setup_orchestrator(RemedyConfig::new());
    let result = orchestrator.execute_action(&restart(), ExecutionMode::Simulated).await;

    let assessment = orchestrator
        .assess_remediation(&result, &unhealthy(), "inc-100")
        .await
        .unwrap();

    assert!(!assessment.healthy);
    assert!(assessment.decision.as_ref().unwrap().should_rollback);
    let rollback = assessment.rollback.unwrap();
    assert_eq!(rollback.status, RollbackStatus::Completed);
    assert_eq!(cluster.rollbacks(), 1);
    assert_eq!(orchestrator.rollback().get_rollback_count("inc-100"), 1);
}

#[tokio::test]
async fn test_rollback_waits_for_approval_when_required() {
    let (orchestrator, cluster) = setup_orchestrator(RemedyConfig::new().with_require_approval(true));
    let result = orchestrator.execute_action(&restart(), ExecutionMode::Simulated).await;

    let assessment = orchestrator
        .assess_remediation(&result, &unhealthy(), "inc-100")
        .await
        .unwrap();

    assert_eq!(assessment.rollback.unwrap().status, RollbackStatus::Pending);
    assert_eq!(cluster.rollbacks(), 0);
    assert_eq!(orchestrator.rollback().get_pending_approvals().len(), 1);
}

#[tokio::test]
async fn test_mild_failure_offers_alternatives() {
    let (orchestrator, cluster) = setup_orchestrator(RemedyConfig::new());
    let result = orchestrator.execute_action(&restart(), ExecutionMode::Simulated).await;

    let assessment = orchestrator
        .assess_remediation(&result, &VerificationResult::failed("readiness flapped"), "inc-100")
        .await
        .unwrap();

    let decision = assessment.decision.unwrap();
    assert!(!decision.should_rollback);
    assert!(!decision.alternatives.is_empty());
    assert!(assessment.rollback.is_none());
    assert_eq!(cluster.rollbacks(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_maintenance_evicts_idle_entries() {
    let (orchestrator, _) = setup_orchestrator(RemedyConfig::new());
    orchestrator.execute_action(&restart(), ExecutionMode::Simulated).await;
    assert_eq!(orchestrator.cooldowns().len(), 1);

    let maintenance = orchestrator.spawn_maintenance(Duration::from_secs(60));
    tokio::time::sleep(Duration::from_secs(700)).await;
    assert!(orchestrator.cooldowns().is_empty());

    assert!(!maintenance.is_finished());
    maintenance.stop().await;
}
