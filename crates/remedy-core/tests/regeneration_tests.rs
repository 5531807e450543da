use pretty_assertions::assert_eq;
use remedy_core::{
    ChangeRequest, CycleStore, DeliveryError, InMemoryCycleStore, Judgment, RemedyConfig, ReasoningTask, TestReport,
};
use remedy_phase::{Pipeline, RegenerationPhase};
use remedy_test_utils::{setup_orchestrator, target, unhealthy, DeliveryCall, FakeDelivery, ScriptedReasoning};
use std::sync::Arc;

fn change() -> ChangeRequest {
    ChangeRequest::new("chg-7", "return 429 instead of 503 when overloaded", target())
}

fn deploy(artifact: &str) -> DeliveryCall {
    DeliveryCall::Deploy {
        artifact: artifact.to_string(),
        target: target(),
    }
}

#[tokio::test]
async fn test_clean_run_completes() {
    let (orchestrator, _) = setup_orchestrator(RemedyConfig::new());
    let delivery = FakeDelivery::new();

    let report = orchestrator
        .run_regeneration(&change(), &ScriptedReasoning::new(), &delivery)
        .await
        .unwrap();

    assert!(report.succeeded());
    assert_eq!(report.requirements, vec!["keep the API".to_string()]);
    assert_eq!(report.artifact.unwrap().id, "build-1");
    assert_eq!(
        delivery.calls(),
        vec![DeliveryCall::Test, DeliveryCall::Build, deploy("build-1"), DeliveryCall::Verify]
    );
}

#[tokio::test]
async fn test_failing_tests_regenerate_code() {
    let (orchestrator, _) = setup_orchestrator(RemedyConfig::new());
    let reasoning = ScriptedReasoning::new();
    let delivery =
        FakeDelivery::new().with_test_run(Ok(TestReport::failing(10, vec!["overload::returns_429".into()])));

    let report = orchestrator
        .run_regeneration(&change(), &reasoning, &delivery)
        .await
        .unwrap();

    assert!(report.succeeded());
    assert_eq!(report.test_runs.len(), 2);
    assert!(!report.test_runs[0].success());
    assert_eq!(report.cycle.retries(RegenerationPhase::Testing), 1);
    assert_eq!(reasoning.requests_for(ReasoningTask::GenerateCode), 2);
    assert_eq!(reasoning.requests_for(ReasoningTask::AnalyzeRequirements), 1);
}

#[tokio::test]
async fn test_unhealthy_deployment_redeploys_same_artifact() {
    let (orchestrator, _) = setup_orchestrator(RemedyConfig::new());
    let delivery = FakeDelivery::new().with_verification(unhealthy());

    let report = orchestrator
        .run_regeneration(&change(), &ScriptedReasoning::new(), &delivery)
        .await
        .unwrap();

    assert!(report.succeeded());
    assert_eq!(report.verifications.len(), 2);
    assert_eq!(
        delivery.calls(),
        vec![
            DeliveryCall::Test,
            DeliveryCall::Build,
            deploy("build-1"),
            DeliveryCall::Verify,
            deploy("build-1"),
            DeliveryCall::Verify,
        ]
    );
}

#[tokio::test]
async fn test_failed_build_returns_to_code_generation() {
    let (orchestrator, _) = setup_orchestrator(RemedyConfig::new());
    let reasoning = ScriptedReasoning::new();
    let delivery = FakeDelivery::new().with_build(Err(DeliveryError::Failed {
        stage: "build",
        message: "linker error".into(),
    }));

    let report = orchestrator
        .run_regeneration(&change(), &reasoning, &delivery)
        .await
        .unwrap();

    assert!(report.succeeded());
    assert_eq!(report.cycle.retries(RegenerationPhase::Building), 1);
    assert_eq!(reasoning.requests_for(ReasoningTask::GenerateCode), 2);
    assert_eq!(report.artifact.unwrap().id, "build-1");
}

#[tokio::test]
async fn test_rejected_deploy_fails_cycle() {
    let (orchestrator, _) = setup_orchestrator(RemedyConfig::new());
    let delivery = FakeDelivery::new().with_deploy(Err(DeliveryError::Rejected {
        stage: "deploy",
        message: "namespace frozen".into(),
    }));

    let report = orchestrator
        .run_regeneration(&change(), &ScriptedReasoning::new(), &delivery)
        .await
        .unwrap();

    assert_eq!(report.cycle.phase, RegenerationPhase::Failed);
    let error = report.cycle.error.unwrap();
    assert_eq!(error.phase, RegenerationPhase::Deploying);
    assert!(error.message.contains("namespace frozen"), "{}", error.message);
    assert!(report.verifications.is_empty());
}

#[tokio::test]
async fn test_missing_code_exhausts_generation_budget() {
    let (orchestrator, _) = setup_orchestrator(RemedyConfig::new().with_default_max_retries(1));
    let reasoning = ScriptedReasoning::new()
        .then(ReasoningTask::GenerateCode, Ok(Judgment::new("thinking")))
        .then(ReasoningTask::GenerateCode, Ok(Judgment::new("still thinking")));
    let delivery = FakeDelivery::new();

    let report = orchestrator
        .run_regeneration(&change(), &reasoning, &delivery)
        .await
        .unwrap();

    assert_eq!(report.cycle.phase, RegenerationPhase::Failed);
    assert!(report.code.is_none());
    assert!(delivery.calls().is_empty());
}

#[tokio::test]
async fn test_regeneration_is_checkpointed() {
    let store = Arc::new(InMemoryCycleStore::new());
    let (orchestrator, _) = setup_orchestrator(RemedyConfig::new());
    let orchestrator = orchestrator.with_store(Arc::clone(&store) as Arc<dyn CycleStore>);

    let report = orchestrator
        .run_regeneration(&change(), &ScriptedReasoning::new(), &FakeDelivery::new())
        .await
        .unwrap();

    assert_eq!(store.list(RegenerationPhase::NAME).await.unwrap(), vec![report.cycle.id]);
    assert!(store.list("investigation").await.unwrap().is_empty());
}
