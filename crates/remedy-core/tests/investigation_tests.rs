use mockall::mock;
use pretty_assertions::assert_eq;
use remedy_actions::{ActionKind, ExecutionMode};
use remedy_core::{
    CoreError, CycleStore, InMemoryCycleStore, Judgment, ReasoningError, ReasoningTask, RemediationOrchestrator,
    RemedyConfig, StoreError, StoredCycle, VerifierError,
};
use remedy_phase::{Cycle, CycleId, CycleSnapshot, InvestigationPhase, Pipeline};
use remedy_test_utils::{
    incident, restart_proposal, setup_orchestrator, target, unhealthy, ClusterCall, RecordingCluster,
    ScriptedReasoning, ScriptedVerifier,
};
use std::sync::Arc;

mock! {
    Store {}

    #[async_trait::async_trait]
    impl CycleStore for Store {
        async fn save(&self, pipeline: &str, cycle_id: CycleId, payload: String) -> Result<(), StoreError>;
        async fn load(&self, pipeline: &str, cycle_id: CycleId) -> Result<Option<StoredCycle>, StoreError>;
        async fn list(&self, pipeline: &str) -> Result<Vec<CycleId>, StoreError>;
        async fn remove(&self, pipeline: &str, cycle_id: CycleId) -> Result<bool, StoreError>;
    }
}

#[tokio::test]
async fn test_healthy_remediation_completes_cycle() {
    let (orchestrator, cluster) = setup_orchestrator(RemedyConfig::new());
    let reasoning = ScriptedReasoning::new().deciding(restart_proposal());
    let verifier = ScriptedVerifier::new();

    let report = orchestrator
        .run_investigation(&incident(), &reasoning, &verifier)
        .await
        .unwrap();

    assert!(report.succeeded());
    assert_eq!(report.actions.len(), 1);
    assert_eq!(report.actions[0].kind, ActionKind::RESTART);
    assert_eq!(report.actions[0].mode, ExecutionMode::Simulated);
    assert_eq!(verifier.verified().len(), 1);
    assert!(report.assessments[0].healthy);
    assert!(orchestrator.cooldowns().is_empty());
    assert_eq!(cluster.rollbacks(), 0);
    assert_eq!(report.cycle.context.get("incident").map(String::as_str), Some("inc-100"));
}

#[tokio::test]
async fn test_no_proposal_completes_without_action() {
    let (orchestrator, _) = setup_orchestrator(RemedyConfig::new());
    let reasoning = ScriptedReasoning::new();

    let report = orchestrator
        .run_investigation(&incident(), &reasoning, &ScriptedVerifier::new())
        .await
        .unwrap();

    assert!(report.succeeded());
    assert!(report.actions.is_empty());
    assert_eq!(reasoning.requests_for(ReasoningTask::Analyze), 1);
    assert_eq!(reasoning.requests_for(ReasoningTask::Decide), 1);
}

#[tokio::test]
async fn test_failed_verification_rolls_back_then_redecides() {
    let (orchestrator, cluster) = setup_orchestrator(RemedyConfig::new());
    let reasoning = ScriptedReasoning::new().deciding(restart_proposal());
    let verifier = ScriptedVerifier::new().then(Ok(unhealthy()));

    let report = orchestrator
        .run_investigation(&incident(), &reasoning, &verifier)
        .await
        .unwrap();

    assert!(report.succeeded());
    assert_eq!(report.rollbacks_completed(), 1);
    assert_eq!(report.cycle.retries(InvestigationPhase::Verifying), 1);
    assert_eq!(reasoning.requests_for(ReasoningTask::Decide), 2);
    assert!(matches!(
        cluster.calls().as_slice(),
        [ClusterCall::Rollback { target: t, dry_run: false, .. }] if *t == target()
    ));

    let redecide = &reasoning.requests()[2];
    assert_eq!(redecide.task, ReasoningTask::Decide);
    assert_eq!(redecide.context["rolled_back"], true);
}

#[tokio::test]
async fn test_repeated_blocked_remediation_fails_cycle() {
    let (orchestrator, cluster) = setup_orchestrator(RemedyConfig::new());
    let reasoning = (0..5).fold(ScriptedReasoning::new(), |r, _| r.deciding(restart_proposal()));
    let verifier = ScriptedVerifier::new().then(Ok(unhealthy()));

    let report = orchestrator
        .run_investigation(&incident(), &reasoning, &verifier)
        .await
        .unwrap();

    assert_eq!(report.cycle.phase, InvestigationPhase::Failed);
    assert_eq!(report.actions.len(), 5);
    assert!(report.actions[1..].iter().all(|a| a.details["blocked"] == "cooldown"));
    assert_eq!(report.rollbacks_completed(), 1);
    assert_eq!(cluster.rollbacks(), 1);

    let error = report.cycle.error.unwrap();
    assert_eq!(error.phase, InvestigationPhase::Remediating);
    assert!(!error.recoverable);
    assert!(error.message.contains("exhausting 3 retries"), "{}", error.message);
}

#[tokio::test]
async fn test_retryable_reasoning_errors_spend_retries() {
    let (orchestrator, _) = setup_orchestrator(RemedyConfig::new());
    let reasoning = ScriptedReasoning::new()
        .then(ReasoningTask::Analyze, Err(ReasoningError::Timeout(30_000)))
        .then(ReasoningTask::Analyze, Err(ReasoningError::Unavailable("503".into())));

    let report = orchestrator
        .run_investigation(&incident(), &reasoning, &ScriptedVerifier::new())
        .await
        .unwrap();

    assert!(report.succeeded());
    assert_eq!(report.cycle.retries(InvestigationPhase::Analyzing), 2);
    assert_eq!(reasoning.requests_for(ReasoningTask::Analyze), 3);
}

#[tokio::test]
async fn test_invalid_reasoning_response_fails_cycle() {
    let (orchestrator, _) = setup_orchestrator(RemedyConfig::new());
    let reasoning = ScriptedReasoning::new().then(
        ReasoningTask::Analyze,
        Err(ReasoningError::InvalidResponse("empty body".into())),
    );

    let report = orchestrator
        .run_investigation(&incident(), &reasoning, &ScriptedVerifier::new())
        .await
        .unwrap();

    assert_eq!(report.cycle.phase, InvestigationPhase::Failed);
    let error = report.cycle.error.unwrap();
    assert_eq!(error.phase, InvestigationPhase::Analyzing);
    assert!(!error.recoverable);
    assert_eq!(reasoning.requests_for(ReasoningTask::Decide), 0);
}

#[tokio::test]
async fn test_unsupported_verification_fails_cycle() {
    let (orchestrator, _) = setup_orchestrator(RemedyConfig::new());
    let reasoning = ScriptedReasoning::new().deciding(restart_proposal());
    let verifier = ScriptedVerifier::new().then(Err(VerifierError::Unsupported("cordon".into())));

    let report = orchestrator
        .run_investigation(&incident(), &reasoning, &verifier)
        .await
        .unwrap();

    assert_eq!(report.cycle.phase, InvestigationPhase::Failed);
    assert!(report.assessments.is_empty());
}

#[tokio::test]
async fn test_continuation_threads_through_requests() {
    let (orchestrator, _) = setup_orchestrator(RemedyConfig::new());
    let reasoning = ScriptedReasoning::new().then(
        ReasoningTask::Analyze,
        Ok(Judgment::new("analyzed").with_continuation("session-7")),
    );

    orchestrator
        .run_investigation(&incident(), &reasoning, &ScriptedVerifier::new())
        .await
        .unwrap();

    let requests = reasoning.requests();
    assert_eq!(requests[0].continuation, None);
    assert_eq!(requests[1].continuation.as_deref(), Some("session-7"));
}

#[tokio::test]
async fn test_live_mode_restarts_through_cluster() {
    let cluster = RecordingCluster::new();
    let orchestrator = RemediationOrchestrator::new(RemedyConfig::new())
        .unwrap()
        .with_cluster(Arc::clone(&cluster) as Arc<dyn remedy_actions::ClusterClient>);
    let reasoning = ScriptedReasoning::new().deciding(restart_proposal());

    let report = orchestrator
        .run_investigation(&incident(), &reasoning, &ScriptedVerifier::new())
        .await
        .unwrap();

    assert!(report.succeeded());
    assert_eq!(report.actions[0].mode, ExecutionMode::Live);
    assert_eq!(
        cluster.calls(),
        vec![ClusterCall::Restart {
            target: target(),
            dry_run: false
        }]
    );
}

#[tokio::test]
async fn test_cycle_checkpointed_and_resumed() {
    let store = Arc::new(InMemoryCycleStore::new());
    let (orchestrator, _) = setup_orchestrator(RemedyConfig::new());
    let orchestrator = orchestrator.with_store(Arc::clone(&store) as Arc<dyn CycleStore>);

    let machine = orchestrator.investigation();
    machine
        .start(Cycle::new().with_context("incident", "inc-100"))
        .unwrap();
    machine.transition(InvestigationPhase::Analyzing).unwrap();
    machine.transition(InvestigationPhase::Deciding).unwrap();
    let cycle_id = orchestrator.persist_investigation().await.unwrap().unwrap();

    let (restarted, _) = setup_orchestrator(RemedyConfig::new());
    let restarted = restarted.with_store(Arc::clone(&store) as Arc<dyn CycleStore>);
    restarted.resume_investigation(cycle_id).await.unwrap();
    assert_eq!(restarted.investigation().phase(), InvestigationPhase::Deciding);

    let reasoning = ScriptedReasoning::new();
    let report = restarted
        .run_investigation(&incident(), &reasoning, &ScriptedVerifier::new())
        .await
        .unwrap();

    assert_eq!(report.cycle.id, cycle_id);
    assert!(report.succeeded());
    assert_eq!(reasoning.requests_for(ReasoningTask::Analyze), 0);

    let stored = store
        .load(InvestigationPhase::NAME, cycle_id)
        .await
        .unwrap()
        .unwrap();
    let snapshot = CycleSnapshot::<InvestigationPhase>::from_json(&stored.payload).unwrap();
    assert_eq!(snapshot.cycle.phase, InvestigationPhase::Completed);
}

#[tokio::test]
async fn test_resume_errors() {
    let (orchestrator, _) = setup_orchestrator(RemedyConfig::new());
    assert!(matches!(
        orchestrator.resume_investigation(CycleId::new()).await,
        Err(CoreError::NoStore)
    ));
    assert_eq!(orchestrator.persist_investigation().await.unwrap(), None);

    let orchestrator = orchestrator.with_store(Arc::new(InMemoryCycleStore::new()));
    assert!(matches!(
        orchestrator.resume_investigation(CycleId::new()).await,
        Err(CoreError::CycleNotFound {
            pipeline: "investigation",
            ..
        })
    ));
}

#[tokio::test]
async fn test_corrupt_snapshot_is_reported() {
    let store = Arc::new(InMemoryCycleStore::new());
    let cycle_id = CycleId::new();
    store
        .save(InvestigationPhase::NAME, cycle_id, "{not json".to_string())
        .await
        .unwrap();
    let (orchestrator, _) = setup_orchestrator(RemedyConfig::new());
    let orchestrator = orchestrator.with_store(store);

    let err = orchestrator.resume_investigation(cycle_id).await.unwrap_err();
    assert!(matches!(err, CoreError::Store(StoreError::Corrupt(_))));
}

#[tokio::test]
async fn test_store_failures_do_not_stop_cycle() {
    let mut store = MockStore::new();
    store
        .expect_save()
        .returning(|_, _, _| Err(StoreError::Backend("disk full".into())));
    let (orchestrator, _) = setup_orchestrator(RemedyConfig::new());
    let orchestrator = orchestrator.with_store(Arc::new(store));

    let report = orchestrator
        .run_investigation(&incident(), &ScriptedReasoning::new(), &ScriptedVerifier::new())
        .await
        .unwrap();

    assert!(report.succeeded());
    assert!(orchestrator.persist_investigation().await.is_err());
}
