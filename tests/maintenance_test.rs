mod common;

use std::sync::Arc;

use pretty_assertions::assert_eq;

use common::{test_db, test_graph, test_memory, ScriptedBackend};
use mindgraph::audit::AuditLog;
use mindgraph::config::{AuditConfig, MaintenanceConfig};
use mindgraph::counters::SystemCounters;
use mindgraph::error::{AppError, PipelineError};
use mindgraph::graph::NodePath;
use mindgraph::maintenance::{
    verify_change_set, ChangeSet, MaintenancePipeline, MaintenanceScheduler, TaskType,
};
use mindgraph::memory::{MemoryStatus, MemoryType, NewMemory};
use mindgraph::storage::Database;

const DISCOVER: &str = r#"{"focus_paths": [], "notes": "pressure building"}"#;
const ANALYZE: &str =
    r#"{"issues": [{"path": "root", "problem": "unsorted notes", "proposal": "add a topic node"}]}"#;
const APPROVE: &str = r#"{"approved": true, "reason": "sound plan"}"#;
const EMPTY_SET: &str = r#"{}"#;
const GOOD_SET: &str =
    r#"{"nodes": [{"parent_path": "root", "content": "integrated topic", "confidence": 0.8}]}"#;

struct Harness {
    pipeline: Arc<MaintenancePipeline>,
    counters: Arc<SystemCounters>,
    backend: Arc<ScriptedBackend>,
    _audit_dir: tempfile::TempDir,
}

async fn harness(
    db: &Database,
    backend: Arc<ScriptedBackend>,
    config: MaintenanceConfig,
) -> Harness {
    let graph = test_graph(db).await;
    let memory = test_memory(db);
    let counters = Arc::new(SystemCounters::new());
    let audit_dir = tempfile::tempdir().unwrap();
    let audit = AuditLog::new(&AuditConfig {
        dir: audit_dir.path().to_path_buf(),
    });

    let pipeline = Arc::new(MaintenancePipeline::new(
        graph,
        memory,
        backend.clone(),
        counters.clone(),
        audit,
        config,
    ));

    Harness {
        pipeline,
        counters,
        backend,
        _audit_dir: audit_dir,
    }
}

#[tokio::test]
async fn test_organize_retries_until_verification_passes() {
    let db = test_db().await;
    let backend =
        ScriptedBackend::replies(&[DISCOVER, ANALYZE, APPROVE, EMPTY_SET, EMPTY_SET, GOOD_SET]);
    let h = harness(&db, backend, MaintenanceConfig::default()).await;

    let report = h.pipeline.run(TaskType::Routine).await.unwrap();

    assert!(report.completed());
    assert_eq!(report.mutations.nodes_created, 1);
    // max_retries = 2 means three organize attempts in total.
    let organize_attempts = report.trace.iter().filter(|t| t.stage == "organize").count();
    assert_eq!(organize_attempts, 3);
    assert_eq!(h.backend.calls(), 6);

    let graph = test_graph(&db).await;
    let node = graph
        .get_node(&NodePath::parse("1").unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(node.content, "integrated topic");
}

#[tokio::test]
async fn test_validation_exhaustion_commits_nothing() {
    let db = test_db().await;
    let backend =
        ScriptedBackend::replies(&[DISCOVER, ANALYZE, APPROVE, EMPTY_SET, EMPTY_SET, EMPTY_SET]);
    let h = harness(&db, backend, MaintenanceConfig::default()).await;

    let report = h.pipeline.run(TaskType::Routine).await.unwrap();

    assert!(!report.completed());
    assert_eq!(report.mutations.total(), 0);
    assert!(report.error.as_deref().unwrap().contains("3 organize attempts"));
    assert_eq!(h.backend.calls(), 6);

    // The graph is untouched: root still has no children.
    let graph = test_graph(&db).await;
    let root = graph.get_node(&NodePath::root()).await.unwrap().unwrap();
    assert!(root.child_ids.is_empty());
}

#[tokio::test]
async fn test_review_rejection_short_circuits() {
    let db = test_db().await;
    let backend = ScriptedBackend::replies(&[
        DISCOVER,
        ANALYZE,
        r#"{"approved": false, "reason": "too speculative"}"#,
    ]);
    let h = harness(&db, backend, MaintenanceConfig::default()).await;

    let report = h.pipeline.run(TaskType::Routine).await.unwrap();

    assert!(!report.completed());
    assert!(report.error.as_deref().unwrap().contains("too speculative"));
    assert_eq!(report.mutations.total(), 0);
    // Organize and verify were never reached.
    assert_eq!(h.backend.calls(), 3);
}

#[tokio::test]
async fn test_stage_parse_failure_fails_the_task() {
    let db = test_db().await;
    let backend = ScriptedBackend::replies(&["this is not json"]);
    let h = harness(&db, backend, MaintenanceConfig::default()).await;

    let report = h.pipeline.run(TaskType::Routine).await.unwrap();

    assert!(!report.completed());
    assert!(report.error.as_deref().unwrap().contains("discover"));
    assert_eq!(report.mutations.total(), 0);
    assert_eq!(h.backend.calls(), 1);
}

#[tokio::test]
async fn test_memory_integration_commit_links_and_deprecates() {
    let db = test_db().await;
    let memory = test_memory(&db);
    let stale = memory.create(&NewMemory::working("raw turn note")).await.unwrap();

    let good_set = format!(
        r#"{{"memories": [{{"content": "collaborator works on async services",
            "memory_type": "high_level", "confidence": 0.9, "linked_node_ids": ["root"]}}],
            "deprecate_memory_ids": [{}]}}"#,
        stale
    );
    let backend = ScriptedBackend::replies(&[DISCOVER, ANALYZE, APPROVE, &good_set]);
    let h = harness(&db, backend, MaintenanceConfig::default()).await;

    let report = h.pipeline.run(TaskType::MemoryIntegration).await.unwrap();

    assert!(report.completed());
    assert_eq!(report.mutations.memories_created, 1);
    assert_eq!(report.mutations.memories_deprecated, 1);

    let deprecated = memory.get(stale).await.unwrap().unwrap();
    assert_eq!(deprecated.status, MemoryStatus::Deprecated);

    // The new record's summary was mirrored onto the linked node.
    let graph = test_graph(&db).await;
    let root = graph.get_node(&NodePath::root()).await.unwrap().unwrap();
    assert_eq!(root.memory_summaries.len(), 1);
    assert_eq!(root.memory_summaries[0].memory_type, MemoryType::HighLevel);

    let created = memory
        .get(root.memory_summaries[0].memory_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(created.content, "collaborator works on async services");
}

#[tokio::test]
async fn test_graph_repair_success_resets_failure_counter() {
    let db = test_db().await;
    let backend = ScriptedBackend::replies(&[DISCOVER, ANALYZE, APPROVE, GOOD_SET]);
    let h = harness(&db, backend, MaintenanceConfig::default()).await;

    h.counters.record_navigation_failure();
    h.counters.record_navigation_failure();
    assert_eq!(h.counters.navigation_failures(), 2);

    let report = h.pipeline.run(TaskType::GraphRepair).await.unwrap();
    assert!(report.completed());
    assert_eq!(h.counters.navigation_failures(), 0);
}

#[tokio::test]
async fn test_failed_graph_repair_keeps_failure_counter() {
    let db = test_db().await;
    let backend = ScriptedBackend::replies(&["not json"]);
    let h = harness(&db, backend, MaintenanceConfig::default()).await;

    h.counters.record_navigation_failure();
    let report = h.pipeline.run(TaskType::GraphRepair).await.unwrap();
    assert!(!report.completed());
    assert_eq!(h.counters.navigation_failures(), 1);
}

#[tokio::test]
async fn test_other_task_success_keeps_failure_counter() {
    let db = test_db().await;
    let backend = ScriptedBackend::replies(&[DISCOVER, ANALYZE, APPROVE, GOOD_SET]);
    let h = harness(&db, backend, MaintenanceConfig::default()).await;

    h.counters.record_navigation_failure();
    let report = h.pipeline.run(TaskType::MemoryIntegration).await.unwrap();
    assert!(report.completed());
    assert_eq!(h.counters.navigation_failures(), 1);
}

#[tokio::test]
async fn test_verification_is_idempotent() {
    let db = test_db().await;
    let graph = test_graph(&db).await;
    let memory = test_memory(&db);

    // Malformed set: dangling parent, bad confidence, missing tier.
    let change_set: ChangeSet = serde_json::from_str(
        r#"{"nodes": [{"parent_path": "9", "content": "", "confidence": 1.5}],
            "memories": [{"content": "x", "memory_type": "classified", "confidence": 0.5}]}"#,
    )
    .unwrap();

    let first = verify_change_set(&change_set, &graph, &memory).await.unwrap();
    let second = verify_change_set(&change_set, &graph, &memory).await.unwrap();
    assert!(!first.is_empty());
    assert_eq!(first.len(), second.len());
    let render = |issues: &[mindgraph::maintenance::ValidationIssue]| {
        issues.iter().map(|i| i.to_string()).collect::<Vec<_>>()
    };
    assert_eq!(render(&first), render(&second));
}

fn scheduler_config() -> MaintenanceConfig {
    MaintenanceConfig {
        working_memory_limit: 0,
        navigation_failure_limit: 0,
        ..MaintenanceConfig::default()
    }
}

#[tokio::test]
async fn test_threshold_precedence_prefers_graph_repair() {
    let db = test_db().await;
    let memory = test_memory(&db);
    let backend = ScriptedBackend::replies(&[]);
    let h = harness(&db, backend, scheduler_config()).await;
    let scheduler = MaintenanceScheduler::new(
        h.pipeline.clone(),
        memory.clone(),
        h.counters.clone(),
        scheduler_config(),
    );

    assert_eq!(scheduler.check_thresholds().await.unwrap(), None);

    memory.create(&NewMemory::working("note")).await.unwrap();
    assert_eq!(
        scheduler.check_thresholds().await.unwrap(),
        Some(TaskType::MemoryIntegration)
    );

    // Both thresholds crossed: graph repair wins.
    h.counters.record_navigation_failure();
    assert_eq!(
        scheduler.check_thresholds().await.unwrap(),
        Some(TaskType::GraphRepair)
    );
}

#[tokio::test]
async fn test_trigger_suppressed_while_task_in_flight() {
    let db = test_db().await;
    let memory = test_memory(&db);
    memory.create(&NewMemory::working("note")).await.unwrap();

    let backend = ScriptedBackend::replies(&[]);
    let h = harness(&db, backend, scheduler_config()).await;
    let scheduler = MaintenanceScheduler::new(
        h.pipeline.clone(),
        memory,
        h.counters.clone(),
        scheduler_config(),
    );

    // Hold the single in-flight slot: the due trigger must be suppressed,
    // not queued.
    let permit = scheduler.try_begin().unwrap();
    assert_eq!(scheduler.trigger_if_due().await.unwrap(), None);

    let err = scheduler.run_now(TaskType::Routine).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::Pipeline(PipelineError::AlreadyRunning)
    ));

    // Once the slot frees up the trigger dispatches.
    drop(permit);
    assert_eq!(
        scheduler.trigger_if_due().await.unwrap(),
        Some(TaskType::MemoryIntegration)
    );
}
