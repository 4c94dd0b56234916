use std::sync::Arc;

use chrono::Utc;
use serde::de::DeserializeOwned;
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::AuditLog;
use crate::backend::{strip_code_fences, truncate, Backend};
use crate::config::MaintenanceConfig;
use crate::counters::SystemCounters;
use crate::error::{AppResult, PipelineError, StorageResult};
use crate::graph::{GraphStore, MemorySummary, NodePath};
use crate::memory::{MemoryStore, MemoryType, NewMemory, ValueTier};
use crate::prompts::{ANALYZE_PROMPT, DISCOVER_PROMPT, ORGANIZE_PROMPT, REVIEW_PROMPT};

use super::types::{
    AnalysisReport, ChangeSet, DiscoveryReport, MutationSummary, ProposedNode, ReviewVerdict,
    StageTrace, TaskReport, TaskStatus, TaskType,
};
use super::verify::verify_change_set;

/// The five-stage maintenance chain (discover → analyze → review → organize
/// → verify), with the single commit point after verify.
///
/// No mutation is written on any earlier failure; the organize→verify gate
/// retries up to `max_retries` times carrying the validation issues forward.
pub struct MaintenancePipeline {
    graph: GraphStore,
    memory: MemoryStore,
    backend: Arc<dyn Backend>,
    counters: Arc<SystemCounters>,
    audit: AuditLog,
    config: MaintenanceConfig,
}

impl MaintenancePipeline {
    /// Create a new pipeline
    pub fn new(
        graph: GraphStore,
        memory: MemoryStore,
        backend: Arc<dyn Backend>,
        counters: Arc<SystemCounters>,
        audit: AuditLog,
        config: MaintenanceConfig,
    ) -> Self {
        Self {
            graph,
            memory,
            backend,
            counters,
            audit,
            config,
        }
    }

    /// Run one maintenance task to completion or failure.
    ///
    /// The report carries the full per-stage trace either way and is appended
    /// to the audit log. Storage faults propagate as errors; every
    /// backend/parse/review/validation failure ends as a `Failed` report with
    /// zero mutations.
    pub async fn run(&self, task_type: TaskType) -> AppResult<TaskReport> {
        let task_id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut trace = Vec::new();

        info!(task_id = %task_id, task_type = %task_type, "Maintenance task started");

        let result = self.execute(task_type, &mut trace).await?;

        let report = match result {
            Ok(mutations) => {
                if task_type == TaskType::GraphRepair {
                    // The failure counter is the repair trigger; it resets
                    // only when a repair actually lands.
                    self.counters.reset_navigation_failures();
                }
                info!(
                    task_id = %task_id,
                    mutations = mutations.total(),
                    "Maintenance task completed"
                );
                TaskReport {
                    task_id,
                    task_type,
                    status: TaskStatus::Completed,
                    trace,
                    mutations,
                    error: None,
                    started_at,
                    finished_at: Utc::now(),
                }
            }
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "Maintenance task failed, nothing committed");
                TaskReport {
                    task_id,
                    task_type,
                    status: TaskStatus::Failed,
                    trace,
                    mutations: MutationSummary::default(),
                    error: Some(e.to_string()),
                    started_at,
                    finished_at: Utc::now(),
                }
            }
        };

        self.audit.append("maintenance", &report);
        Ok(report)
    }

    async fn execute(
        &self,
        task_type: TaskType,
        trace: &mut Vec<StageTrace>,
    ) -> AppResult<Result<MutationSummary, PipelineError>> {
        // Stage 1: discover.
        let discover_prompt = self.build_discover_prompt(task_type).await?;
        let discovery: DiscoveryReport =
            match self.call_stage("discover", DISCOVER_PROMPT, &discover_prompt, 1, trace).await? {
                Ok(v) => v,
                Err(e) => return Ok(Err(e)),
            };

        // Stage 2: analyze.
        let analyze_prompt = self.build_analyze_prompt(&discovery).await?;
        let analysis: AnalysisReport =
            match self.call_stage("analyze", ANALYZE_PROMPT, &analyze_prompt, 1, trace).await? {
                Ok(v) => v,
                Err(e) => return Ok(Err(e)),
            };

        // Stage 3: review gate. Rejection short-circuits with no mutation.
        let analysis_json = serde_json::to_string_pretty(&analysis).unwrap_or_default();
        let verdict: ReviewVerdict =
            match self.call_stage("review", REVIEW_PROMPT, &analysis_json, 1, trace).await? {
                Ok(v) => v,
                Err(e) => return Ok(Err(e)),
            };
        if !verdict.approved {
            trace.push(StageTrace {
                stage: "review".to_string(),
                attempt: 1,
                ok: false,
                detail: format!("rejected: {}", verdict.reason),
            });
            return Ok(Err(PipelineError::Rejected {
                reason: verdict.reason,
            }));
        }

        // Stages 4+5: organize → verify, with bounded retries carrying the
        // validation issues forward as additional organize input.
        let mut issues: Vec<String> = Vec::new();
        let max_attempts = self.config.max_retries + 1;
        for attempt in 1..=max_attempts {
            let organize_prompt = self.build_organize_prompt(&analysis, &verdict, &issues);
            let change_set: ChangeSet = match self
                .call_stage("organize", ORGANIZE_PROMPT, &organize_prompt, attempt, trace)
                .await?
            {
                Ok(v) => v,
                Err(e) => return Ok(Err(e)),
            };

            let found = verify_change_set(&change_set, &self.graph, &self.memory).await?;
            if found.is_empty() {
                trace.push(StageTrace {
                    stage: "verify".to_string(),
                    attempt,
                    ok: true,
                    detail: format!(
                        "{} nodes, {} memories, {} deprecations",
                        change_set.nodes.len(),
                        change_set.memories.len(),
                        change_set.deprecate_memory_ids.len()
                    ),
                });

                // Single commit point: the only place mutations are written.
                let mutations = self.commit(&change_set).await?;
                return Ok(Ok(mutations));
            }

            issues = found.iter().map(|i| i.to_string()).collect();
            trace.push(StageTrace {
                stage: "verify".to_string(),
                attempt,
                ok: false,
                detail: issues.join("; "),
            });
            warn!(attempt, issues = issues.len(), "Change set failed verification");
        }

        Ok(Err(PipelineError::ValidationExhausted {
            attempts: max_attempts,
            issues,
        }))
    }

    /// Call one backend stage and parse its reply into `T`
    async fn call_stage<T: DeserializeOwned>(
        &self,
        stage: &str,
        system: &str,
        prompt: &str,
        attempt: u32,
        trace: &mut Vec<StageTrace>,
    ) -> AppResult<Result<T, PipelineError>> {
        let raw = match self.backend.generate(system, prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                trace.push(StageTrace {
                    stage: stage.to_string(),
                    attempt,
                    ok: false,
                    detail: e.to_string(),
                });
                return Ok(Err(PipelineError::StageBackend {
                    stage: stage.to_string(),
                    message: e.to_string(),
                }));
            }
        };

        match serde_json::from_str::<T>(strip_code_fences(&raw)) {
            Ok(parsed) => {
                trace.push(StageTrace {
                    stage: stage.to_string(),
                    attempt,
                    ok: true,
                    detail: truncate(&raw, 200),
                });
                Ok(Ok(parsed))
            }
            Err(e) => {
                trace.push(StageTrace {
                    stage: stage.to_string(),
                    attempt,
                    ok: false,
                    detail: format!("{} (raw: {})", e, truncate(&raw, 200)),
                });
                Ok(Err(PipelineError::StageParse {
                    stage: stage.to_string(),
                    message: e.to_string(),
                }))
            }
        }
    }

    async fn build_discover_prompt(&self, task_type: TaskType) -> AppResult<String> {
        let working = self
            .memory
            .recent_working(self.config.discover_sample_size)
            .await?;
        let working_count = self.memory.count_working().await?;

        let mut prompt = format!(
            "Task type: {}\nWorking memories: {} (threshold {})\nNavigation failures: {} (threshold {})\n\nRecent working memories:\n",
            task_type,
            working_count,
            self.config.working_memory_limit,
            self.counters.navigation_failures(),
            self.config.navigation_failure_limit,
        );
        if working.is_empty() {
            prompt.push_str("(none)\n");
        }
        for record in &working {
            prompt.push_str(&format!("- [{}] {}\n", record.id, truncate(&record.content, 160)));
        }
        Ok(prompt)
    }

    async fn build_analyze_prompt(&self, discovery: &DiscoveryReport) -> AppResult<String> {
        let mut prompt = String::from("Flagged paths:\n");
        if discovery.focus_paths.is_empty() {
            prompt.push_str("(none)\n");
        }
        for raw_path in &discovery.focus_paths {
            match NodePath::parse(raw_path) {
                Ok(path) => match self.graph.get_node(&path).await? {
                    Some(node) => {
                        let children: Vec<String> =
                            node.child_ids.iter().map(|c| c.to_string()).collect();
                        prompt.push_str(&format!(
                            "- {} (confidence {:.2}, children: [{}]): {}\n",
                            path,
                            node.confidence,
                            children.join(", "),
                            truncate(&node.content, 200)
                        ));
                    }
                    None => prompt.push_str(&format!("- {} (missing)\n", path)),
                },
                Err(_) => prompt.push_str(&format!("- {} (malformed path)\n", raw_path)),
            }
        }
        if let Some(notes) = &discovery.notes {
            prompt.push_str(&format!("\nDiscovery notes: {}\n", notes));
        }
        Ok(prompt)
    }

    fn build_organize_prompt(
        &self,
        analysis: &AnalysisReport,
        verdict: &ReviewVerdict,
        issues: &[String],
    ) -> String {
        let mut prompt = format!(
            "Approved analysis ({}):\n{}\n",
            verdict.reason,
            serde_json::to_string_pretty(analysis).unwrap_or_default()
        );
        if !issues.is_empty() {
            prompt.push_str(
                "\nYour previous change set failed structural verification. Fix these issues:\n",
            );
            for issue in issues {
                prompt.push_str(&format!("- {}\n", issue));
            }
        }
        prompt
    }

    /// Apply a verified change set to both stores.
    ///
    /// Every statement runs on one transaction; a fault anywhere in the batch
    /// rolls the whole change set back, so a failed task leaves zero
    /// mutations behind. The index-allocation lock is held across the batch
    /// because new nodes may be created mid-transaction.
    async fn commit(&self, change_set: &ChangeSet) -> StorageResult<MutationSummary> {
        let _guard = self.graph.alloc_guard().await;
        let mut tx = self.graph.database().pool().begin().await?;

        match self.commit_on(&mut tx, change_set).await {
            Ok(summary) => {
                tx.commit().await?;
                Ok(summary)
            }
            Err(e) => {
                tx.rollback().await?;
                Err(e)
            }
        }
    }

    async fn commit_on(
        &self,
        tx: &mut sqlx::SqliteConnection,
        change_set: &ChangeSet,
    ) -> StorageResult<MutationSummary> {
        let mut summary = MutationSummary::default();

        // Explicit-path nodes first, parents before children, so a new
        // subtree introduced in one change set commits cleanly.
        let mut explicit: Vec<&ProposedNode> =
            change_set.nodes.iter().filter(|n| n.path.is_some()).collect();
        explicit.sort_by_key(|n| {
            n.path
                .as_deref()
                .and_then(|p| NodePath::parse(p).ok())
                .map(|p| p.depth())
                .unwrap_or(u32::MAX)
        });

        for node in explicit {
            let path = NodePath::parse(node.path.as_deref().unwrap_or_default())?;
            if self.graph.node_exists_on(&mut *tx, &path).await? {
                self.graph
                    .update_node_fields_on(&mut *tx, &path, &node.content, node.confidence)
                    .await?;
                summary.nodes_updated += 1;
            } else {
                self.graph
                    .create_node_at_on(&mut *tx, &path, &node.content, node.confidence)
                    .await?;
                summary.nodes_created += 1;
            }
        }

        for node in change_set.nodes.iter().filter(|n| n.path.is_none()) {
            let parent = NodePath::parse(node.parent_path.as_deref().unwrap_or_default())?;
            self.graph
                .create_node_on(&mut *tx, &parent, &node.content, node.confidence)
                .await?;
            summary.nodes_created += 1;
        }

        for mem in &change_set.memories {
            let memory_type: MemoryType = mem.memory_type.parse().unwrap_or_default();
            let value_tier: Option<ValueTier> =
                mem.value_tier.as_deref().and_then(|t| t.parse().ok());
            let links: Vec<NodePath> = mem
                .linked_node_ids
                .iter()
                .filter_map(|p| NodePath::parse(p).ok())
                .collect();

            match mem.id {
                Some(id) => {
                    let Some(mut record) = self.memory.get_on(&mut *tx, id).await? else {
                        return Err(crate::error::StorageError::MemoryNotFound { id });
                    };
                    record.content = mem.content.clone();
                    record.memory_type = memory_type;
                    record.value_tier = value_tier;
                    record.confidence = mem.confidence;
                    record.linked_node_ids = links;
                    self.memory.update_on(&mut *tx, &record).await?;
                    summary.memories_updated += 1;
                }
                None => {
                    let new = NewMemory {
                        content: mem.content.clone(),
                        memory_type,
                        value_tier,
                        confidence: mem.confidence,
                        linked_node_ids: links.clone(),
                    };
                    let id = self.memory.create_on(&mut *tx, &new).await?;
                    summary.memories_created += 1;

                    // Mirror the link on each referenced node so navigation
                    // can surface the new record.
                    for link in &links {
                        if self.graph.node_exists_on(&mut *tx, link).await? {
                            self.graph
                                .add_memory_link_on(
                                    &mut *tx,
                                    link,
                                    &MemorySummary {
                                        memory_id: id,
                                        snippet: truncate(&mem.content, 160),
                                        memory_type,
                                        value_tier,
                                        confidence: mem.confidence,
                                    },
                                )
                                .await?;
                        }
                    }
                }
            }
        }

        for &id in &change_set.deprecate_memory_ids {
            self.memory.deprecate_on(&mut *tx, id).await?;
            summary.memories_deprecated += 1;
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuditConfig;
    use crate::error::{BackendError, BackendResult, StorageError};
    use crate::storage::Database;

    struct OfflineBackend;

    #[async_trait::async_trait]
    impl Backend for OfflineBackend {
        async fn generate(&self, _system: &str, _prompt: &str) -> BackendResult<String> {
            Err(BackendError::Unavailable {
                message: "offline".to_string(),
                retries: 0,
            })
        }
    }

    async fn pipeline_over(db: &Database, dir: &std::path::Path) -> (MaintenancePipeline, GraphStore) {
        let graph = GraphStore::new(db.clone());
        graph.ensure_root().await.unwrap();
        let memory = MemoryStore::new(db.clone());
        let audit = AuditLog::new(&AuditConfig {
            dir: dir.to_path_buf(),
        });
        let pipeline = MaintenancePipeline::new(
            graph.clone(),
            memory,
            Arc::new(OfflineBackend),
            Arc::new(SystemCounters::new()),
            audit,
            MaintenanceConfig::default(),
        );
        (pipeline, graph)
    }

    #[tokio::test]
    async fn test_commit_rolls_back_on_mid_batch_failure() {
        let db = Database::new_in_memory().await.unwrap();
        let tmp = tempfile::tempdir().unwrap();
        let (pipeline, graph) = pipeline_over(&db, tmp.path()).await;

        // "1" commits cleanly; "7.2" has no parent and faults mid-batch.
        let change_set: ChangeSet = serde_json::from_str(
            r#"{"nodes":[
                {"path":"1","content":"ok","confidence":0.9},
                {"path":"7.2","content":"dangling","confidence":0.9}
            ]}"#,
        )
        .unwrap();

        let err = pipeline.commit(&change_set).await.unwrap_err();
        assert!(matches!(err, StorageError::ParentNotFound { .. }));

        // The earlier node must not survive the failed batch.
        let one = NodePath::parse("1").unwrap();
        assert!(!graph.node_exists(&one).await.unwrap());
    }

    #[tokio::test]
    async fn test_commit_applies_whole_batch() {
        let db = Database::new_in_memory().await.unwrap();
        let tmp = tempfile::tempdir().unwrap();
        let (pipeline, graph) = pipeline_over(&db, tmp.path()).await;

        let change_set: ChangeSet = serde_json::from_str(
            r#"{"nodes":[
                {"path":"1","content":"parent","confidence":0.9},
                {"path":"1.1","content":"child","confidence":0.8}
            ]}"#,
        )
        .unwrap();

        let summary = pipeline.commit(&change_set).await.unwrap();
        assert_eq!(summary.nodes_created, 2);
        let child = NodePath::parse("1.1").unwrap();
        assert!(graph.node_exists(&child).await.unwrap());
    }
}
