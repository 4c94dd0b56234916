use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a maintenance task is trying to fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Repair the graph after repeated navigation failures.
    GraphRepair,
    /// Integrate accumulated working memories into the tree.
    MemoryIntegration,
    /// Periodic idle sweep.
    Routine,
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskType::GraphRepair => write!(f, "graph_repair"),
            TaskType::MemoryIntegration => write!(f, "memory_integration"),
            TaskType::Routine => write!(f, "routine"),
        }
    }
}

impl std::str::FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "graph_repair" => Ok(TaskType::GraphRepair),
            "memory_integration" => Ok(TaskType::MemoryIntegration),
            "routine" => Ok(TaskType::Routine),
            _ => Err(format!("Unknown task type: {}", s)),
        }
    }
}

/// Final state of a maintenance task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// All gates passed; mutations committed.
    Completed,
    /// A gate failed; nothing was written.
    Failed,
}

/// One stage attempt in the task trace.
#[derive(Debug, Clone, Serialize)]
pub struct StageTrace {
    pub stage: String,
    pub attempt: u32,
    pub ok: bool,
    pub detail: String,
}

/// Counts of committed mutations.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MutationSummary {
    pub nodes_created: u32,
    pub nodes_updated: u32,
    pub memories_created: u32,
    pub memories_updated: u32,
    pub memories_deprecated: u32,
}

impl MutationSummary {
    /// Total mutation count
    pub fn total(&self) -> u32 {
        self.nodes_created
            + self.nodes_updated
            + self.memories_created
            + self.memories_updated
            + self.memories_deprecated
    }
}

/// Full record of one task run, kept for audit.
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub task_id: Uuid,
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub trace: Vec<StageTrace>,
    pub mutations: MutationSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl TaskReport {
    /// Whether the task committed its mutations
    pub fn completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }
}

// ---------------------------------------------------------------------------
// Stage outputs (parsed from backend replies)
// ---------------------------------------------------------------------------

/// Stage 1 output: paths needing attention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryReport {
    #[serde(default)]
    pub focus_paths: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// One issue found by analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisIssue {
    pub path: String,
    pub problem: String,
    pub proposal: String,
}

/// Stage 2 output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    #[serde(default)]
    pub issues: Vec<AnalysisIssue>,
}

/// Stage 3 output: the review gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewVerdict {
    pub approved: bool,
    #[serde(default)]
    pub reason: String,
}

/// A full node document proposed by the organize stage.
///
/// Exactly one of `path` (explicit address, update-or-insert) or
/// `parent_path` (store allocates the index) must be set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposedNode {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub parent_path: Option<String>,
    pub content: String,
    pub confidence: f64,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// A full memory document proposed by the organize stage.
///
/// `id` present means whole-document update of an existing record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposedMemory {
    #[serde(default)]
    pub id: Option<i64>,
    pub content: String,
    pub memory_type: String,
    #[serde(default)]
    pub value_tier: Option<String>,
    pub confidence: f64,
    #[serde(default)]
    pub linked_node_ids: Vec<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Stage 4 output: the complete set of proposed mutations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangeSet {
    #[serde(default)]
    pub nodes: Vec<ProposedNode>,
    #[serde(default)]
    pub memories: Vec<ProposedMemory>,
    #[serde(default)]
    pub deprecate_memory_ids: Vec<i64>,
}

impl ChangeSet {
    /// Whether the set proposes no mutations at all
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.memories.is_empty() && self.deprecate_memory_ids.is_empty()
    }
}
