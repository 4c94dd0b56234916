use serde::Serialize;
use tracing::debug;

use crate::config::ContextConfig;
use crate::error::AppResult;
use crate::memory::{MemoryRecord, MemoryStore, MemoryType};

/// The assembled context for one response generation.
#[derive(Debug, Clone, Serialize)]
pub struct ContextPackage {
    /// Assembled without graph-sourced memories (navigation failed).
    pub degraded: bool,
    /// Persistent meta-cognitive memories (at most N).
    pub meta_memories: Vec<MemoryRecord>,
    /// Recent working-memory turns, oldest first.
    pub history: Vec<MemoryRecord>,
    /// Memories selected by the filter; empty in degraded mode.
    pub retrieved: Vec<MemoryRecord>,
    /// The raw user input.
    pub user_input: String,
}

impl ContextPackage {
    /// Render the package as the structured text handed to the responder.
    pub fn render(&self) -> String {
        let mut out = String::new();

        if self.degraded {
            out.push_str("[degraded context: no graph-sourced memories]\n\n");
        }

        if !self.meta_memories.is_empty() {
            out.push_str("## Persistent memory\n");
            for record in &self.meta_memories {
                out.push_str(&format!("- {}\n", record.content));
            }
            out.push('\n');
        }

        if !self.history.is_empty() {
            out.push_str("## Recent turns\n");
            for record in &self.history {
                out.push_str(&format!("- {}\n", record.content));
            }
            out.push('\n');
        }

        if !self.retrieved.is_empty() {
            out.push_str("## Retrieved memories\n");
            for record in &self.retrieved {
                out.push_str(&format!("- {}\n", record.content));
            }
            out.push('\n');
        }

        out.push_str("## User input\n");
        out.push_str(&self.user_input);
        out
    }
}

/// Merges memories, conversation history and the user input in fixed order.
pub struct ContextAssembler {
    memory: MemoryStore,
    config: ContextConfig,
}

impl ContextAssembler {
    /// Create a new assembler
    pub fn new(memory: MemoryStore, config: ContextConfig) -> Self {
        Self { memory, config }
    }

    /// Assemble a fully-grounded package from the filtered memories.
    pub async fn assemble(
        &self,
        user_input: &str,
        retrieved: Vec<MemoryRecord>,
    ) -> AppResult<ContextPackage> {
        let mut package = self.base_package(user_input).await?;
        package.retrieved = retrieved;
        debug!(
            meta = package.meta_memories.len(),
            history = package.history.len(),
            retrieved = package.retrieved.len(),
            "Context assembled"
        );
        Ok(package)
    }

    /// Assemble the degraded fallback: persistent memories, recent turns and
    /// the raw user input only.
    pub async fn assemble_fallback(&self, user_input: &str) -> AppResult<ContextPackage> {
        let mut package = self.base_package(user_input).await?;
        package.degraded = true;
        debug!("Degraded context assembled");
        Ok(package)
    }

    async fn base_package(&self, user_input: &str) -> AppResult<ContextPackage> {
        let meta_memories = self
            .memory
            .list_by_type(MemoryType::MetaCognitive, self.config.max_meta_memories)
            .await?;

        // Stored newest-first; rendered oldest-first.
        let mut history = self.memory.recent_working(self.config.history_window).await?;
        history.reverse();

        Ok(ContextPackage {
            degraded: false,
            meta_memories,
            history,
            retrieved: Vec::new(),
            user_input: user_input.to_string(),
        })
    }
}
