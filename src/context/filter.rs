use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::backend::Backend;
use crate::error::AppResult;
use crate::graph::{GraphStore, MemorySummary, NodePath};
use crate::memory::{MemoryRecord, MemoryStore};
use crate::navigation::parse_id_selection;
use crate::prompts::MEMORY_FILTER_PROMPT;

/// Selects the relevant subset of memories reachable from terminal nodes.
pub struct MemoryFilter {
    graph: GraphStore,
    memory: MemoryStore,
    backend: Arc<dyn Backend>,
}

impl MemoryFilter {
    /// Create a new filter
    pub fn new(graph: GraphStore, memory: MemoryStore, backend: Arc<dyn Backend>) -> Self {
        Self {
            graph,
            memory,
            backend,
        }
    }

    /// Pick relevant full records for the terminal node set.
    ///
    /// Empty candidates short-circuit without a backend call. An unparsable
    /// or empty backend reply yields an empty selection, never an error.
    /// Selected ids that no longer resolve in the memory store are dropped
    /// with a warning.
    pub async fn select(
        &self,
        terminals: &[NodePath],
        user_input: &str,
    ) -> AppResult<Vec<MemoryRecord>> {
        let candidates = self.collect_candidates(terminals).await?;
        if candidates.is_empty() {
            debug!("No candidate memories on terminal nodes");
            return Ok(Vec::new());
        }

        let prompt = build_candidate_prompt(&candidates, user_input);
        let selected_ids = match self.backend.generate(MEMORY_FILTER_PROMPT, &prompt).await {
            Ok(raw) => parse_id_selection(&raw),
            Err(e) => {
                warn!(error = %e, "Memory filter backend call failed, selecting nothing");
                Vec::new()
            }
        };

        if selected_ids.is_empty() {
            return Ok(Vec::new());
        }

        // Keep only ids that were actually offered as candidates.
        let offered: Vec<i64> = selected_ids
            .into_iter()
            .filter(|id| candidates.contains_key(id))
            .collect();

        let records = self.memory.get_many(&offered).await?;
        debug!(
            candidates = candidates.len(),
            selected = records.len(),
            "Memory filter complete"
        );
        Ok(records)
    }

    /// Union of terminal nodes' memory summaries, deduplicated by memory id.
    async fn collect_candidates(
        &self,
        terminals: &[NodePath],
    ) -> AppResult<BTreeMap<i64, MemorySummary>> {
        let mut candidates = BTreeMap::new();
        for path in terminals {
            if let Some(node) = self.graph.get_node(path).await? {
                for summary in node.memory_summaries {
                    candidates.entry(summary.memory_id).or_insert(summary);
                }
            }
        }
        Ok(candidates)
    }
}

fn build_candidate_prompt(candidates: &BTreeMap<i64, MemorySummary>, user_input: &str) -> String {
    let mut prompt = format!("User input: {}\n\nCandidate memories:\n", user_input);
    for (id, summary) in candidates {
        let tier = summary
            .value_tier
            .map(|t| format!("/{}", t))
            .unwrap_or_default();
        prompt.push_str(&format!(
            "- id {} [{}{}]: {}\n",
            id, summary.memory_type, tier, summary.snippet
        ));
    }
    prompt
}
