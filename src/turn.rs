//! One user turn: navigate → filter → assemble → respond → record.
//!
//! Navigation failures inside a turn are absorbed into the degraded-context
//! fallback so the user always receives a reply; only a backend outage on the
//! final response generation surfaces as an error to the collaborator.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::audit::AuditLog;
use crate::backend::Backend;
use crate::config::{ContextConfig, NavigationConfig};
use crate::context::{ContextAssembler, MemoryFilter};
use crate::counters::SystemCounters;
use crate::error::AppResult;
use crate::graph::GraphStore;
use crate::maintenance::MaintenanceScheduler;
use crate::memory::{MemoryStore, NewMemory};
use crate::navigation::NavigationEngine;
use crate::prompts::RESPONDER_PROMPT;

/// What a completed turn hands back to the collaborator.
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    /// The generated reply.
    pub response: String,
    /// The context package was the degraded fallback variant.
    pub used_fallback: bool,
    /// Memory records created by this turn.
    pub new_memory_ids: Vec<i64>,
}

/// Drives the synchronous turn path.
pub struct TurnEngine {
    graph: GraphStore,
    memory: MemoryStore,
    backend: Arc<dyn Backend>,
    counters: Arc<SystemCounters>,
    audit: AuditLog,
    scheduler: Arc<MaintenanceScheduler>,
    navigation: NavigationConfig,
    context: ContextConfig,
}

impl TurnEngine {
    /// Create a new turn engine
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        graph: GraphStore,
        memory: MemoryStore,
        backend: Arc<dyn Backend>,
        counters: Arc<SystemCounters>,
        audit: AuditLog,
        scheduler: Arc<MaintenanceScheduler>,
        navigation: NavigationConfig,
        context: ContextConfig,
    ) -> Self {
        Self {
            graph,
            memory,
            backend,
            counters,
            audit,
            scheduler,
            navigation,
            context,
        }
    }

    /// Process one user turn.
    pub async fn process_turn(&self, user_input: &str) -> AppResult<TurnOutcome> {
        let recent = self.memory.recent_working(self.context.history_window).await?;
        let recent_context: String = recent
            .iter()
            .rev()
            .map(|r| format!("- {}", r.content))
            .collect::<Vec<_>>()
            .join("\n");

        let engine = NavigationEngine::new(
            self.graph.clone(),
            self.backend.clone(),
            self.navigation.clone(),
            self.counters.clone(),
        );
        let navigation = engine.navigate(user_input, &recent_context).await?;
        self.audit.append("navigation", &navigation);

        let assembler = ContextAssembler::new(self.memory.clone(), self.context.clone());
        let package = if navigation.failed() {
            assembler.assemble_fallback(user_input).await?
        } else {
            let filter = MemoryFilter::new(
                self.graph.clone(),
                self.memory.clone(),
                self.backend.clone(),
            );
            let retrieved = filter.select(&navigation.terminals, user_input).await?;
            assembler.assemble(user_input, retrieved).await?
        };

        let response = self
            .backend
            .generate(RESPONDER_PROMPT, &package.render())
            .await?;

        // Record the turn as a working memory, linked to the terminals that
        // grounded it (none in fallback mode).
        let links = if navigation.failed() {
            Vec::new()
        } else {
            navigation.terminals.clone()
        };
        let memory_id = self
            .memory
            .create(
                &NewMemory::working(format!("User: {}\nAssistant: {}", user_input, response))
                    .with_links(links),
            )
            .await?;

        info!(
            used_fallback = package.degraded,
            terminals = navigation.terminals.len(),
            memory_id,
            "Turn complete"
        );

        // Turn completion is a trigger point; suppression and dispatch are
        // the scheduler's concern.
        if let Err(e) = self.scheduler.trigger_if_due().await {
            warn!(error = %e, "Maintenance trigger check failed");
        }

        Ok(TurnOutcome {
            response,
            used_fallback: package.degraded,
            new_memory_ids: vec![memory_id],
        })
    }
}
