//! Explicit application state, constructed once at startup.
//!
//! Every component receives its dependencies through this container; there
//! are no process-global singletons.

use std::sync::Arc;

use crate::audit::AuditLog;
use crate::backend::{Backend, HttpBackend};
use crate::config::Config;
use crate::counters::SystemCounters;
use crate::error::AppResult;
use crate::graph::GraphStore;
use crate::maintenance::{MaintenancePipeline, MaintenanceScheduler};
use crate::memory::MemoryStore;
use crate::storage::Database;
use crate::turn::TurnEngine;

/// Shared application state
pub struct AppState {
    config: Config,
    graph: GraphStore,
    memory: MemoryStore,
    backend: Arc<dyn Backend>,
    counters: Arc<SystemCounters>,
    audit: AuditLog,
    scheduler: Arc<MaintenanceScheduler>,
    turn: TurnEngine,
}

impl AppState {
    /// Wire up every component from configuration and an open database.
    ///
    /// Runs migrations and ensures the graph root exists, so callers get a
    /// usable system back.
    pub async fn new(config: Config, db: Database) -> AppResult<Self> {
        let graph = GraphStore::new(db.clone());
        graph.ensure_root().await?;
        let memory = MemoryStore::new(db);

        let backend: Arc<dyn Backend> = Arc::new(HttpBackend::new(
            &config.backend,
            config.request.clone(),
        )?);
        let counters = Arc::new(SystemCounters::new());
        let audit = AuditLog::new(&config.audit);

        let pipeline = Arc::new(MaintenancePipeline::new(
            graph.clone(),
            memory.clone(),
            backend.clone(),
            counters.clone(),
            audit.clone(),
            config.maintenance.clone(),
        ));
        let scheduler = Arc::new(MaintenanceScheduler::new(
            pipeline,
            memory.clone(),
            counters.clone(),
            config.maintenance.clone(),
        ));

        let turn = TurnEngine::new(
            graph.clone(),
            memory.clone(),
            backend.clone(),
            counters.clone(),
            audit.clone(),
            scheduler.clone(),
            config.navigation.clone(),
            config.context.clone(),
        );

        Ok(Self {
            config,
            graph,
            memory,
            backend,
            counters,
            audit,
            scheduler,
            turn,
        })
    }

    /// Application configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Knowledge graph store
    pub fn graph(&self) -> &GraphStore {
        &self.graph
    }

    /// Episodic memory store
    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    /// Inference backend
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// System counters
    pub fn counters(&self) -> &Arc<SystemCounters> {
        &self.counters
    }

    /// Audit log writer
    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Maintenance scheduler
    pub fn scheduler(&self) -> &Arc<MaintenanceScheduler> {
        &self.scheduler
    }

    /// Turn engine
    pub fn turn(&self) -> &TurnEngine {
        &self.turn
    }
}
