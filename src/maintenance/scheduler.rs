use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info};

use crate::config::MaintenanceConfig;
use crate::counters::SystemCounters;
use crate::error::{AppResult, PipelineError, StorageResult};
use crate::memory::MemoryStore;

use super::pipeline::MaintenancePipeline;
use super::types::{TaskReport, TaskType};

/// Decides when maintenance runs and keeps at most one task in flight.
///
/// The in-flight guard is a single-permit semaphore owned here; background
/// tasks hold the permit for their whole run, so threshold triggers fired
/// while a task is active are suppressed rather than queued.
pub struct MaintenanceScheduler {
    pipeline: Arc<MaintenancePipeline>,
    memory: MemoryStore,
    counters: Arc<SystemCounters>,
    config: MaintenanceConfig,
    inflight: Arc<Semaphore>,
}

impl MaintenanceScheduler {
    /// Create a new scheduler
    pub fn new(
        pipeline: Arc<MaintenancePipeline>,
        memory: MemoryStore,
        counters: Arc<SystemCounters>,
        config: MaintenanceConfig,
    ) -> Self {
        Self {
            pipeline,
            memory,
            counters,
            config,
            inflight: Arc::new(Semaphore::new(1)),
        }
    }

    /// Which task, if any, the current counters call for.
    ///
    /// Repeated navigation failures bias toward graph repair; that check
    /// takes precedence over working-memory pressure.
    pub async fn check_thresholds(&self) -> StorageResult<Option<TaskType>> {
        if self.counters.navigation_failures() > self.config.navigation_failure_limit {
            return Ok(Some(TaskType::GraphRepair));
        }
        if self.memory.count_working().await? > self.config.working_memory_limit {
            return Ok(Some(TaskType::MemoryIntegration));
        }
        Ok(None)
    }

    /// Try to claim the single in-flight slot
    pub fn try_begin(&self) -> Option<OwnedSemaphorePermit> {
        self.inflight.clone().try_acquire_owned().ok()
    }

    /// Threshold check + background dispatch, called after each turn.
    ///
    /// Returns the task type that was started, or `None` when nothing is due
    /// or another task already holds the in-flight slot.
    pub async fn trigger_if_due(&self) -> StorageResult<Option<TaskType>> {
        let Some(task_type) = self.check_thresholds().await? else {
            return Ok(None);
        };

        let Some(permit) = self.try_begin() else {
            debug!(task_type = %task_type, "Maintenance trigger suppressed, task already in flight");
            return Ok(None);
        };

        info!(task_type = %task_type, "Threshold trigger: dispatching maintenance task");
        let pipeline = self.pipeline.clone();
        tokio::spawn(async move {
            let _permit = permit;
            if let Err(e) = pipeline.run(task_type).await {
                error!(error = %e, "Background maintenance task errored");
            }
        });

        Ok(Some(task_type))
    }

    /// Run a task synchronously, holding the in-flight slot for its duration.
    pub async fn run_now(&self, task_type: TaskType) -> AppResult<TaskReport> {
        let Some(_permit) = self.try_begin() else {
            return Err(PipelineError::AlreadyRunning.into());
        };
        self.pipeline.run(task_type).await
    }

    /// Periodic idle sweep. Thresholds are re-checked each tick; a quiet
    /// system gets a routine task instead.
    pub async fn run_idle_loop(self: Arc<Self>) {
        if self.config.idle_sweep_secs == 0 {
            info!("Idle sweep disabled");
            return;
        }

        let mut interval = tokio::time::interval(Duration::from_secs(self.config.idle_sweep_secs));
        // The first tick fires immediately; skip it so startup stays quiet.
        interval.tick().await;

        loop {
            interval.tick().await;

            let task_type = match self.check_thresholds().await {
                Ok(Some(t)) => t,
                Ok(None) => TaskType::Routine,
                Err(e) => {
                    error!(error = %e, "Threshold check failed during idle sweep");
                    continue;
                }
            };

            let Some(permit) = self.try_begin() else {
                debug!("Idle sweep skipped, task already in flight");
                continue;
            };

            info!(task_type = %task_type, "Idle sweep: dispatching maintenance task");
            let pipeline = self.pipeline.clone();
            tokio::spawn(async move {
                let _permit = permit;
                if let Err(e) = pipeline.run(task_type).await {
                    error!(error = %e, "Idle maintenance task errored");
                }
            });
        }
    }
}
