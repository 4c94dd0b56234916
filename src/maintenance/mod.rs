//! The maintenance pipeline (graph/memory upkeep).
//!
//! A fixed five-stage agent chain (discover, analyze, review, organize,
//! verify) proposes mutations to the knowledge graph and memory store.
//! Writes happen at a single commit point only after every gate passes;
//! the organize→verify gate retries a bounded number of times. The
//! scheduler enforces at most one task in flight and fires on thresholds
//! (working-memory pressure, navigation failures) or an idle timer.

mod pipeline;
mod scheduler;
mod types;
mod verify;

pub use pipeline::MaintenancePipeline;
pub use scheduler::MaintenanceScheduler;
pub use types::{
    AnalysisIssue, AnalysisReport, ChangeSet, DiscoveryReport, MutationSummary, ProposedMemory,
    ProposedNode, ReviewVerdict, StageTrace, TaskReport, TaskStatus, TaskType,
};
pub use verify::{verify_change_set, ValidationIssue};
