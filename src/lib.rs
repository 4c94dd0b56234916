//! Memory-augmented dialogue core.
//!
//! The system keeps a hierarchical knowledge graph with dotted-path
//! addressing and an episodic memory store, both in SQLite. Each user turn
//! walks the graph with an LLM navigator to find relevant terminal nodes,
//! filters the memories they link, assembles a layered context package, and
//! generates a reply. A background maintenance pipeline (discover → analyze
//! → review → organize → verify) reorganizes the graph and consolidates
//! memories behind a single gated commit point.
//!
//! Components are wired explicitly through [`state::AppState`]; see
//! [`turn::TurnEngine`] for the synchronous path and
//! [`maintenance::MaintenancePipeline`] for the background path.

pub mod audit;
pub mod backend;
pub mod config;
pub mod context;
pub mod counters;
pub mod error;
pub mod graph;
pub mod maintenance;
pub mod memory;
pub mod navigation;
pub mod prompts;
pub mod state;
pub mod storage;
pub mod turn;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use state::AppState;
