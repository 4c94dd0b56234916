//! Backend-driven navigation over the knowledge graph.
//!
//! A turn's walk is a bounded depth-first traversal: the backend chooses one
//! movement per step through the strict [`Decision`] grammar, and the engine
//! enforces target validity, the cycle guard and the depth limit. Failures
//! are converted into the degraded-context path, never surfaced raw.

mod decision;
mod engine;

pub use decision::{parse_continue, parse_id_selection, Decision};
pub use engine::{DecisionRecord, NavigationEngine, NavigationFailure, NavigationOutcome};
