//! Context assembly for response generation.
//!
//! [`MemoryFilter`] narrows the memories reachable from the turn's terminal
//! nodes; [`ContextAssembler`] merges them with persistent meta-cognitive
//! memories and the recent conversation window into one package.

mod assembler;
mod filter;

pub use assembler::{ContextAssembler, ContextPackage};
pub use filter::MemoryFilter;
