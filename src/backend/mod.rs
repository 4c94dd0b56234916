//! Inference-backend collaborator.
//!
//! The core drives an external text-generation endpoint through the
//! [`Backend`] trait; [`HttpBackend`] is the production implementation over
//! an OpenAI-compatible chat completions API. Tests substitute scripted
//! implementations of the trait.

mod http;
mod types;

pub use http::HttpBackend;
pub use types::{ChatMessage, ChatRequest, ChatResponse, MessageRole, strip_code_fences};
pub(crate) use types::truncate;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::BackendResult;

/// Generate/chat capability of the external inference endpoint.
///
/// Transport errors are retried internally up to a small fixed count; callers
/// see a uniform `BackendUnavailable` on exhaustion.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Generate a completion for `prompt` under the given system role.
    async fn generate(&self, system_role: &str, prompt: &str) -> BackendResult<String>;

    /// Streaming variant delivering chunks over a channel.
    ///
    /// The default implementation delivers the full completion as one chunk;
    /// implementations with native streaming can override it.
    async fn generate_streaming(
        &self,
        system_role: &str,
        prompt: &str,
        chunks: mpsc::Sender<String>,
    ) -> BackendResult<()> {
        let text = self.generate(system_role, prompt).await?;
        if !text.is_empty() {
            // Receiver may have hung up; that is not a backend failure.
            let _ = chunks.send(text).await;
        }
        Ok(())
    }
}
