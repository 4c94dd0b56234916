#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use mindgraph::backend::Backend;
use mindgraph::error::{BackendError, BackendResult};
use mindgraph::graph::{GraphStore, NodePath};
use mindgraph::memory::MemoryStore;
use mindgraph::storage::Database;

/// Backend double that replays a fixed reply script.
///
/// Replies are consumed in order; an exhausted script returns an
/// `InvalidResponse` so a test that makes more calls than scripted fails
/// loudly instead of hanging.
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<String, String>>>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<(String, String)>>,
}

impl ScriptedBackend {
    pub fn new(replies: Vec<Result<String, String>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        })
    }

    /// Script of successful replies only.
    pub fn replies(replies: &[&str]) -> Arc<Self> {
        Self::new(replies.iter().map(|r| Ok(r.to_string())).collect())
    }

    /// Number of `generate` calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Recorded (system_role, prompt) pairs, in call order.
    pub fn prompts(&self) -> Vec<(String, String)> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn generate(&self, system_role: &str, prompt: &str) -> BackendResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .unwrap()
            .push((system_role.to_string(), prompt.to_string()));

        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(BackendError::Unavailable {
                message,
                retries: 0,
            }),
            None => Err(BackendError::InvalidResponse {
                message: "reply script exhausted".to_string(),
            }),
        }
    }
}

/// Fresh in-memory database with migrations applied.
pub async fn test_db() -> Database {
    Database::new_in_memory()
        .await
        .expect("in-memory database should open")
}

/// Graph store with the root node ensured.
pub async fn test_graph(db: &Database) -> GraphStore {
    let graph = GraphStore::new(db.clone());
    graph.ensure_root().await.expect("root should be created");
    graph
}

pub fn test_memory(db: &Database) -> MemoryStore {
    MemoryStore::new(db.clone())
}

pub fn path(s: &str) -> NodePath {
    NodePath::parse(s).expect("test path should parse")
}
