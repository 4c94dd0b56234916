//! Hierarchical knowledge-graph store (the navigation node graph).
//!
//! Nodes are addressed by dotted paths (`root`, `1`, `1.2.3`) where the path
//! encodes the ancestor chain. [`NodePath`] is a validated newtype so parent
//! and local-index lookups never re-parse strings at call sites.

mod store;

pub use store::GraphStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::memory::{MemoryType, ValueTier};

/// Validated dotted node path.
///
/// Either the literal `root` or one or more dot-joined positive integers
/// (`1`, `1.2`, `1.2.3`). Node identity comparisons are on the literal
/// path string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodePath(String);

impl NodePath {
    /// The distinguished root path.
    pub fn root() -> Self {
        Self("root".to_string())
    }

    /// Parse and validate a dotted path.
    pub fn parse(s: &str) -> Result<Self, StorageError> {
        if s == "root" {
            return Ok(Self::root());
        }
        if !s.is_empty()
            && s.split('.').all(|seg| {
                !seg.is_empty()
                    && seg.chars().all(|c| c.is_ascii_digit())
                    && seg.parse::<u32>().map(|n| n > 0).unwrap_or(false)
            })
        {
            Ok(Self(s.to_string()))
        } else {
            Err(StorageError::InvalidPath {
                path: s.to_string(),
            })
        }
    }

    /// Whether this is the root path.
    pub fn is_root(&self) -> bool {
        self.0 == "root"
    }

    /// Parent path; `None` for root. Top-level paths (`"3"`) have root as
    /// their parent.
    pub fn parent(&self) -> Option<NodePath> {
        if self.is_root() {
            return None;
        }
        match self.0.rsplit_once('.') {
            Some((prefix, _)) => Some(NodePath(prefix.to_string())),
            None => Some(NodePath::root()),
        }
    }

    /// Child path with the given local index.
    pub fn child(&self, index: u32) -> NodePath {
        if self.is_root() {
            NodePath(index.to_string())
        } else {
            NodePath(format!("{}.{}", self.0, index))
        }
    }

    /// Last path segment as an integer; `None` for root.
    pub fn local_index(&self) -> Option<u32> {
        if self.is_root() {
            return None;
        }
        self.0.rsplit('.').next().and_then(|s| s.parse().ok())
    }

    /// Number of segments below root (root = 0).
    pub fn depth(&self) -> u32 {
        if self.is_root() {
            0
        } else {
            self.0.split('.').count() as u32
        }
    }

    /// Whether `other` lies strictly below this path.
    pub fn is_ancestor_of(&self, other: &NodePath) -> bool {
        if other.is_root() || self == other {
            return false;
        }
        if self.is_root() {
            return true;
        }
        other.0.starts_with(&self.0) && other.0.as_bytes().get(self.0.len()) == Some(&b'.')
    }

    /// The literal path string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for NodePath {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodePath::parse(s)
    }
}

/// A knowledge-graph node with its derived child list and attached links.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    /// Dotted path identity.
    pub path: NodePath,
    /// Node content/text.
    pub content: String,
    /// Confidence score (0.0-1.0).
    pub confidence: f64,
    /// When the node was created.
    pub created_at: DateTime<Utc>,
    /// Ordered child paths (derived from storage, ordered by local index).
    pub child_ids: Vec<NodePath>,
    /// Memory summaries attached to this node.
    pub memory_summaries: Vec<MemorySummary>,
    /// Weighted associations to non-ancestor nodes.
    pub peer_associations: Vec<PeerAssociation>,
}

impl GraphNode {
    /// Parent path derived from this node's path.
    pub fn parent_id(&self) -> Option<NodePath> {
        self.path.parent()
    }
}

/// Summary of a memory record attached to a graph node.
///
/// Links are advisory: the referenced record may lag behind the memory
/// store (eventual, not transactional, consistency).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySummary {
    pub memory_id: i64,
    pub snippet: String,
    pub memory_type: MemoryType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_tier: Option<ValueTier>,
    pub confidence: f64,
}

/// Weighted link to a non-ancestor node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerAssociation {
    pub target: NodePath,
    pub weight: f64,
}
