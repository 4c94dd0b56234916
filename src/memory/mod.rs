//! Episodic memory store.
//!
//! Records are immutable-by-default: normal operation never hard-deletes a
//! record. A record that fails review is deprecated (confidence forced to 0,
//! status flag set) so history is preserved.

mod store;

pub use store::MemoryStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::graph::NodePath;

/// Kind of memory record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    /// Persistent self-knowledge, always eligible for context assembly.
    MetaCognitive,
    /// High-level integrated knowledge produced by maintenance.
    HighLevel,
    /// Classified knowledge with an explicit value tier.
    Classified,
    /// Short-lived, unreviewed turn records awaiting integration.
    #[default]
    Working,
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemoryType::MetaCognitive => write!(f, "meta_cognitive"),
            MemoryType::HighLevel => write!(f, "high_level"),
            MemoryType::Classified => write!(f, "classified"),
            MemoryType::Working => write!(f, "working"),
        }
    }
}

impl std::str::FromStr for MemoryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "meta_cognitive" => Ok(MemoryType::MetaCognitive),
            "high_level" => Ok(MemoryType::HighLevel),
            "classified" => Ok(MemoryType::Classified),
            "working" => Ok(MemoryType::Working),
            _ => Err(format!("Unknown memory type: {}", s)),
        }
    }
}

/// Value tier for classified memories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueTier {
    High,
    Medium,
    Low,
}

impl std::fmt::Display for ValueTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueTier::High => write!(f, "high"),
            ValueTier::Medium => write!(f, "medium"),
            ValueTier::Low => write!(f, "low"),
        }
    }
}

impl std::str::FromStr for ValueTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "high" => Ok(ValueTier::High),
            "medium" => Ok(ValueTier::Medium),
            "low" => Ok(ValueTier::Low),
            _ => Err(format!("Unknown value tier: {}", s)),
        }
    }
}

/// Lifecycle status of a memory record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryStatus {
    #[default]
    Active,
    /// Failed review: kept for history with confidence forced to 0.
    Deprecated,
}

impl std::fmt::Display for MemoryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemoryStatus::Active => write!(f, "active"),
            MemoryStatus::Deprecated => write!(f, "deprecated"),
        }
    }
}

impl std::str::FromStr for MemoryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(MemoryStatus::Active),
            "deprecated" => Ok(MemoryStatus::Deprecated),
            _ => Err(format!("Unknown memory status: {}", s)),
        }
    }
}

/// A stored memory record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Opaque id from the durable monotonic allocator.
    pub id: i64,
    pub content: String,
    pub memory_type: MemoryType,
    /// Only meaningful when `memory_type` is [`MemoryType::Classified`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_tier: Option<ValueTier>,
    pub confidence: f64,
    pub status: MemoryStatus,
    pub created_at: DateTime<Utc>,
    /// Graph nodes that reference this record (advisory back-links).
    pub linked_node_ids: Vec<NodePath>,
}

/// Payload for creating a new memory record; the store allocates the id.
#[derive(Debug, Clone)]
pub struct NewMemory {
    pub content: String,
    pub memory_type: MemoryType,
    pub value_tier: Option<ValueTier>,
    pub confidence: f64,
    pub linked_node_ids: Vec<NodePath>,
}

impl NewMemory {
    /// A working-tier record created by a user turn.
    pub fn working(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            memory_type: MemoryType::Working,
            value_tier: None,
            confidence: 1.0,
            linked_node_ids: Vec::new(),
        }
    }

    /// Attach back-links to graph nodes.
    pub fn with_links(mut self, links: Vec<NodePath>) -> Self {
        self.linked_node_ids = links;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_type_round_trip() {
        for t in [
            MemoryType::MetaCognitive,
            MemoryType::HighLevel,
            MemoryType::Classified,
            MemoryType::Working,
        ] {
            let s = t.to_string();
            assert_eq!(s.parse::<MemoryType>().unwrap(), t);
        }
        assert!("episodic".parse::<MemoryType>().is_err());
    }

    #[test]
    fn test_value_tier_round_trip() {
        for t in [ValueTier::High, ValueTier::Medium, ValueTier::Low] {
            assert_eq!(t.to_string().parse::<ValueTier>().unwrap(), t);
        }
        assert!("critical".parse::<ValueTier>().is_err());
    }

    #[test]
    fn test_status_round_trip() {
        assert_eq!(
            "deprecated".parse::<MemoryStatus>().unwrap(),
            MemoryStatus::Deprecated
        );
        assert_eq!("active".parse::<MemoryStatus>().unwrap(), MemoryStatus::Active);
    }

    #[test]
    fn test_new_memory_working_defaults() {
        let m = NewMemory::working("hello");
        assert_eq!(m.memory_type, MemoryType::Working);
        assert!(m.value_tier.is_none());
        assert!(m.linked_node_ids.is_empty());
    }
}
