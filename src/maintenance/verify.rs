//! Structural verification of organized change sets (stage 5).
//!
//! The verifier checks structure only: path hierarchy, id resolution, value
//! ranges, timestamp formats and mandatory fields. It performs no backend
//! call, so re-running it on an unmodified change set always yields the same
//! verdict.

use std::collections::HashSet;

use chrono::DateTime;
use serde::Serialize;

use crate::error::StorageResult;
use crate::graph::{GraphStore, NodePath};
use crate::memory::{MemoryStore, MemoryType, ValueTier};

use super::types::ChangeSet;

/// One structural rule violation.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationIssue {
    /// What the issue refers to (node path, memory id, field).
    pub subject: String,
    pub message: String,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.subject, self.message)
    }
}

/// Validate a change set against the structural rules.
///
/// Returns the full issue list; an empty list means the set may be committed.
pub async fn verify_change_set(
    change_set: &ChangeSet,
    graph: &GraphStore,
    memory: &MemoryStore,
) -> StorageResult<Vec<ValidationIssue>> {
    let mut issues = Vec::new();

    if change_set.is_empty() {
        issues.push(ValidationIssue {
            subject: "change_set".to_string(),
            message: "proposes no mutations".to_string(),
        });
        return Ok(issues);
    }

    // Paths introduced by this change set count as existing for
    // parent-hierarchy checks (parents may be created in the same commit).
    let mut introduced: HashSet<String> = HashSet::new();
    for node in &change_set.nodes {
        if let Some(path) = &node.path {
            introduced.insert(path.clone());
        }
    }

    let mut seen_paths: HashSet<&str> = HashSet::new();
    for (i, node) in change_set.nodes.iter().enumerate() {
        let subject = node
            .path
            .clone()
            .or_else(|| node.parent_path.clone().map(|p| format!("child of {}", p)))
            .unwrap_or_else(|| format!("nodes[{}]", i));

        match (&node.path, &node.parent_path) {
            (Some(_), Some(_)) | (None, None) => {
                issues.push(ValidationIssue {
                    subject: subject.clone(),
                    message: "exactly one of path/parent_path must be set".to_string(),
                });
            }
            (Some(path), None) => {
                match NodePath::parse(path) {
                    Ok(parsed) => {
                        if !seen_paths.insert(path.as_str()) {
                            issues.push(ValidationIssue {
                                subject: subject.clone(),
                                message: "duplicate path in change set".to_string(),
                            });
                        }
                        if let Some(parent) = parsed.parent() {
                            let known = introduced.contains(parent.as_str())
                                || graph.node_exists(&parent).await?;
                            if !known {
                                issues.push(ValidationIssue {
                                    subject: subject.clone(),
                                    message: format!("parent {} does not exist", parent),
                                });
                            }
                        }
                    }
                    Err(_) => issues.push(ValidationIssue {
                        subject: subject.clone(),
                        message: "malformed path".to_string(),
                    }),
                }
            }
            (None, Some(parent)) => match NodePath::parse(parent) {
                Ok(parsed) => {
                    let known =
                        introduced.contains(parsed.as_str()) || graph.node_exists(&parsed).await?;
                    if !known {
                        issues.push(ValidationIssue {
                            subject: subject.clone(),
                            message: format!("parent {} does not exist", parsed),
                        });
                    }
                }
                Err(_) => issues.push(ValidationIssue {
                    subject: subject.clone(),
                    message: "malformed parent path".to_string(),
                }),
            },
        }

        if node.content.trim().is_empty() {
            issues.push(ValidationIssue {
                subject: subject.clone(),
                message: "content is empty".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&node.confidence) {
            issues.push(ValidationIssue {
                subject: subject.clone(),
                message: format!("confidence {} outside [0, 1]", node.confidence),
            });
        }
        if let Some(ts) = &node.created_at {
            if DateTime::parse_from_rfc3339(ts).is_err() {
                issues.push(ValidationIssue {
                    subject,
                    message: format!("created_at {:?} is not RFC 3339", ts),
                });
            }
        }
    }

    let mut seen_memory_ids: HashSet<i64> = HashSet::new();
    for (i, mem) in change_set.memories.iter().enumerate() {
        let subject = mem
            .id
            .map(|id| format!("memory {}", id))
            .unwrap_or_else(|| format!("memories[{}]", i));

        if mem.content.trim().is_empty() {
            issues.push(ValidationIssue {
                subject: subject.clone(),
                message: "content is empty".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&mem.confidence) {
            issues.push(ValidationIssue {
                subject: subject.clone(),
                message: format!("confidence {} outside [0, 1]", mem.confidence),
            });
        }

        let parsed_type = mem.memory_type.parse::<MemoryType>();
        if parsed_type.is_err() {
            issues.push(ValidationIssue {
                subject: subject.clone(),
                message: format!("unknown memory_type {:?}", mem.memory_type),
            });
        }

        match &mem.value_tier {
            Some(tier) => {
                if tier.parse::<ValueTier>().is_err() {
                    issues.push(ValidationIssue {
                        subject: subject.clone(),
                        message: format!("unknown value_tier {:?}", tier),
                    });
                } else if parsed_type != Ok(MemoryType::Classified) {
                    issues.push(ValidationIssue {
                        subject: subject.clone(),
                        message: "value_tier is only meaningful for classified memories"
                            .to_string(),
                    });
                }
            }
            None => {
                if parsed_type == Ok(MemoryType::Classified) {
                    issues.push(ValidationIssue {
                        subject: subject.clone(),
                        message: "classified memories require a value_tier".to_string(),
                    });
                }
            }
        }

        for link in &mem.linked_node_ids {
            if NodePath::parse(link).is_err() {
                issues.push(ValidationIssue {
                    subject: subject.clone(),
                    message: format!("malformed linked node path {:?}", link),
                });
            }
        }

        if let Some(id) = mem.id {
            if !seen_memory_ids.insert(id) {
                issues.push(ValidationIssue {
                    subject: subject.clone(),
                    message: "duplicate memory id in change set".to_string(),
                });
            }
            if memory.get(id).await?.is_none() {
                issues.push(ValidationIssue {
                    subject: subject.clone(),
                    message: "update targets a memory id that does not exist".to_string(),
                });
            }
        }

        if let Some(ts) = &mem.created_at {
            if DateTime::parse_from_rfc3339(ts).is_err() {
                issues.push(ValidationIssue {
                    subject,
                    message: format!("created_at {:?} is not RFC 3339", ts),
                });
            }
        }
    }

    for &id in &change_set.deprecate_memory_ids {
        if memory.get(id).await?.is_none() {
            issues.push(ValidationIssue {
                subject: format!("memory {}", id),
                message: "deprecation targets a memory id that does not exist".to_string(),
            });
        }
    }

    Ok(issues)
}
