use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use super::decision::{parse_continue, Decision};
use crate::backend::{truncate, Backend};
use crate::config::NavigationConfig;
use crate::counters::SystemCounters;
use crate::error::AppResult;
use crate::graph::{GraphNode, GraphStore, NodePath};
use crate::prompts::{CONTINUE_PROMPT, NAVIGATOR_PROMPT};

/// Why a walk failed.
///
/// Failures are absorbed into the degraded-context path of the turn; they are
/// never retried synchronously and never surfaced to the user as errors.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum NavigationFailure {
    /// GOTO onto a path that is neither a declared child nor an existing
    /// peer-association target.
    TargetNotFound { target: String },
    /// BACK issued while at root.
    AlreadyAtRoot,
    /// GOTO revisited a path already walked this turn.
    Cycle { path: NodePath },
    /// Backend transport failure or timeout during a decision.
    Backend { message: String },
}

/// One decision, recorded for observability.
#[derive(Debug, Clone, Serialize)]
pub struct DecisionRecord {
    /// Node the decision was taken at.
    pub at: NodePath,
    /// Raw backend reply.
    pub raw: String,
    /// Parsed action tag (`goto`, `stay`, ..., `unparsable`).
    pub action: String,
}

/// Result of one turn's navigation.
#[derive(Debug, Clone, Serialize)]
pub struct NavigationOutcome {
    /// Terminal nodes chosen this turn.
    pub terminals: Vec<NodePath>,
    /// Paths entered, in order, starting at root.
    pub trail: Vec<NodePath>,
    /// Depth at the final terminal pick.
    pub depth: u32,
    /// The walk was cut off by the depth limit (soft, not a failure).
    pub depth_exhausted: bool,
    /// Set when the walk failed; terminals are then not usable.
    pub failure: Option<NavigationFailure>,
    /// Full decision log for the audit trail.
    pub decisions: Vec<DecisionRecord>,
}

impl NavigationOutcome {
    fn new() -> Self {
        Self {
            terminals: Vec::new(),
            trail: Vec::new(),
            depth: 0,
            depth_exhausted: false,
            failure: None,
            decisions: Vec::new(),
        }
    }

    /// Whether the walk ended in failure
    pub fn failed(&self) -> bool {
        self.failure.is_some()
    }
}

/// Bounded depth-first walk over the graph, driven by backend decisions.
pub struct NavigationEngine {
    graph: GraphStore,
    backend: Arc<dyn Backend>,
    config: NavigationConfig,
    counters: Arc<SystemCounters>,
}

enum WalkEnd {
    Terminal {
        path: NodePath,
        depth: u32,
        exhausted: bool,
        /// The pick fell out of a moveless root: a restart cannot reach
        /// anything new, so selection stops without a continue ask.
        dead_end: bool,
    },
    Pinned(Vec<NodePath>),
    Failed(NavigationFailure),
}

impl NavigationEngine {
    /// Create a new engine
    pub fn new(
        graph: GraphStore,
        backend: Arc<dyn Backend>,
        config: NavigationConfig,
        counters: Arc<SystemCounters>,
    ) -> Self {
        Self {
            graph,
            backend,
            config,
            counters,
        }
    }

    /// Walk the graph for one user turn.
    ///
    /// Restarts from root to select up to `max_terminal_nodes` terminals,
    /// asking the backend after each pick (short of the max) whether to
    /// continue. Any failure ends the whole navigation as failed.
    pub async fn navigate(
        &self,
        user_input: &str,
        recent_context: &str,
    ) -> AppResult<NavigationOutcome> {
        let mut outcome = NavigationOutcome::new();

        while outcome.terminals.len() < self.config.max_terminal_nodes {
            let excluded = outcome.terminals.clone();
            let end = self
                .walk_once(user_input, recent_context, &excluded, &mut outcome)
                .await?;

            match end {
                WalkEnd::Failed(failure) => {
                    let total = self.counters.record_navigation_failure();
                    warn!(failure = ?failure, failures_total = total, "Navigation failed");
                    outcome.failure = Some(failure);
                    return Ok(outcome);
                }
                WalkEnd::Pinned(paths) => {
                    for path in paths {
                        if !outcome.terminals.contains(&path)
                            && outcome.terminals.len() < self.config.max_terminal_nodes
                        {
                            outcome.terminals.push(path);
                        }
                    }
                    break;
                }
                WalkEnd::Terminal {
                    path,
                    depth,
                    exhausted,
                    dead_end,
                } => {
                    outcome.depth = depth;
                    outcome.depth_exhausted |= exhausted;
                    if outcome.terminals.contains(&path) {
                        // The walk converged on an already-picked node; more
                        // restarts would not make progress.
                        break;
                    }
                    outcome.terminals.push(path);
                    if dead_end {
                        break;
                    }
                }
            }

            if outcome.terminals.len() >= self.config.max_terminal_nodes {
                break;
            }
            if !self.ask_continue(user_input, &outcome.terminals).await {
                break;
            }
        }

        debug!(
            terminals = ?outcome.terminals,
            depth = outcome.depth,
            depth_exhausted = outcome.depth_exhausted,
            "Navigation complete"
        );
        Ok(outcome)
    }

    /// One walk from root to a terminal pick (or failure).
    async fn walk_once(
        &self,
        user_input: &str,
        recent_context: &str,
        excluded: &[NodePath],
        outcome: &mut NavigationOutcome,
    ) -> AppResult<WalkEnd> {
        let mut current = NodePath::root();
        let mut depth = 0u32;
        let mut visited = vec![current.clone()];
        outcome.trail.push(current.clone());

        loop {
            let Some(node) = self.graph.get_node(&current).await? else {
                return Ok(WalkEnd::Failed(NavigationFailure::TargetNotFound {
                    target: current.to_string(),
                }));
            };

            // No moves available: the current node is the terminal, no
            // backend call needed.
            if node.child_ids.is_empty() && node.peer_associations.is_empty() {
                return Ok(WalkEnd::Terminal {
                    path: current,
                    depth,
                    exhausted: false,
                    dead_end: depth == 0,
                });
            }

            // Depth limit is graceful degradation, not a failure.
            if depth >= self.config.max_depth {
                return Ok(WalkEnd::Terminal {
                    path: current,
                    depth,
                    exhausted: true,
                    dead_end: false,
                });
            }

            let prompt = self
                .build_prompt(user_input, recent_context, &node, excluded)
                .await?;
            let raw = match self.backend.generate(NAVIGATOR_PROMPT, &prompt).await {
                Ok(raw) => raw,
                Err(e) => {
                    return Ok(WalkEnd::Failed(NavigationFailure::Backend {
                        message: e.to_string(),
                    }))
                }
            };

            let decision = Decision::parse(&raw);
            outcome.decisions.push(DecisionRecord {
                at: current.clone(),
                raw: raw.clone(),
                action: decision.tag().to_string(),
            });

            match decision {
                Decision::Stay => {
                    return Ok(WalkEnd::Terminal {
                        path: current,
                        depth,
                        exhausted: false,
                        dead_end: false,
                    });
                }
                Decision::Unparsable(raw) => {
                    // Availability over precision: default to stay, keep the
                    // raw text in the decision log.
                    warn!(at = %current, raw = %raw, "Unparsable decision, defaulting to stay");
                    return Ok(WalkEnd::Terminal {
                        path: current,
                        depth,
                        exhausted: false,
                        dead_end: false,
                    });
                }
                Decision::Goto(target) => {
                    if !self.goto_is_valid(&node, &target).await? {
                        return Ok(WalkEnd::Failed(NavigationFailure::TargetNotFound {
                            target: target.to_string(),
                        }));
                    }
                    if visited.contains(&target) {
                        return Ok(WalkEnd::Failed(NavigationFailure::Cycle { path: target }));
                    }
                    depth += 1;
                    visited.push(target.clone());
                    outcome.trail.push(target.clone());
                    current = target;
                }
                Decision::Back => {
                    let Some(parent) = current.parent() else {
                        return Ok(WalkEnd::Failed(NavigationFailure::AlreadyAtRoot));
                    };
                    depth = depth.saturating_sub(1);
                    outcome.trail.push(parent.clone());
                    current = parent;
                }
                Decision::Root => {
                    // The visited set survives the restart: re-entering an
                    // already-walked node after ROOT is still a cycle, which
                    // keeps the whole walk bounded by the graph size.
                    current = NodePath::root();
                    depth = 0;
                    outcome.trail.push(current.clone());
                }
                Decision::Pin(paths) => {
                    let mut resolved = Vec::new();
                    for path in paths {
                        if self.graph.node_exists(&path).await? {
                            resolved.push(path);
                        } else {
                            warn!(path = %path, "Pinned node does not exist, dropping");
                        }
                    }
                    if resolved.is_empty() {
                        return Ok(WalkEnd::Failed(NavigationFailure::TargetNotFound {
                            target: "pin list".to_string(),
                        }));
                    }
                    return Ok(WalkEnd::Pinned(resolved));
                }
            }
        }
    }

    /// GOTO is valid onto a declared child, or onto an existing node reached
    /// through a peer association of the current node.
    async fn goto_is_valid(&self, node: &GraphNode, target: &NodePath) -> AppResult<bool> {
        if node.child_ids.contains(target) {
            return Ok(true);
        }
        if node.peer_associations.iter().any(|p| &p.target == target) {
            return Ok(self.graph.node_exists(target).await?);
        }
        Ok(false)
    }

    async fn build_prompt(
        &self,
        user_input: &str,
        recent_context: &str,
        node: &GraphNode,
        excluded: &[NodePath],
    ) -> AppResult<String> {
        let mut prompt = format!(
            "User input: {}\n\nCurrent node [{}]: {}\n",
            user_input, node.path, node.content
        );

        if !recent_context.is_empty() {
            prompt.push_str(&format!("\nRecent context:\n{}\n", recent_context));
        }

        prompt.push_str("\nChildren:\n");
        if node.child_ids.is_empty() {
            prompt.push_str("(none)\n");
        }
        for child in &node.child_ids {
            let summary = match self.graph.get_node(child).await? {
                Some(n) => truncate(&n.content, 120),
                None => "(missing)".to_string(),
            };
            prompt.push_str(&format!("- {}: {}\n", child, summary));
        }

        if !node.peer_associations.is_empty() {
            prompt.push_str("\nPeer associations:\n");
            for peer in &node.peer_associations {
                prompt.push_str(&format!("- {} (weight {:.2})\n", peer.target, peer.weight));
            }
        }

        if !excluded.is_empty() {
            let list: Vec<String> = excluded.iter().map(|p| p.to_string()).collect();
            prompt.push_str(&format!(
                "\nAlready selected this turn (do not choose again): {}\n",
                list.join(", ")
            ));
        }

        Ok(prompt)
    }

    /// Ask whether to pick another terminal. Backend failure or an
    /// unparsable reply both mean no.
    async fn ask_continue(&self, user_input: &str, terminals: &[NodePath]) -> bool {
        let list: Vec<String> = terminals.iter().map(|p| p.to_string()).collect();
        let prompt = format!(
            "User input: {}\nAlready selected: {}\n",
            user_input,
            list.join(", ")
        );

        match self.backend.generate(CONTINUE_PROMPT, &prompt).await {
            Ok(raw) => parse_continue(&raw),
            Err(e) => {
                warn!(error = %e, "Continue ask failed, stopping selection");
                false
            }
        }
    }
}
