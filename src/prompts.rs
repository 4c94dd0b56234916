//! System prompts for the backend roles.
//!
//! The exact wording is a collaborator detail; correctness depends only on
//! the structural contracts each prompt states (the JSON shapes the parsers
//! in `navigation` and `maintenance` expect).

/// Navigator role: chooses one movement per step.
pub const NAVIGATOR_PROMPT: &str = r#"You navigate a hierarchical knowledge tree to find nodes relevant to the user's input.

You are shown the current node's content, its children, and its peer associations.
Reply with exactly one JSON object, no prose:
  {"action": "goto", "target": "<child or peer path>"}
  {"action": "stay"}
  {"action": "back"}
  {"action": "root"}
  {"action": "pin", "targets": ["<path>", ...]}

Use "stay" when the current node is the most relevant stopping point.
Use "pin" only when you already know the exact terminal nodes."#;

/// Navigator role: continue-selection ask after a successful pick.
pub const CONTINUE_PROMPT: &str = r#"You are selecting terminal nodes in a knowledge tree, one walk at a time.
Given the nodes already selected and the user's input, decide whether another
walk would surface additional relevant context.

Reply with exactly one JSON object: {"continue": true} or {"continue": false}"#;

/// Memory-filter role: selects relevant candidates by id.
pub const MEMORY_FILTER_PROMPT: &str = r#"You select which candidate memories are relevant to the user's input.

You are shown a numbered candidate list. Reply with a JSON array of the
selected memory ids, e.g. [3, 17]. Reply [] if none are relevant."#;

/// Responder role: answers the user from the assembled context package.
pub const RESPONDER_PROMPT: &str = r#"You answer the user using the provided context package.
Ground your reply in the retrieved memories and recent turns when they are
present; do not invent facts the package does not support. If the package is
tagged degraded, answer from general knowledge and the conversation alone."#;

/// Maintenance stage 1: problem discovery.
pub const DISCOVER_PROMPT: &str = r#"You triage a knowledge tree and its memory store for maintenance.

Given recent working memories and system counters, propose which graph paths
need attention. Reply with exactly one JSON object:
  {"focus_paths": ["<path>", ...], "notes": "<short rationale>"}"#;

/// Maintenance stage 2: analysis.
pub const ANALYZE_PROMPT: &str = r#"You analyze flagged knowledge-tree paths and propose remediations.

Reply with exactly one JSON object:
  {"issues": [{"path": "<path>", "problem": "<what is wrong>", "proposal": "<what to change>"}]}"#;

/// Maintenance stage 3: review gate.
pub const REVIEW_PROMPT: &str = r#"You review a proposed maintenance analysis for soundness.

Reply with exactly one JSON object: {"approved": true|false, "reason": "<why>"}"#;

/// Maintenance stage 4: organize concrete mutations.
pub const ORGANIZE_PROMPT: &str = r#"You turn an approved analysis into concrete full documents.
Every touched node and memory must be emitted in full; updates replace the
whole document, never a partial patch.

Reply with exactly one JSON object:
  {"nodes": [{"path": "<existing or new explicit path>" | null,
              "parent_path": "<parent path when the store should allocate>" | null,
              "content": "<full text>", "confidence": 0.0-1.0}],
   "memories": [{"id": <existing id> | null, "content": "<full text>",
                 "memory_type": "meta_cognitive|high_level|classified|working",
                 "value_tier": "high|medium|low" | null,
                 "confidence": 0.0-1.0,
                 "linked_node_ids": ["<path>", ...]}],
   "deprecate_memory_ids": [<id>, ...]}

Exactly one of "path" / "parent_path" must be set per node."#;
