//! Strict decision grammar for navigator replies.
//!
//! Backend text is parsed into a tagged [`Decision`] with an explicit
//! [`Decision::Unparsable`] variant; callers pattern-match exhaustively, so
//! the default-to-stay policy is a visible branch rather than a silent
//! fallthrough.

use serde::Deserialize;

use crate::backend::strip_code_fences;
use crate::graph::NodePath;

/// One navigator instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Move to a declared child or an existing peer-association target.
    Goto(NodePath),
    /// Terminate the walk at the current node.
    Stay,
    /// Move to the parent node.
    Back,
    /// Restart at the root node.
    Root,
    /// Directly pin a terminal node set.
    Pin(Vec<NodePath>),
    /// Reply did not match the grammar; carries the raw text for logging.
    Unparsable(String),
}

#[derive(Deserialize)]
struct DecisionJson {
    action: String,
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    targets: Option<Vec<String>>,
}

impl Decision {
    /// Parse a backend reply.
    ///
    /// Accepts a JSON object (`{"action": "goto", "target": "1.2"}`) or the
    /// bare keyword form (`GOTO 1.2`, `STAY`, `PIN 1, 2.3`). Anything else is
    /// [`Decision::Unparsable`].
    pub fn parse(raw: &str) -> Decision {
        let text = strip_code_fences(raw);

        if let Ok(json) = serde_json::from_str::<DecisionJson>(text) {
            return Self::from_parts(
                &json.action,
                json.target.as_deref(),
                json.targets.as_deref(),
                raw,
            );
        }

        Self::parse_keyword(text, raw)
    }

    fn from_parts(
        action: &str,
        target: Option<&str>,
        targets: Option<&[String]>,
        raw: &str,
    ) -> Decision {
        match action.to_lowercase().as_str() {
            "goto" => match target.and_then(|t| NodePath::parse(t.trim()).ok()) {
                Some(path) => Decision::Goto(path),
                None => Decision::Unparsable(raw.to_string()),
            },
            "stay" => Decision::Stay,
            "back" => Decision::Back,
            "root" => Decision::Root,
            "pin" => {
                let paths: Vec<NodePath> = targets
                    .unwrap_or_default()
                    .iter()
                    .filter_map(|t| NodePath::parse(t.trim()).ok())
                    .collect();
                if paths.is_empty() {
                    Decision::Unparsable(raw.to_string())
                } else {
                    Decision::Pin(paths)
                }
            }
            _ => Decision::Unparsable(raw.to_string()),
        }
    }

    fn parse_keyword(text: &str, raw: &str) -> Decision {
        // Single-line keyword form: "GOTO 1.2", "GOTO(1.2)", "PIN 1, 2.3".
        let line = match text.lines().next() {
            Some(line) => line.trim(),
            None => return Decision::Unparsable(raw.to_string()),
        };

        let normalized = line.replace(['(', ')', ':'], " ");
        let mut parts = normalized.split_whitespace();
        let keyword = match parts.next() {
            Some(k) => k.to_uppercase(),
            None => return Decision::Unparsable(raw.to_string()),
        };
        let rest: Vec<&str> = parts.collect();

        match keyword.as_str() {
            "GOTO" => {
                let target = rest.first().copied().unwrap_or_default();
                match NodePath::parse(target) {
                    Ok(path) => Decision::Goto(path),
                    Err(_) => Decision::Unparsable(raw.to_string()),
                }
            }
            "STAY" if rest.is_empty() => Decision::Stay,
            "BACK" if rest.is_empty() => Decision::Back,
            "ROOT" if rest.is_empty() => Decision::Root,
            "PIN" => {
                let paths: Vec<NodePath> = rest
                    .iter()
                    .flat_map(|chunk| chunk.split(','))
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .filter_map(|s| NodePath::parse(s).ok())
                    .collect();
                if paths.is_empty() {
                    Decision::Unparsable(raw.to_string())
                } else {
                    Decision::Pin(paths)
                }
            }
            _ => Decision::Unparsable(raw.to_string()),
        }
    }

    /// Short tag for decision logging
    pub fn tag(&self) -> &'static str {
        match self {
            Decision::Goto(_) => "goto",
            Decision::Stay => "stay",
            Decision::Back => "back",
            Decision::Root => "root",
            Decision::Pin(_) => "pin",
            Decision::Unparsable(_) => "unparsable",
        }
    }
}

#[derive(Deserialize)]
struct ContinueJson {
    #[serde(rename = "continue")]
    cont: bool,
}

/// Parse the continue-selection ask.
///
/// Unparsable replies mean "no": availability over precision.
pub fn parse_continue(raw: &str) -> bool {
    let text = strip_code_fences(raw);
    if let Ok(json) = serde_json::from_str::<ContinueJson>(text) {
        return json.cont;
    }
    matches!(text.trim().to_lowercase().as_str(), "yes" | "true" | "y")
}

/// Parse the memory-filter selection: a JSON array of memory ids.
///
/// Unparsable or empty replies yield an empty selection.
pub fn parse_id_selection(raw: &str) -> Vec<i64> {
    let text = strip_code_fences(raw);
    serde_json::from_str::<Vec<i64>>(text).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> NodePath {
        NodePath::parse(s).unwrap()
    }

    #[test]
    fn test_parse_json_forms() {
        assert_eq!(
            Decision::parse(r#"{"action": "goto", "target": "1.2"}"#),
            Decision::Goto(path("1.2"))
        );
        assert_eq!(Decision::parse(r#"{"action": "stay"}"#), Decision::Stay);
        assert_eq!(Decision::parse(r#"{"action": "back"}"#), Decision::Back);
        assert_eq!(Decision::parse(r#"{"action": "root"}"#), Decision::Root);
        assert_eq!(
            Decision::parse(r#"{"action": "pin", "targets": ["1", "2.3"]}"#),
            Decision::Pin(vec![path("1"), path("2.3")])
        );
    }

    #[test]
    fn test_parse_fenced_json() {
        let raw = "```json\n{\"action\": \"goto\", \"target\": \"3\"}\n```";
        assert_eq!(Decision::parse(raw), Decision::Goto(path("3")));
    }

    #[test]
    fn test_parse_keyword_forms() {
        assert_eq!(Decision::parse("GOTO 1.2"), Decision::Goto(path("1.2")));
        assert_eq!(Decision::parse("goto(1.2)"), Decision::Goto(path("1.2")));
        assert_eq!(Decision::parse("GOTO: 4"), Decision::Goto(path("4")));
        assert_eq!(Decision::parse("stay"), Decision::Stay);
        assert_eq!(Decision::parse("  BACK  "), Decision::Back);
        assert_eq!(Decision::parse("ROOT"), Decision::Root);
        assert_eq!(
            Decision::parse("PIN 1, 2.3"),
            Decision::Pin(vec![path("1"), path("2.3")])
        );
    }

    #[test]
    fn test_unparsable_carries_raw() {
        let raw = "I think we should explore node 1.2 next.";
        match Decision::parse(raw) {
            Decision::Unparsable(text) => assert_eq!(text, raw),
            other => panic!("expected Unparsable, got {:?}", other),
        }
    }

    #[test]
    fn test_goto_with_invalid_path_is_unparsable() {
        assert!(matches!(
            Decision::parse(r#"{"action": "goto", "target": "banana"}"#),
            Decision::Unparsable(_)
        ));
        assert!(matches!(Decision::parse("GOTO"), Decision::Unparsable(_)));
    }

    #[test]
    fn test_goto_root_target_is_valid_grammar() {
        // `goto root` parses; the engine decides whether the move is legal.
        assert_eq!(
            Decision::parse(r#"{"action": "goto", "target": "root"}"#),
            Decision::Goto(NodePath::root())
        );
    }

    #[test]
    fn test_parse_continue() {
        assert!(parse_continue(r#"{"continue": true}"#));
        assert!(!parse_continue(r#"{"continue": false}"#));
        assert!(parse_continue("yes"));
        assert!(!parse_continue("no"));
        assert!(!parse_continue("perhaps, if the moon is full"));
    }

    #[test]
    fn test_parse_id_selection() {
        assert_eq!(parse_id_selection("[1, 5, 9]"), vec![1, 5, 9]);
        assert_eq!(parse_id_selection("```json\n[2]\n```"), vec![2]);
        assert!(parse_id_selection("none of these").is_empty());
        assert!(parse_id_selection("[]").is_empty());
    }
}
