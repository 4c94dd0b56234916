//! Date-partitioned JSONL audit log.
//!
//! Navigation decisions and maintenance task traces are appended as one JSON
//! record per event to `{dir}/{kind}-{YYYY-MM-DD}.jsonl`. The log is consumed
//! by operational tooling only; appends are best-effort and never fail the
//! caller.

use std::io::Write;
use std::path::PathBuf;

use chrono::Utc;
use serde::Serialize;
use tracing::warn;

use crate::config::AuditConfig;

/// Append-only event log writer.
#[derive(Debug, Clone)]
pub struct AuditLog {
    dir: PathBuf,
}

impl AuditLog {
    /// Create a log writer rooted at the configured directory
    pub fn new(config: &AuditConfig) -> Self {
        Self {
            dir: config.dir.clone(),
        }
    }

    /// Append one event to today's partition for `kind`
    pub fn append<T: Serialize>(&self, kind: &str, event: &T) {
        if let Err(e) = self.try_append(kind, event) {
            warn!(kind, error = %e, "Audit append failed");
        }
    }

    fn try_append<T: Serialize>(&self, kind: &str, event: &T) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;

        let file_name = format!("{}-{}.jsonl", kind, Utc::now().format("%Y-%m-%d"));
        let path = self.dir.join(file_name);

        let mut line = serde_json::to_string(event)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        line.push('\n');

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        file.write_all(line.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_append_creates_dated_partition() {
        let tmp = tempfile::tempdir().unwrap();
        let log = AuditLog::new(&AuditConfig {
            dir: tmp.path().to_path_buf(),
        });

        log.append("navigation", &json!({"decision": "stay"}));
        log.append("navigation", &json!({"decision": "goto"}));

        let expected = tmp
            .path()
            .join(format!("navigation-{}.jsonl", Utc::now().format("%Y-%m-%d")));
        let contents = std::fs::read_to_string(expected).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("stay"));
        assert!(lines[1].contains("goto"));
    }

    #[test]
    fn test_append_never_panics_on_bad_dir() {
        let log = AuditLog::new(&AuditConfig {
            dir: PathBuf::from("/dev/null/not-a-dir"),
        });
        // Best-effort: failure is logged, not raised.
        log.append("maintenance", &json!({"ok": true}));
    }
}
