//! Structured JSONL log of a conformance run.

use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Structured log entry for one registration or execution step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLogEntry {
    /// RFC3339 timestamp (UTC).
    pub timestamp: DateTime<Utc>,
    /// Log level (info, warn, error).
    pub level: String,
    /// Case description, or `registration`.
    pub test_name: String,
    /// Test group title (persona label).
    pub group: String,
    /// Phase (register|execute).
    pub phase: String,
    /// Correlation ID shared by every entry of one run.
    pub correlation_id: String,
    /// Result (pass|fail|error|skipped|planned).
    pub result: String,
    /// Duration in milliseconds.
    pub duration_ms: u64,
    /// Case context (`collection`, `operation`, `expected`, ...).
    #[serde(default)]
    pub context: serde_json::Value,
}

/// In-memory collector for run log entries.
///
/// Clones share the same buffer and correlation id.
#[derive(Debug, Clone)]
pub struct RunLog {
    correlation_id: String,
    entries: Arc<Mutex<Vec<RunLogEntry>>>,
}

impl Default for RunLog {
    fn default() -> Self {
        Self::new()
    }
}

impl RunLog {
    /// Create an empty log with a fresh correlation id.
    #[must_use]
    pub fn new() -> Self {
        Self::with_correlation_id(Uuid::new_v4().to_string())
    }

    /// Create an empty log with a fixed correlation id.
    #[must_use]
    pub fn with_correlation_id(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            entries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    #[must_use]
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Append an entry stamped with this run's correlation id.
    #[allow(clippy::too_many_arguments)]
    pub fn record(
        &self,
        level: &str,
        phase: &str,
        group: &str,
        test_name: &str,
        result: &str,
        duration_ms: u64,
        context: serde_json::Value,
    ) {
        let entry = RunLogEntry {
            timestamp: Utc::now(),
            level: level.to_string(),
            test_name: test_name.to_string(),
            group: group.to_string(),
            phase: phase.to_string(),
            correlation_id: self.correlation_id.clone(),
            result: result.to_string(),
            duration_ms,
            context,
        };
        self.entries.lock().push(entry);
    }

    /// Snapshot all entries.
    #[must_use]
    pub fn entries(&self) -> Vec<RunLogEntry> {
        self.entries.lock().clone()
    }

    /// Entries of one phase.
    #[must_use]
    pub fn for_phase(&self, phase: &str) -> Vec<RunLogEntry> {
        self.entries()
            .into_iter()
            .filter(|entry| entry.phase == phase)
            .collect()
    }

    /// Export entries as JSONL.
    #[must_use]
    pub fn to_jsonl(&self) -> String {
        self.entries()
            .into_iter()
            .filter_map(|entry| serde_json::to_string(&entry).ok())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Write entries to a JSONL file.
    ///
    /// # Errors
    /// Returns an I/O error if the file cannot be written.
    pub fn write_jsonl(&self, path: &Path) -> io::Result<()> {
        let mut file = std::fs::File::create(path)?;
        for entry in self.entries() {
            let line = serde_json::to_string(&entry).map_err(io::Error::other)?;
            writeln!(file, "{line}")?;
        }
        file.flush()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn entries_share_correlation_id() {
        let log = RunLog::with_correlation_id("run-1");
        let clone = log.clone();
        log.record("info", "register", "owner", "allows creating a document", "planned", 0, json!({}));
        clone.record("warn", "execute", "owner", "allows creating a document", "fail", 3, json!({"collection": "build"}));

        let entries = log.entries();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.correlation_id == "run-1"));
        assert_eq!(log.for_phase("execute").len(), 1);
    }

    #[test]
    fn concurrent_records_are_all_kept() {
        let log = RunLog::with_correlation_id("run-2");
        std::thread::scope(|scope| {
            for worker in 0..8 {
                let log = log.clone();
                scope.spawn(move || {
                    for case in 0..25 {
                        log.record(
                            "info",
                            "execute",
                            &format!("persona-{worker}"),
                            &format!("case-{case}"),
                            "pass",
                            0,
                            json!({}),
                        );
                    }
                });
            }
        });

        assert_eq!(log.entries().len(), 200);
        assert_eq!(log.to_jsonl().lines().count(), 200);
    }

    #[test]
    fn jsonl_round_trips_to_file() {
        let log = RunLog::new();
        log.record("info", "execute", "owner", "allows reading the collection", "pass", 1, json!({}));
        log.record("info", "execute", "owner", "allows updating a document", "pass", 1, json!({}));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.jsonl");
        log.write_jsonl(&path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = written.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: RunLogEntry = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.result, "pass");
        assert_eq!(log.to_jsonl().lines().count(), 2);
    }
}
