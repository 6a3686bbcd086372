//! Append-only run log
//!
//! Every task invocation (including cache hits) is recorded as one JSON
//! line. Records are never edited or deleted by the engine; retention is
//! somebody else's policy.

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// One task invocation, as it happened
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Name of the task
    pub task_name: String,

    /// The command after variable resolution
    pub resolved_command: String,

    /// When the invocation started
    pub start_time: DateTime<Utc>,

    /// When the invocation ended
    pub end_time: DateTime<Utc>,

    /// Exit code; None for cache hits, timeouts and signal deaths
    pub exit_code: Option<i32>,

    /// Whether the task was skipped on a valid cache entry
    pub cache_hit: bool,

    /// Fingerprint of the produced (or reused) outputs
    pub output_fingerprint: Option<String>,
}

/// Append-only JSON-lines log
#[derive(Debug)]
pub struct RunLog {
    path: PathBuf,
    file: File,
}

impl RunLog {
    /// Open the log for appending, creating it (and parent directories)
    /// if needed
    pub fn open(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(RunLog { path, file })
    }

    /// The backing file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record; the only mutation the log supports
    pub fn append(&mut self, record: &ExecutionRecord) -> Result<()> {
        let line = serde_json::to_string(record)?;
        writeln!(self.file, "{}", line)?;
        self.file.flush()?;
        Ok(())
    }

    /// All past records for a task, oldest first
    pub fn query(&self, task_name: &str) -> Result<Vec<ExecutionRecord>> {
        let mut records = Vec::new();

        let file = File::open(&self.path)?;
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: ExecutionRecord = serde_json::from_str(&line)?;
            if record.task_name == task_name {
                records.push(record);
            }
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(task: &str, command: &str, cache_hit: bool) -> ExecutionRecord {
        let now = Utc::now();
        ExecutionRecord {
            task_name: task.to_string(),
            resolved_command: command.to_string(),
            start_time: now,
            end_time: now,
            exit_code: if cache_hit { None } else { Some(0) },
            cache_hit,
            output_fingerprint: Some("abc123".to_string()),
        }
    }

    #[test]
    fn test_append_and_query() {
        let temp = TempDir::new().unwrap();
        let mut log = RunLog::open(temp.path().join("runlog.jsonl")).unwrap();

        log.append(&record("build", "make build", false)).unwrap();
        log.append(&record("test", "make test", false)).unwrap();
        log.append(&record("build", "make build", true)).unwrap();

        let records = log.query("build").unwrap();
        assert_eq!(records.len(), 2);
        // oldest first
        assert!(!records[0].cache_hit);
        assert!(records[1].cache_hit);
    }

    #[test]
    fn test_query_unknown_task_is_empty() {
        let temp = TempDir::new().unwrap();
        let mut log = RunLog::open(temp.path().join("runlog.jsonl")).unwrap();
        log.append(&record("build", "make", false)).unwrap();

        assert!(log.query("ghost").unwrap().is_empty());
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("state").join("deep").join("runlog.jsonl");
        let log = RunLog::open(nested.clone()).unwrap();
        assert_eq!(log.path(), nested);
        assert!(nested.exists());
    }

    #[test]
    fn test_records_survive_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("runlog.jsonl");

        {
            let mut log = RunLog::open(path.clone()).unwrap();
            log.append(&record("build", "make", false)).unwrap();
        }

        let log = RunLog::open(path).unwrap();
        assert_eq!(log.query("build").unwrap().len(), 1);
    }
}
