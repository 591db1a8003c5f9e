//! Append-only JSON-line audit logger.
//!
//! Buffers up to 100 records or 1 second, whichever comes first; deny
//! verdicts and critical severities flush immediately. Writer failures are
//! swallowed — logging the inability to log would risk unbounded recursion.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{OpKind, Reason, Severity};

const FLUSH_RECORD_THRESHOLD: usize = 100;
const FLUSH_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub pid: u32,
    pub ppid: Option<u32>,
    pub cwd: String,
    pub argv_head: String,
}

impl ProcessInfo {
    pub fn current() -> Self {
        Self {
            pid: std::process::id(),
            ppid: firewall_core::config::ProcessFlags::from_env().parent_pid,
            cwd: std::env::current_dir()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            argv_head: std::env::args().next().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub ts: i64,
    pub iso: String,
    #[serde(rename = "type")]
    pub kind: OpKind,
    pub operation: String,
    pub target: String,
    pub allowed: bool,
    pub reason: Reason,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
    pub process: ProcessInfo,
    /// Present only when denied and severity >= medium: the origin chain
    /// snapshot, capped at 10 entries, substituting for a native call stack.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<Vec<String>>,
}

impl AuditRecord {
    pub fn new(
        kind: OpKind,
        operation: impl Into<String>,
        target: impl Into<String>,
        allowed: bool,
        reason: Reason,
        severity: Severity,
        package: Option<String>,
    ) -> Self {
        let now = Utc::now();
        let stack = if !allowed && severity >= Severity::Medium {
            Some(crate::origin::stack().into_iter().take(10).collect())
        } else {
            None
        };
        Self {
            ts: now.timestamp_millis(),
            iso: now.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            kind,
            operation: operation.into(),
            target: target.into(),
            allowed,
            reason,
            severity,
            package,
            process: ProcessInfo::current(),
            stack,
        }
    }
}

struct Inner {
    file: Option<File>,
    buffer: Vec<AuditRecord>,
    last_flush: Instant,
}

/// Append-only audit logger. Owns exclusive access to the audit stream; no
/// other component writes to it.
pub struct AuditLogger {
    inner: Mutex<Inner>,
    path: PathBuf,
}

impl AuditLogger {
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|err| {
                tracing::warn!(path = %path.display(), error = %err, "failed to open audit log, records will be dropped");
            })
            .ok();
        Self {
            inner: Mutex::new(Inner {
                file,
                buffer: Vec::with_capacity(FLUSH_RECORD_THRESHOLD),
                last_flush: Instant::now(),
            }),
            path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record an event. Flushes immediately for denies and critical
    /// severity; otherwise buffers until the record-count or time threshold
    /// is reached.
    pub fn record(&self, record: AuditRecord) {
        let immediate = !record.allowed || record.severity == Severity::Critical;
        let mut inner = self.inner.lock().expect("audit logger poisoned");
        inner.buffer.push(record);
        let due_by_count = inner.buffer.len() >= FLUSH_RECORD_THRESHOLD;
        let due_by_time = inner.last_flush.elapsed() >= FLUSH_INTERVAL;
        if immediate || due_by_count || due_by_time {
            Self::flush_locked(&mut inner);
        }
    }

    /// Flush the buffer unconditionally. Call on termination signal.
    pub fn flush(&self) {
        let mut inner = self.inner.lock().expect("audit logger poisoned");
        Self::flush_locked(&mut inner);
    }

    fn flush_locked(inner: &mut Inner) {
        if inner.buffer.is_empty() {
            inner.last_flush = Instant::now();
            return;
        }
        if let Some(file) = inner.file.as_mut() {
            for record in inner.buffer.drain(..) {
                if let Ok(line) = serde_json::to_string(&record) {
                    // Failure to write is swallowed: logging the inability
                    // to log would recurse.
                    let _ = writeln!(file, "{line}");
                }
            }
            let _ = file.flush();
        } else {
            inner.buffer.clear();
        }
        inner.last_flush = Instant::now();
    }

    /// Read the last `n` records from the on-disk log, applying optional
    /// equality filters. Used by reporting, not by the hot path.
    pub fn query_last(
        &self,
        n: usize,
        type_filter: Option<OpKind>,
        allowed_filter: Option<bool>,
        severity_filter: Option<Severity>,
    ) -> Vec<AuditRecord> {
        self.flush();
        let Ok(contents) = std::fs::read_to_string(&self.path) else {
            return Vec::new();
        };
        let mut matched: Vec<AuditRecord> = contents
            .lines()
            .filter_map(|line| serde_json::from_str::<AuditRecord>(line).ok())
            .filter(|r| type_filter.map(|t| t == r.kind).unwrap_or(true))
            .filter(|r| allowed_filter.map(|a| a == r.allowed).unwrap_or(true))
            .filter(|r| severity_filter.map(|s| s == r.severity).unwrap_or(true))
            .collect();
        let len = matched.len();
        if len > n {
            matched.drain(0..len - n);
        }
        matched
    }
}

/// Deserializes a raw JSON line without requiring the full [`AuditRecord`]
/// shape, for tooling that only needs a subset of fields.
pub fn parse_raw_line(line: &str) -> Option<Value> {
    serde_json::from_str(line).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deny_records_flush_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let logger = AuditLogger::open(&path);
        logger.record(AuditRecord::new(
            OpKind::Read,
            "read",
            "/home/u/.ssh/id_rsa",
            false,
            Reason::BlockedRead,
            Severity::High,
            None,
        ));
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 1);
    }

    #[test]
    fn allowed_records_buffer_until_flush() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let logger = AuditLogger::open(&path);
        logger.record(AuditRecord::new(
            OpKind::Read,
            "read",
            "/tmp/fine.txt",
            true,
            Reason::Allowed,
            Severity::Info,
            None,
        ));
        let before_flush = std::fs::read_to_string(&path).unwrap();
        assert_eq!(before_flush.lines().count(), 0);
        logger.flush();
        let after_flush = std::fs::read_to_string(&path).unwrap();
        assert_eq!(after_flush.lines().count(), 1);
    }

    #[test]
    fn query_last_applies_filters() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let logger = AuditLogger::open(&path);
        logger.record(AuditRecord::new(OpKind::Read, "read", "/a", true, Reason::Allowed, Severity::Info, None));
        logger.record(AuditRecord::new(OpKind::Read, "read", "/b", false, Reason::BlockedRead, Severity::High, None));
        logger.flush();
        let denied = logger.query_last(10, None, Some(false), None);
        assert_eq!(denied.len(), 1);
        assert_eq!(denied[0].target, "/b");
    }

    #[test]
    fn stack_present_only_for_denied_medium_or_above() {
        let allowed = AuditRecord::new(OpKind::Read, "read", "/a", true, Reason::Allowed, Severity::Info, None);
        assert!(allowed.stack.is_none());
        let denied_low = AuditRecord::new(OpKind::Read, "read", "/a", false, Reason::BlockedRead, Severity::Low, None);
        assert!(denied_low.stack.is_none());
        let denied_high = AuditRecord::new(OpKind::Read, "read", "/a", false, Reason::BlockedRead, Severity::High, None);
        assert!(denied_high.stack.is_some());
    }
}
