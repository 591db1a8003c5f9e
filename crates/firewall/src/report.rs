//! Behavior report persistence: an ordered, capped array of periodic
//! snapshots written to `firewall-report.json`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::counters::CounterSnapshot;
use crate::monitor::SuspiciousEvent;

const MAX_REPORT_ENTRIES: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehaviorReport {
    pub generated_at: DateTime<Utc>,
    pub counters: ReportCounters,
    pub suspicious_event_count: usize,
    pub recent_suspicious_events: Vec<SuspiciousEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportCounters {
    pub file_reads: u64,
    pub file_writes: u64,
    pub network_requests: u64,
    pub process_spawns: u64,
}

impl From<CounterSnapshot> for ReportCounters {
    fn from(s: CounterSnapshot) -> Self {
        Self {
            file_reads: s.file_reads,
            file_writes: s.file_writes,
            network_requests: s.network_requests,
            process_spawns: s.process_spawns,
        }
    }
}

impl BehaviorReport {
    pub fn new(counters: CounterSnapshot, suspicious_events: Vec<SuspiciousEvent>) -> Self {
        Self {
            generated_at: Utc::now(),
            counters: counters.into(),
            suspicious_event_count: suspicious_events.len(),
            recent_suspicious_events: suspicious_events.into_iter().rev().take(10).collect(),
        }
    }
}

/// Append `report` to the ordered, capped array at `path`. On corruption
/// (the existing file doesn't parse as a JSON array of reports) the current
/// file is renamed with a `.corrupted` suffix and a fresh array started.
pub fn append_report(path: impl AsRef<Path>, report: BehaviorReport) -> std::io::Result<()> {
    let path = path.as_ref();
    let mut reports = load_reports(path);
    reports.push(report);
    if reports.len() > MAX_REPORT_ENTRIES {
        let excess = reports.len() - MAX_REPORT_ENTRIES;
        reports.drain(0..excess);
    }
    let serialized = serde_json::to_string_pretty(&reports)?;
    std::fs::write(path, serialized)
}

fn load_reports(path: &Path) -> Vec<BehaviorReport> {
    let Ok(contents) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    if contents.trim().is_empty() {
        return Vec::new();
    }
    match serde_json::from_str(&contents) {
        Ok(reports) => reports,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "corrupted firewall report, rotating aside");
            rotate_corrupted(path);
            Vec::new()
        }
    }
}

fn rotate_corrupted(path: &Path) {
    let corrupted: PathBuf = {
        let mut s = path.as_os_str().to_os_string();
        s.push(".corrupted");
        PathBuf::from(s)
    };
    let _ = std::fs::rename(path, corrupted);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_report_caps_at_fifty_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("firewall-report.json");
        for _ in 0..55 {
            let counters = CounterSnapshot::default();
            append_report(&path, BehaviorReport::new(counters, Vec::new())).unwrap();
        }
        let reports = load_reports(&path);
        assert_eq!(reports.len(), MAX_REPORT_ENTRIES);
    }

    #[test]
    fn corrupted_report_file_is_rotated_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("firewall-report.json");
        std::fs::write(&path, "not json at all").unwrap();
        append_report(&path, BehaviorReport::new(CounterSnapshot::default(), Vec::new())).unwrap();
        assert!(dir.path().join("firewall-report.json.corrupted").exists());
        let reports = load_reports(&path);
        assert_eq!(reports.len(), 1);
    }
}
