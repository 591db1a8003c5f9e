//! Behavioral monitor: rate-limiting counters, threshold/hard-limit checks,
//! and the suspicious-event log.
//!
//! Calls the engine's collaborators but is never called by them — the
//! dependency graph is one-way (wrapper → monitor → counters), which
//! replaces the original's cyclic references between the firewall core,
//! the behavior monitor, and the network monitor.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classify;
use crate::config::{BehavioralPolicy, Config};
use crate::counters::Counters;
use crate::types::{Reason, Severity, Verdict};

/// Suspicious-event log retention: bounded, trimmed but never cleared until
/// process exit.
const SUSPICIOUS_LOG_CAPACITY: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SuspiciousKind {
    SuspiciousFileWrite,
    SuspiciousNetworkRequest,
    SuspiciousCommand,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuspiciousEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: SuspiciousKind,
    pub details: String,
    /// Innermost-first snapshot of the origin stack at the time of the
    /// event, capped at 5 entries. Substitutes for a native call-stack
    /// capture, which has no equivalent once origin tracking replaced
    /// stack-trace resolution.
    pub origin_chain: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    FileReads,
    FileWrites,
    NetworkRequests,
    ProcessSpawns,
}

impl Metric {
    fn name(self) -> &'static str {
        match self {
            Metric::FileReads => "fileReads",
            Metric::FileWrites => "fileWrites",
            Metric::NetworkRequests => "networkRequests",
            Metric::ProcessSpawns => "processSpawns",
        }
    }
}

pub struct BehaviorMonitor {
    counters: Counters,
    policy: BehavioralPolicy,
    suspicious_log: Mutex<VecDeque<SuspiciousEvent>>,
}

impl BehaviorMonitor {
    pub fn new(config: &Config) -> Self {
        Self {
            counters: Counters::new(),
            policy: config.behavioral.clone(),
            suspicious_log: Mutex::new(VecDeque::with_capacity(SUSPICIOUS_LOG_CAPACITY)),
        }
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    fn push_suspicious(&self, kind: SuspiciousKind, details: impl Into<String>) {
        let event = SuspiciousEvent {
            timestamp: Utc::now(),
            kind,
            details: details.into(),
            origin_chain: crate::origin::stack().into_iter().take(5).collect(),
        };
        let mut log = self.suspicious_log.lock().expect("suspicious log poisoned");
        if log.len() >= SUSPICIOUS_LOG_CAPACITY {
            log.pop_front();
        }
        log.push_back(event);
    }

    pub fn suspicious_events(&self) -> Vec<SuspiciousEvent> {
        self.suspicious_log
            .lock()
            .expect("suspicious log poisoned")
            .iter()
            .cloned()
            .collect()
    }

    fn threshold_and_hard_limit(
        &self,
        metric: Metric,
        current: u64,
        threshold: u64,
        hard_limit: u64,
    ) -> Option<Verdict> {
        if hard_limit > 0 && current > hard_limit {
            tracing::error!(metric = metric.name(), current, hard_limit, "hard limit exceeded");
            return Some(
                Verdict::deny(Reason::HardLimitExceeded, Severity::Critical)
                    .with_limit(hard_limit, current),
            );
        }
        if threshold > 0 && current == threshold {
            tracing::warn!(metric = metric.name(), current, threshold, "behavioral alert threshold reached");
        }
        None
    }

    /// Project-internal source reads are not counted against thresholds —
    /// callers should skip this for reads classified as project-internal.
    pub fn record_file_read(&self) -> Option<Verdict> {
        let current = self.counters.increment_file_reads();
        self.threshold_and_hard_limit(
            Metric::FileReads,
            current,
            self.policy.alert_thresholds.file_reads,
            0,
        )
    }

    pub fn record_file_write(&self, target: &str) -> Option<Verdict> {
        let current = self.counters.increment_file_writes();
        if Self::is_sensitive_write_location(target) {
            self.push_suspicious(SuspiciousKind::SuspiciousFileWrite, target.to_string());
        }
        self.threshold_and_hard_limit(
            Metric::FileWrites,
            current,
            self.policy.alert_thresholds.file_writes,
            self.policy.max_file_writes,
        )
    }

    pub fn record_network(&self, target: &str) -> Option<Verdict> {
        let current = self.counters.increment_network_requests();
        if Self::is_exfiltration_associated(target) {
            self.push_suspicious(SuspiciousKind::SuspiciousNetworkRequest, target.to_string());
        }
        self.threshold_and_hard_limit(
            Metric::NetworkRequests,
            current,
            self.policy.alert_thresholds.network,
            self.policy.max_network,
        )
    }

    pub fn record_spawn(&self, command: &str) -> Option<Verdict> {
        let current = self.counters.increment_process_spawns();
        if Self::matches_suspicious_command(command) {
            self.push_suspicious(SuspiciousKind::SuspiciousCommand, command.to_string());
        }
        self.threshold_and_hard_limit(
            Metric::ProcessSpawns,
            current,
            self.policy.alert_thresholds.spawns,
            self.policy.max_spawns,
        )
    }

    /// Writes to SSH/AWS/CI directories, executable-bit locations, or with
    /// shell-script extensions, regardless of counter state.
    fn is_sensitive_write_location(target: &str) -> bool {
        const FRAGMENTS: &[&str] = &[
            "/.ssh/", "/.aws/", "/.github/workflows/", "/.git/hooks/",
        ];
        let lower = target.to_lowercase();
        FRAGMENTS.iter().any(|f| lower.contains(f))
            || classify::is_blocked_extension(target, &[".sh".into(), ".bash".into()]).is_some()
    }

    /// Requests to known exfiltration-associated hosts or raw-IP URLs.
    fn is_exfiltration_associated(target: &str) -> bool {
        let parsed = classify::parse_network_target(target);
        const ASSOCIATED: &[&str] = &["pastebin.com", "transfer.sh", "ngrok.io", "requestbin.com"];
        if ASSOCIATED.iter().any(|d| classify::domain_matches_blocklist(&parsed.host, d)) {
            return true;
        }
        parsed.host.parse::<std::net::IpAddr>().is_ok()
    }

    /// Reverse-shell, pipe-to-shell, and credential-harvesting command
    /// patterns.
    fn matches_suspicious_command(command: &str) -> bool {
        const MARKERS: &[&str] = &[
            "/dev/tcp/", "nc -e", "ncat -e", "bash -i", "curl | sh", "curl|sh",
            "wget -O- | sh", "| bash", "mkfifo",
        ];
        let lower = command.to_lowercase();
        MARKERS.iter().any(|m| lower.contains(m))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor_with(max_network: u64) -> BehaviorMonitor {
        let mut cfg = Config::default();
        cfg.behavioral.max_network = max_network;
        cfg.behavioral.alert_thresholds.network = 0;
        BehaviorMonitor::new(&cfg)
    }

    #[test]
    fn hard_limit_denies_only_after_exceeding() {
        let monitor = monitor_with(5);
        for _ in 0..5 {
            assert!(monitor.record_network("https://example.com").is_none());
        }
        let verdict = monitor.record_network("https://example.com").unwrap();
        assert!(!verdict.allowed);
        assert_eq!(verdict.reason, Reason::HardLimitExceeded);
        assert_eq!(verdict.limit, Some(5));
        assert_eq!(verdict.current, Some(6));
    }

    #[test]
    fn suspicious_write_to_ssh_directory_is_logged() {
        let monitor = monitor_with(0);
        monitor.record_file_write("/home/u/.ssh/authorized_keys");
        let events = monitor.suspicious_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, SuspiciousKind::SuspiciousFileWrite);
    }

    #[test]
    fn counters_increment_independently_per_metric() {
        let monitor = monitor_with(0);
        monitor.record_file_read();
        monitor.record_file_write("/tmp/out.txt");
        let snap = monitor.counters().snapshot();
        assert_eq!(snap.file_reads, 1);
        assert_eq!(snap.file_writes, 1);
        assert_eq!(snap.network_requests, 0);
    }
}
