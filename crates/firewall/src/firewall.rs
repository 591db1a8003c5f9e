//! The facade that ties every subsystem together: a single process-wide
//! instance, constructed once and handed to the capability wrappers so
//! sandboxed code only ever reaches the host primitives through
//! policy-checked paths.
//!
//! The dependency graph runs one way: [`Firewall`] owns the engine,
//! monitor, exfiltration detector, and audit logger, and none of those
//! collaborators call back into it. The capability wrappers in
//! [`crate::capability`] call *this* module, never the engine directly, so
//! every path — filesystem, network, command, GitHub API — goes through
//! the same audit/monitor/exfiltration plumbing exactly once.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use crate::audit::{AuditLogger, AuditRecord};
use crate::classify;
use crate::config::Config;
use crate::engine::PolicyEngine;
use crate::exfil::ExfiltrationDetector;
use crate::github;
use crate::monitor::BehaviorMonitor;
use crate::path_validation_ext::combine_original_and_realpath;
use crate::selfprotect;
use crate::types::{OpKind, Operation, Reason, Severity, Verdict};
use crate::error::AccessDenied;

static GLOBAL: OnceLock<Arc<Firewall>> = OnceLock::new();

/// Holds the file-appender's background-flush handle for the process
/// lifetime. Only [`Firewall::install`] populates this; [`Firewall::new`]
/// is also called directly by tests, which have no business re-initializing
/// the global tracing subscriber on every test.
static LOG_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

pub struct Firewall {
    engine: PolicyEngine,
    monitor: BehaviorMonitor,
    exfil: ExfiltrationDetector,
    audit: AuditLogger,
    fingerprint: selfprotect::ConfigFingerprint,
    install_mode_active: bool,
    fortress_active: bool,
    generate_report: bool,
    report_path: PathBuf,
}

impl Firewall {
    pub fn new(config: Config, audit_path: impl AsRef<Path>) -> Self {
        let fingerprint = selfprotect::ConfigFingerprint::capture(&config);
        let flags = firewall_core::config::ProcessFlags::from_env();
        let monitor = BehaviorMonitor::new(&config);
        let exfil = ExfiltrationDetector::new(&config);
        let generate_report = config.reporting.generate_report;
        let report_path = PathBuf::from(&config.reporting.report_file);
        let audit = AuditLogger::open(audit_path);
        let engine = PolicyEngine::new(config);
        selfprotect::mark_installed();
        Self {
            engine,
            monitor,
            exfil,
            audit,
            fingerprint,
            install_mode_active: flags.install_mode,
            fortress_active: flags.fortress,
            generate_report,
            report_path,
        }
    }

    /// Install the process-wide singleton, loading configuration per the
    /// discovery order in [`crate::config::load`]. No-op if already
    /// installed; returns the existing instance. This mirrors "wrappers
    /// installed once, never uninstalled" from the lifecycle invariants.
    pub fn install(explicit_config: Option<&Path>) -> Arc<Firewall> {
        GLOBAL
            .get_or_init(|| {
                let config = crate::config::load(explicit_config);
                let audit_path = PathBuf::from(config.reporting.audit_file.clone());
                let guard = firewall_core::observability::init_tracing(&config.reporting.log_file);
                let _ = LOG_GUARD.set(guard);
                Arc::new(Firewall::new(config, audit_path))
            })
            .clone()
    }

    pub fn global() -> Option<Arc<Firewall>> {
        GLOBAL.get().cloned()
    }

    pub fn config(&self) -> &Config {
        self.engine.config()
    }

    /// Verifies the frozen configuration hasn't diverged from its
    /// initialization-time fingerprint. Always true in safe Rust; kept as a
    /// defense-in-depth assertion rather than a load-bearing check.
    pub fn config_unchanged(&self) -> bool {
        self.fingerprint.verify(self.engine.config())
    }

    fn counters_snapshot(&self) -> crate::counters::CounterSnapshot {
        self.monitor.counters().snapshot()
    }

    fn record(&self, op: &Operation, verdict: &Verdict) {
        let package = op.origin.clone();
        self.audit.record(AuditRecord::new(
            op.kind,
            format!("{:?}", op.kind),
            op.target.clone(),
            verdict.allowed,
            verdict.reason,
            verdict.severity,
            package,
        ));
    }

    /// Evaluate a filesystem operation. Runs the tamper guard, then the
    /// policy engine against both the literal target and its realpath
    /// (taking the more restrictive of the two), then the behavior
    /// monitor's counters and pattern checks, then the exfiltration
    /// detector's sensitive-read tracking.
    pub fn check_filesystem(&self, op: Operation) -> Result<(), AccessDenied> {
        if op.kind.is_write_like()
            && selfprotect::denies_self_tamper(&op.target, op.origin.as_deref(), self.fortress_active)
        {
            let verdict = Verdict::deny(Reason::FirewallOutputTampering, Severity::Critical);
            self.record(&op, &verdict);
            return Err(AccessDenied::new(verdict.reason, verdict.severity, op.target.clone())
                .with_origin(op.origin));
        }

        let snapshot = self.counters_snapshot();
        let verdict = combine_original_and_realpath(&self.engine, &op, snapshot);
        self.record(&op, &verdict);

        if !verdict.allowed {
            return Err(AccessDenied::new(verdict.reason, verdict.severity, op.target.clone())
                .with_pattern(verdict.pattern.clone())
                .with_origin(op.origin));
        }

        let project_internal = matches!(
            verdict.reason,
            Reason::AllowedProjectConfig | Reason::AllowedProjectSource | Reason::AllowedInstallMode
        );
        if !project_internal {
            let hard_limit_verdict = match op.kind {
                OpKind::Read => self.monitor.record_file_read(),
                OpKind::Write | OpKind::Create | OpKind::Delete | OpKind::Symlink => {
                    self.monitor.record_file_write(&op.target)
                }
                _ => None,
            };
            if let Some(deny) = hard_limit_verdict {
                self.record(&op, &deny);
                return Err(AccessDenied::new(deny.reason, deny.severity, op.target.clone())
                    .with_origin(op.origin));
            }
        }

        if matches!(op.kind, OpKind::Read) {
            self.exfil.observe_read(&op.target);
        }
        Ok(())
    }

    pub fn check_network(&self, op: Operation) -> Result<(), AccessDenied> {
        let snapshot = self.counters_snapshot();
        let verdict = self.engine.check(&op, snapshot);
        self.record(&op, &verdict);
        if !verdict.allowed {
            return Err(AccessDenied::new(verdict.reason, verdict.severity, op.target.clone())
                .with_pattern(verdict.pattern.clone())
                .with_origin(op.origin));
        }

        if let Some(deny) = self.monitor.record_network(&op.target) {
            self.record(&op, &deny);
            return Err(AccessDenied::new(deny.reason, deny.severity, op.target.clone())
                .with_origin(op.origin));
        }

        let target = classify::parse_network_target(&op.target);
        if github::is_github_api_host(&target.host) {
            let gh_verdict = github::check_github_api(self.engine.config(), &op);
            self.record(&op, &gh_verdict);
            if !gh_verdict.allowed {
                return Err(AccessDenied::new(gh_verdict.reason, gh_verdict.severity, op.target.clone())
                    .with_pattern(gh_verdict.pattern)
                    .with_origin(op.origin));
            }
        }

        for finding in self.exfil.observe_outbound(
            op.method.as_deref(),
            &target.host,
            op.body.as_deref(),
            self.install_mode_active,
        ) {
            tracing::error!(
                kind = ?finding.kind,
                detail = %finding.detail,
                culprits = ?finding.culprit_paths,
                "exfiltration detector finding"
            );
            self.audit.record(AuditRecord::new(
                op.kind,
                "exfiltration_finding",
                op.target.clone(),
                false,
                match finding.kind {
                    crate::exfil::ExfilFindingKind::TimingCorrelation => Reason::TimingCorrelation,
                    crate::exfil::ExfilFindingKind::CredentialExfiltration => Reason::CredentialExfiltration,
                    crate::exfil::ExfilFindingKind::InstallPhaseExternalNetwork => {
                        Reason::InstallPhaseExternalNetwork
                    }
                },
                finding.severity,
                op.origin.clone(),
            ));
        }
        Ok(())
    }

    pub fn check_command(&self, op: Operation) -> Result<(), AccessDenied> {
        let snapshot = self.counters_snapshot();
        let verdict = self.engine.check(&op, snapshot);
        self.record(&op, &verdict);
        if !verdict.allowed {
            return Err(AccessDenied::new(verdict.reason, verdict.severity, op.target.clone())
                .with_pattern(verdict.pattern.clone())
                .with_origin(op.origin));
        }
        if let Some(deny) = self.monitor.record_spawn(&op.target) {
            self.record(&op, &deny);
            return Err(AccessDenied::new(deny.reason, deny.severity, op.target.clone())
                .with_origin(op.origin));
        }
        Ok(())
    }

    pub fn check_environment(&self, op: Operation) -> Result<(), AccessDenied> {
        let snapshot = self.counters_snapshot();
        let verdict = self.engine.check(&op, snapshot);
        self.record(&op, &verdict);
        if !verdict.allowed {
            return Err(AccessDenied::new(verdict.reason, verdict.severity, op.target.clone())
                .with_origin(op.origin));
        }
        Ok(())
    }

    /// Flush the audit buffer and, if `reporting.generate_report` is set,
    /// append a behavior snapshot to the report file. Call on normal exit
    /// and signal handlers.
    pub fn flush(&self) {
        self.audit.flush();
        self.write_report();
    }

    /// Append a [`BehaviorReport`](crate::report::BehaviorReport) snapshot
    /// to `reporting.report_file`, if enabled. A write failure is logged
    /// and otherwise ignored — report generation is best-effort, unlike the
    /// audit log.
    fn write_report(&self) {
        if !self.generate_report {
            return;
        }
        let report = crate::report::BehaviorReport::new(self.counters_snapshot(), self.suspicious_events());
        if let Err(err) = crate::report::append_report(&self.report_path, report) {
            tracing::warn!(path = %self.report_path.display(), error = %err, "failed to write behavior report");
        }
    }

    pub fn suspicious_events(&self) -> Vec<crate::monitor::SuspiciousEvent> {
        self.monitor.suspicious_events()
    }

    pub fn counters(&self) -> crate::counters::CounterSnapshot {
        self.counters_snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn firewall_with(config: Config) -> Firewall {
        let dir = tempfile::tempdir().unwrap();
        Firewall::new(config, dir.path().join("audit.jsonl"))
    }

    #[test]
    fn denies_write_to_own_audit_file_from_sandboxed_origin() {
        let fw = firewall_with(Config::default());
        let op = Operation::new(OpKind::Write, "/tmp/x/firewall-audit.jsonl", Some("evil-pkg".into()));
        let err = fw.check_filesystem(op).unwrap_err();
        assert_eq!(err.reason, Reason::FirewallOutputTampering);
    }

    #[test]
    fn allows_host_program_writes_to_its_own_audit_file() {
        let fw = firewall_with(Config::default());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("firewall-audit.jsonl");
        let op = Operation::new(OpKind::Write, path.to_string_lossy().to_string(), None);
        assert!(fw.check_filesystem(op).is_ok());
    }

    #[test]
    fn hard_limit_denies_sixth_network_request() {
        let mut cfg = Config::default();
        cfg.behavioral.max_network = 5;
        let fw = firewall_with(cfg);
        for _ in 0..5 {
            let op = Operation::new(OpKind::NetConnect, "https://example.com", None);
            assert!(fw.check_network(op).is_ok());
        }
        let op = Operation::new(OpKind::NetConnect, "https://example.com", None);
        let err = fw.check_network(op).unwrap_err();
        assert_eq!(err.reason, Reason::HardLimitExceeded);
    }

    #[test]
    fn flush_writes_behavior_report_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = Config::default();
        cfg.reporting.report_file = dir.path().join("firewall-report.json").to_string_lossy().to_string();
        let fw = Firewall::new(cfg, dir.path().join("audit.jsonl"));
        fw.flush();
        assert!(dir.path().join("firewall-report.json").exists());
    }

    #[test]
    fn flush_skips_report_when_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = Config::default();
        cfg.reporting.generate_report = false;
        cfg.reporting.report_file = dir.path().join("firewall-report.json").to_string_lossy().to_string();
        let fw = Firewall::new(cfg, dir.path().join("audit.jsonl"));
        fw.flush();
        assert!(!dir.path().join("firewall-report.json").exists());
    }

    #[test]
    fn config_fingerprint_matches_after_construction() {
        let fw = firewall_with(Config::default());
        assert!(fw.config_unchanged());
    }
}
