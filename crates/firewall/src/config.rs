//! Frozen policy configuration: the JSON document described in the data
//! model. Loaded once at process start and shared read-only thereafter —
//! nothing in this module offers interior mutability, so "frozen" is a
//! property of the type, not just a convention.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use firewall_core::config::env_keys::discovery::CONFIG_FILE_NAMES;
use firewall_core::config::{env_optional, ProcessFlags};

use crate::error::FirewallError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Enabled,
    AlertOnly,
    Strict,
    Interactive,
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Enabled
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkMode {
    Monitor,
    Enforce,
}

impl Default for NetworkMode {
    fn default() -> Self {
        NetworkMode::Enforce
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllowedDomainsMode {
    Off,
    Whitelist,
}

impl Default for AllowedDomainsMode {
    fn default() -> Self {
        AllowedDomainsMode::Off
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesystemPolicy {
    pub blocked_read_paths: Vec<String>,
    pub blocked_write_paths: Vec<String>,
    pub blocked_extensions: Vec<String>,
    pub allowed_paths: Vec<String>,
}

impl Default for FilesystemPolicy {
    fn default() -> Self {
        Self {
            blocked_read_paths: vec![
                "/.ssh/".into(),
                "/.aws/".into(),
                "/.gnupg/".into(),
                "/.kube/".into(),
                ".env".into(),
                "id_rsa".into(),
                "id_ed25519".into(),
            ],
            blocked_write_paths: vec!["/.git/hooks/".into(), "/.ssh/authorized_keys".into()],
            blocked_extensions: vec![
                ".exe".into(),
                ".dll".into(),
                ".so".into(),
                ".sh".into(),
                ".bat".into(),
                ".cmd".into(),
                ".ps1".into(),
            ],
            allowed_paths: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkPolicy {
    pub enabled: bool,
    pub mode: NetworkMode,
    pub allow_localhost: bool,
    pub allow_private: bool,
    pub blocked_domains: Vec<String>,
    pub allowed_domains: Vec<String>,
    pub allowed_domains_mode: AllowedDomainsMode,
    pub suspicious_ports: Vec<u16>,
    pub credential_patterns: Vec<String>,
}

impl Default for NetworkPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: NetworkMode::Enforce,
            allow_localhost: true,
            allow_private: false,
            blocked_domains: vec!["pastebin.com".into(), "transfer.sh".into()],
            allowed_domains: Vec::new(),
            allowed_domains_mode: AllowedDomainsMode::Off,
            suspicious_ports: vec![4444, 1337, 6666, 31337],
            credential_patterns: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockedCommandPattern {
    pub regex: String,
    pub severity: crate::types::Severity,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandsPolicy {
    pub allowed_commands: Vec<String>,
    pub blocked_patterns: Vec<BlockedCommandPattern>,
}

impl Default for CommandsPolicy {
    fn default() -> Self {
        Self {
            allowed_commands: Vec::new(),
            blocked_patterns: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertThresholds {
    pub file_reads: u64,
    pub file_writes: u64,
    pub network: u64,
    pub spawns: u64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            file_reads: 500,
            file_writes: 100,
            network: 50,
            spawns: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BehavioralPolicy {
    pub monitor_lifecycle: bool,
    pub alert_thresholds: AlertThresholds,
    pub max_file_writes: u64,
    pub max_network: u64,
    pub max_spawns: u64,
}

impl Default for BehavioralPolicy {
    fn default() -> Self {
        Self {
            monitor_lifecycle: true,
            alert_thresholds: AlertThresholds::default(),
            max_file_writes: 1000,
            max_network: 200,
            max_spawns: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentPolicy {
    pub protected_variables: Vec<String>,
    pub allow_trusted_modules: bool,
}

impl Default for EnvironmentPolicy {
    fn default() -> Self {
        Self {
            protected_variables: vec![
                "AWS_*".into(),
                "*_TOKEN".into(),
                "*_SECRET".into(),
                "*_API_KEY".into(),
                "GITHUB_TOKEN".into(),
                "NPM_TOKEN".into(),
            ],
            allow_trusted_modules: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Exception {
    pub allow_filesystem: Vec<String>,
    pub allow_network: Vec<String>,
    pub allow_commands: Vec<String>,
    pub allow_environment: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubApiPolicy {
    pub monitor_repo_creation: bool,
    pub monitor_workflow_creation: bool,
    pub blocked_repo_names: Vec<String>,
    pub blocked_workflow_patterns: Vec<String>,
}

impl Default for GitHubApiPolicy {
    fn default() -> Self {
        Self {
            monitor_repo_creation: true,
            monitor_workflow_creation: true,
            blocked_repo_names: Vec::new(),
            blocked_workflow_patterns: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportingPolicy {
    pub log_file: String,
    pub audit_file: String,
    pub report_file: String,
    pub alert_on_suspicious: bool,
    pub generate_report: bool,
}

impl Default for ReportingPolicy {
    fn default() -> Self {
        use firewall_core::config::env_keys::reporting::{
            DEFAULT_AUDIT_FILE, DEFAULT_LOG_FILE, DEFAULT_REPORT_FILE,
        };
        Self {
            log_file: DEFAULT_LOG_FILE.to_string(),
            audit_file: DEFAULT_AUDIT_FILE.to_string(),
            report_file: DEFAULT_REPORT_FILE.to_string(),
            alert_on_suspicious: true,
            generate_report: true,
        }
    }
}

/// Fail-open or fail-closed posture when the engine cannot initialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradedPosture {
    FailOpen,
    FailClosed,
}

impl Default for DegradedPosture {
    fn default() -> Self {
        DegradedPosture::FailOpen
    }
}

/// The complete frozen policy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub mode: Mode,
    pub filesystem: FilesystemPolicy,
    pub network: NetworkPolicy,
    pub commands: CommandsPolicy,
    pub behavioral: BehavioralPolicy,
    pub environment: EnvironmentPolicy,
    pub trusted_modules: Vec<String>,
    pub exceptions: HashMap<String, Exception>,
    pub github_api: GitHubApiPolicy,
    pub reporting: ReportingPolicy,
    pub degraded_posture: DegradedPosture,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            filesystem: FilesystemPolicy::default(),
            network: NetworkPolicy::default(),
            commands: CommandsPolicy::default(),
            behavioral: BehavioralPolicy::default(),
            environment: EnvironmentPolicy::default(),
            trusted_modules: Vec::new(),
            exceptions: HashMap::new(),
            github_api: GitHubApiPolicy::default(),
            reporting: ReportingPolicy::default(),
            degraded_posture: DegradedPosture::default(),
        }
    }
}

impl Config {
    pub fn is_strict(&self) -> bool {
        self.mode == Mode::Strict
    }

    pub fn is_alert_only(&self) -> bool {
        self.mode == Mode::AlertOnly
    }

    pub fn exception_for<'a>(&'a self, origin: &str) -> Option<&'a Exception> {
        self.exceptions.get(origin)
    }

    pub fn is_trusted(&self, origin: &str) -> bool {
        self.trusted_modules.iter().any(|m| m == origin)
    }

    /// Parse a configuration document. On parse failure callers should fall
    /// back to [`Config::default`] and emit a single warning, per the
    /// degrade-to-defaults error policy.
    pub fn from_json(raw: &str) -> Result<Self, FirewallError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, FirewallError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Discovery order: explicit path argument → `FIREWALL_CONFIG` → per-name
/// search of CWD → `$HOME` → alongside the installed firewall. Returns the
/// first existing path, or `None` if nothing was found (built-in defaults
/// then apply).
pub fn discover_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = explicit {
        if p.exists() {
            return Some(p.to_path_buf());
        }
    }
    if let Some(p) = env_optional("FIREWALL_CONFIG", &[]) {
        let p = PathBuf::from(p);
        if p.exists() {
            return Some(p);
        }
    }
    let mut search_dirs = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        search_dirs.push(cwd);
    }
    if let Some(home) = dirs::home_dir() {
        search_dirs.push(home);
    }
    if let Some(exe) = std::env::current_exe().ok().and_then(|e| {
        e.parent().map(|p| p.to_path_buf())
    }) {
        search_dirs.push(exe);
    }
    for dir in &search_dirs {
        for name in CONFIG_FILE_NAMES {
            let candidate = dir.join(name);
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }
    None
}

/// Load configuration per the discovery order, degrading to built-in
/// defaults (with a single warning) on any read or parse failure.
/// `FIREWALL_STRICT=1` always wins over whatever the discovered config
/// file says, since it's an operator override applied at invocation time.
pub fn load(explicit: Option<&Path>) -> Config {
    let flags = ProcessFlags::from_env();
    let explicit = explicit
        .map(|p| p.to_path_buf())
        .or_else(|| flags.config_path.clone().map(PathBuf::from));

    let mut config = match discover_config_path(explicit.as_deref()) {
        None => Config::default(),
        Some(path) => match std::fs::read_to_string(&path) {
            Ok(raw) => match Config::from_json(&raw) {
                Ok(cfg) => cfg,
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "failed to parse firewall configuration, using defaults");
                    Config::default()
                }
            },
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "failed to read firewall configuration, using defaults");
                Config::default()
            }
        },
    };

    if flags.strict {
        config.mode = Mode::Strict;
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variable tests must not run concurrently with each other.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn firewall_strict_env_forces_strict_mode() {
        let _g = ENV_LOCK.lock().unwrap();
        std::env::set_var("FIREWALL_STRICT", "1");
        let cfg = load(None);
        std::env::remove_var("FIREWALL_STRICT");
        assert_eq!(cfg.mode, Mode::Strict);
    }

    #[test]
    fn default_config_round_trips_through_json() {
        let cfg = Config::default();
        let json = cfg.to_json_pretty().unwrap();
        let reloaded = Config::from_json(&json).unwrap();
        assert_eq!(cfg.mode, reloaded.mode);
        assert_eq!(
            cfg.filesystem.blocked_read_paths,
            reloaded.filesystem.blocked_read_paths
        );
        assert_eq!(cfg.network.suspicious_ports, reloaded.network.suspicious_ports);
    }

    #[test]
    fn malformed_json_falls_back_to_defaults_via_from_json_error() {
        assert!(Config::from_json("{ not json").is_err());
    }

    #[test]
    fn discover_config_path_prefers_explicit_argument() {
        let dir = tempfile::tempdir().unwrap();
        let explicit = dir.path().join("explicit-config.json");
        std::fs::write(&explicit, "{}").unwrap();
        let found = discover_config_path(Some(&explicit));
        assert_eq!(found, Some(explicit));
    }
}
