//! Process-wide flags and observability settings read from the environment.

use super::env_keys;
use super::loader::{env_bool, env_optional, env_or};

/// The `FIREWALL_*` activation flags read once at process start.
///
/// These are distinct from the JSON policy configuration (`firewall::Config`):
/// they decide *whether* and *how strictly* the firewall installs itself,
/// before any policy file has even been located.
#[derive(Debug, Clone)]
pub struct ProcessFlags {
    /// Master switch. If false, the firewall installs nothing at all.
    pub active: bool,
    /// Maximum-strictness self-protection posture.
    pub fortress: bool,
    /// Allow-list (strict) enforcement mode.
    pub strict: bool,
    /// Install-mode fast path (relaxed checks under `node_modules` etc.)
    pub install_mode: bool,
    /// Disables silent mode; the denial banner is printed to stderr.
    pub verbose: bool,
    /// Set by a re-injecting parent to mark this process as a supervised child.
    pub parent_pid: Option<u32>,
    /// Explicit configuration file path, if set.
    pub config_path: Option<String>,
}

impl ProcessFlags {
    pub fn from_env() -> Self {
        Self {
            active: env_bool(env_keys::FIREWALL_ACTIVE, &[], false),
            fortress: env_bool(env_keys::FIREWALL_FORTRESS, &[], false),
            strict: env_bool(env_keys::FIREWALL_STRICT, &[], false),
            install_mode: super::loader::is_install_mode(),
            verbose: env_bool(env_keys::FIREWALL_VERBOSE, &[], false),
            parent_pid: env_optional(env_keys::FIREWALL_PARENT_PID, &[])
                .and_then(|s| s.parse().ok()),
            config_path: env_optional(env_keys::FIREWALL_CONFIG, &[]),
        }
    }
}

/// Logging / reporting destinations, derived from `ProcessFlags` and the
/// `reporting` section of the policy configuration (callers merge the two;
/// this struct only captures the environment-sourced defaults).
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// When true, only WARN and above are logged and the denial banner is
    /// suppressed (mirrors install-mode / silent behavior).
    pub quiet: bool,
    pub log_level: String,
    pub log_json: bool,
}

impl ObservabilityConfig {
    pub fn from_env() -> Self {
        let verbose = env_bool(env_keys::FIREWALL_VERBOSE, &[], false);
        let install_mode = super::loader::is_install_mode();
        Self {
            quiet: !verbose && install_mode,
            log_level: env_or("FIREWALL_LOG_LEVEL", &[], || "firewall=info".to_string()),
            log_json: env_bool("FIREWALL_LOG_JSON", &[], false),
        }
    }
}
