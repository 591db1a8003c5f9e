//! Environment variable key constants.
//!
//! Primary variables use the `FIREWALL_*` prefix. Package-manager-set
//! lifecycle hints (`npm_command`, `npm_lifecycle_event`, ...) are read
//! verbatim since we don't control their naming.

/// Master activation switch. If unset, the firewall installs nothing.
pub const FIREWALL_ACTIVE: &str = "FIREWALL_ACTIVE";

/// Enables the self-protection layer at maximum strictness.
pub const FIREWALL_FORTRESS: &str = "FIREWALL_FORTRESS";

/// Enables strict mode (allow-list enforcement).
pub const FIREWALL_STRICT: &str = "FIREWALL_STRICT";

/// Enables the install-mode fast path.
pub const FIREWALL_INSTALL_MODE: &str = "FIREWALL_INSTALL_MODE";

/// Disables silent mode (prints the user-visible denial banner).
pub const FIREWALL_VERBOSE: &str = "FIREWALL_VERBOSE";

/// Set by a launcher to identify a re-injected child process.
pub const FIREWALL_PARENT_PID: &str = "FIREWALL_PARENT_PID";

/// Explicit configuration file path, takes precedence over discovery.
pub const FIREWALL_CONFIG: &str = "FIREWALL_CONFIG";

/// Package-manager lifecycle hints that also enable install mode.
/// e.g. `npm_command=install`, `npm_lifecycle_event=install`.
pub const INSTALL_MODE_COMMAND_SUFFIXES: &[&str] = &["_command"];
pub const INSTALL_MODE_LIFECYCLE_SUFFIXES: &[&str] = &["_lifecycle_event"];
pub const INSTALL_MODE_COMMAND_VALUES: &[&str] = &["install", "ci"];
pub const INSTALL_MODE_LIFECYCLE_VALUES: &[&str] = &["install"];

pub mod discovery {
    /// Configuration file names checked in CWD, then `$HOME`, then alongside
    /// the installed firewall crate.
    pub const CONFIG_FILE_NAMES: &[&str] = &[".firewall-config.json", "firewall-config.json"];
}

pub mod reporting {
    pub const DEFAULT_AUDIT_FILE: &str = "firewall-audit.jsonl";
    pub const DEFAULT_LOG_FILE: &str = "fs-firewall.log";
    pub const DEFAULT_REPORT_FILE: &str = "firewall-report.json";
}
