//! Environment-variable configuration layer.
//!
//! All `std::env::var` reads for process-wide flags are centralized here;
//! the policy configuration itself (allow/deny lists, thresholds) lives in
//! `firewall::config` and is loaded from a JSON file, not from environment
//! variables.
//!
//! - `loader`: `env_or` / `env_optional` / `env_bool` helpers, install-mode
//!   detection.
//! - `schema`: `ProcessFlags`, `ObservabilityConfig`.
//! - `env_keys`: the constants for every variable this crate reads.

pub mod env_keys;
pub mod loader;
pub mod schema;

pub use loader::{env_bool, env_optional, env_or, is_install_mode};
pub use schema::{ObservabilityConfig, ProcessFlags};
