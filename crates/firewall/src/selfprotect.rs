//! Self-protection: invariants that keep the firewall from being
//! neutralized by the code it sandboxes.
//!
//! The original design relied on stack-trace resolution, module-cache
//! proxies, and prototype-pollution shields — all meaningless once user code
//! only ever sees the firewall through the capability traits in
//! [`crate::capability`]. What survives the re-architecture:
//!
//! - a filename-based guard over the firewall's own output files, gated on
//!   the [origin](crate::origin) tag rather than a resolved stack frame;
//! - a liveness flag no sandboxed code can reach, because it is a private
//!   static behind this module's API;
//! - a config fingerprint that lets the facade detect if its own frozen
//!   configuration was ever replaced out from under it (it can't be, in
//!   safe Rust, but the check costs nothing and documents the invariant).
//!
//! Fortress mode (`FIREWALL_FORTRESS=1`) raises this to maximum strictness
//! for [`FORTRESS_STARTUP_WINDOW`] after process start: during that window
//! even an origin-less write/delete against a firewall-owned file is denied,
//! closing the gap where a dependency loaded before the host program has
//! finished its own initialization could race the tamper guard while no
//! origin tag is yet in scope to pin the blame on.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

use crate::config::Config;

/// Basenames of the firewall's own persisted output. A write or delete
/// targeting one of these from sandboxed (non-`None`-origin) code is
/// tampering, regardless of what the filesystem policy would otherwise
/// allow for that path.
const OWNED_OUTPUT_FILENAMES: &[&str] = &[
    "firewall-audit.jsonl",
    "fs-firewall.log",
    "firewall-report.json",
];

/// Liveness flag: set once at install and never exposed with a public
/// setter, so sandboxed code reachable only through the capability traits
/// has no path to clear it. Fortress mode consults this before honoring any
/// operation that touches the firewall's own files.
static LIVE: AtomicBool = AtomicBool::new(false);

pub fn mark_installed() {
    LIVE.store(true, Ordering::SeqCst);
}

pub fn is_installed() -> bool {
    LIVE.load(Ordering::SeqCst)
}

/// How long after process start fortress mode treats every operation
/// against a firewall-owned file as tampering, regardless of origin.
const FORTRESS_STARTUP_WINDOW: Duration = Duration::from_millis(100);

fn process_start() -> Instant {
    static PROCESS_START: OnceLock<Instant> = OnceLock::new();
    *PROCESS_START.get_or_init(Instant::now)
}

/// Whether the process is still within the fortress-mode startup window.
/// Call [`process_start`] (indirectly, via this function) as early as
/// possible — the window is measured from first access, so a caller that
/// waits to check it shrinks its own protection.
pub fn in_fortress_startup_window() -> bool {
    process_start().elapsed() < FORTRESS_STARTUP_WINDOW
}

/// Whether `path`'s final component names one of the firewall's own output
/// files, by filename rather than by absolute location — a dependency
/// writing `firewall-audit.jsonl` into its own package directory is just as
/// much an impersonation attempt as one overwriting the real file in place.
pub fn is_firewall_owned_file(path: &str) -> bool {
    Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .map(|name| OWNED_OUTPUT_FILENAMES.contains(&name))
        .unwrap_or(false)
}

/// Whether a write/delete against one of the firewall's own output files
/// should be denied as tampering. `origin` is the dependency attributed to
/// the call by the [origin](crate::origin) tag; `None` means the call came
/// from the host program or the firewall's own ambient code, which is
/// ordinarily the only context permitted to touch these files directly (the
/// audit logger, report writer, and log appender all run with no origin tag
/// pushed). `fortress` raises that to maximum strictness: for
/// [`FORTRESS_STARTUP_WINDOW`] after process start, even an origin-less call
/// is denied, since a dependency racing the host program's own startup could
/// otherwise slip through before anything has pushed an origin tag at all.
pub fn denies_self_tamper(path: &str, origin: Option<&str>, fortress: bool) -> bool {
    is_firewall_owned_file(path)
        && (origin.is_some() || (fortress && in_fortress_startup_window()))
}

/// A snapshot hash of the frozen configuration, computed once at load time.
/// `verify` re-serializes the live `Config` and compares; in safe Rust the
/// two can never diverge (there is no interior mutability on `Config`), so
/// a mismatch here would indicate a bug in this module, not an attack — but
/// the check is cheap and keeps the "configuration identity never changes"
/// invariant enforced rather than merely assumed.
pub struct ConfigFingerprint(String);

impl ConfigFingerprint {
    pub fn capture(config: &Config) -> Self {
        Self(hash_config(config))
    }

    pub fn verify(&self, config: &Config) -> bool {
        self.0 == hash_config(config)
    }
}

fn hash_config(config: &Config) -> String {
    let serialized = config.to_json_pretty().unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(serialized.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owned_output_files_recognized_by_basename() {
        assert!(is_firewall_owned_file("/home/u/project/firewall-audit.jsonl"));
        assert!(is_firewall_owned_file(
            "/home/u/project/node_modules/evil-pkg/firewall-audit.jsonl"
        ));
        assert!(!is_firewall_owned_file("/home/u/project/README.md"));
    }

    #[test]
    fn self_tamper_denied_only_for_sandboxed_origin() {
        assert!(denies_self_tamper("firewall-audit.jsonl", Some("evil-pkg"), false));
        assert!(!denies_self_tamper("firewall-audit.jsonl", None, false));
        assert!(!denies_self_tamper("readme.md", Some("evil-pkg"), false));
    }

    #[test]
    fn fortress_mode_denies_origin_less_write_within_startup_window() {
        assert!(denies_self_tamper("firewall-audit.jsonl", None, true));
        assert!(!denies_self_tamper("readme.md", None, true));
    }

    #[test]
    fn fingerprint_matches_unmodified_config() {
        let cfg = Config::default();
        let fp = ConfigFingerprint::capture(&cfg);
        assert!(fp.verify(&cfg));
    }

    #[test]
    fn fingerprint_detects_divergent_config() {
        let cfg = Config::default();
        let fp = ConfigFingerprint::capture(&cfg);
        let mut other = Config::default();
        other.mode = crate::config::Mode::Strict;
        assert!(!fp.verify(&other));
    }

    #[test]
    fn liveness_flag_starts_unset_and_latches_true() {
        // A fresh process has not called mark_installed via this test binary's
        // other tests yet is not guaranteed — only assert the one-way latch.
        mark_installed();
        assert!(is_installed());
    }
}
