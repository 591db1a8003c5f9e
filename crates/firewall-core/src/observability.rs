//! Tracing subscriber initialization.
//!
//! Call [`init_tracing`] once at process startup, before the firewall
//! installs its interceptors. Deny and critical audit records still go to
//! the structured audit file regardless of the tracing level (see
//! `firewall::audit`); this module is the destination for the separate
//! `fs-firewall.log` persisted-state file (§6 of the spec this crate
//! implements) — the behavior monitor and interceptors emit `tracing`
//! events, and this subscriber is what actually lands them on disk, in
//! addition to stderr.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

use crate::config::ObservabilityConfig;

/// Initialize the global tracing subscriber, with one fmt layer on stderr
/// and one writing to `log_file` (rotated by nothing — append-only, like
/// the audit log). Safe to call more than once; subsequent calls are
/// no-ops (`try_init` swallows the "already set" error).
///
/// Returns the [`WorkerGuard`] for the file appender; the caller must keep
/// it alive for the process lifetime; dropping it stops the background
/// flush thread and any buffered lines are lost.
pub fn init_tracing(log_file: impl AsRef<Path>) -> WorkerGuard {
    let cfg = ObservabilityConfig::from_env();
    let level = if cfg.quiet {
        "firewall=warn".to_string()
    } else {
        cfg.log_level.clone()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let log_path = log_file.as_ref();
    let directory = log_path.parent().filter(|p| !p.as_os_str().is_empty());
    let filename = log_path
        .file_name()
        .map(|n| n.to_owned())
        .unwrap_or_else(|| std::ffi::OsString::from("fs-firewall.log"));
    let file_appender = tracing_appender::rolling::never(
        directory.unwrap_or_else(|| Path::new(".")),
        filename,
    );
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let _ = if cfg.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false),
            )
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(non_blocking)
                    .with_ansi(false),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false),
            )
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(non_blocking)
                    .with_ansi(false),
            )
            .try_init()
    };

    guard
}
