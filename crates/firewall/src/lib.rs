//! Runtime security firewall for package-managed script environments.
//!
//! Intercepts filesystem, network, process, and protected-environment
//! operations performed by a host program and its third-party dependencies,
//! evaluates each against a declarative [`Config`](config::Config), and
//! returns an allow/alert/deny [`Verdict`](types::Verdict). See
//! [`Firewall`](firewall::Firewall) for the facade that wires every
//! subsystem together, and [`capability`] for the dependency-injected
//! traits sandboxed code is actually handed.

pub mod audit;
pub mod capability;
pub mod classify;
pub mod config;
pub mod counters;
pub mod engine;
pub mod env_guard;
pub mod error;
pub mod exfil;
pub mod firewall;
pub mod github;
pub mod monitor;
pub mod origin;
pub mod path_validation_ext;
pub mod report;
pub mod selfprotect;
pub mod types;

pub use error::{AccessDenied, FirewallError};
pub use firewall::Firewall;
pub use types::{OpKind, Operation, Reason, Severity, Verdict};
