//! Error types surfaced to callers of the capability traits.

use thiserror::Error;

use crate::types::{Reason, Severity};

/// The error a wrapped primitive returns instead of performing the
/// underlying operation when the policy engine denies it.
///
/// All deny reasons share this single error type; the distinguishing
/// information lives in the fields, mirroring the audit record.
#[derive(Debug, Error, Clone)]
#[error("Firewall: {reason} - {target}")]
pub struct AccessDenied {
    pub reason: Reason,
    pub severity: Severity,
    pub target: String,
    pub pattern: Option<String>,
    pub origin: Option<String>,
}

impl AccessDenied {
    pub fn new(reason: Reason, severity: Severity, target: impl Into<String>) -> Self {
        Self {
            reason,
            severity,
            target: target.into(),
            pattern: None,
            origin: None,
        }
    }

    pub fn with_pattern(mut self, pattern: Option<String>) -> Self {
        self.pattern = pattern;
        self
    }

    pub fn with_origin(mut self, origin: Option<String>) -> Self {
        self.origin = origin;
        self
    }
}

/// Errors from the ambient layer around the engine: configuration loading,
/// audit I/O setup, and self-protection violations. Distinct from
/// [`AccessDenied`], which is the per-operation policy result.
#[derive(Debug, Error)]
pub enum FirewallError {
    #[error("failed to read configuration file {path}: {source}")]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("failed to initialize audit log at {path}: {source}")]
    AuditInit {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("tamper attempt against firewall-owned file {path} from outside the installation directory")]
    SelfProtectionViolation { path: String },

    #[error("engine not ready: {0}")]
    NotReady(String),
}
