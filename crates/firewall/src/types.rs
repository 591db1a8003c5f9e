//! Core verdict and severity types shared by every subsystem.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity levels for a verdict or suspicious-event record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        write!(f, "{s}")
    }
}

/// The kind of operation being evaluated. Carried on every `Operation` and
/// recorded verbatim in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    Read,
    Write,
    Create,
    Delete,
    Chdir,
    Symlink,
    NetConnect,
    NetSend,
    DnsQuery,
    Spawn,
    EnvGet,
    EnvSet,
    EnvDelete,
    EnvEnum,
    GitHubApi,
}

impl OpKind {
    /// Whether this kind denotes a write-shaped operation for the purposes
    /// of executable-extension / shebang / build-cache checks.
    pub fn is_write_like(self) -> bool {
        matches!(
            self,
            OpKind::Write | OpKind::Create | OpKind::Delete | OpKind::Symlink
        )
    }
}

/// A single operation submitted to the policy engine.
///
/// `target` is a path for filesystem operations, a URL (or `socket://host:port`
/// / `dns://name` pseudo-URL) for network operations, a command line for
/// `Spawn`, or an environment variable name for `Env*` operations.
#[derive(Debug, Clone)]
pub struct Operation {
    pub kind: OpKind,
    pub target: String,
    pub origin: Option<String>,
    /// First bytes of content being written, used for shebang / executable
    /// detection. Capped at 100 bytes by callers.
    pub content_preview: Option<Vec<u8>>,
    /// Full request/write body, when the check needs more than the shebang
    /// preview: outbound payload scanning and GitHub API body parsing.
    pub body: Option<Vec<u8>>,
    /// HTTP method, for network operations where request semantics matter
    /// (`POST`/`PUT` vs `GET`).
    pub method: Option<String>,
}

impl Operation {
    pub fn new(kind: OpKind, target: impl Into<String>, origin: Option<String>) -> Self {
        Self {
            kind,
            target: target.into(),
            origin,
            content_preview: None,
            body: None,
            method: None,
        }
    }

    pub fn with_content_preview(mut self, preview: &[u8]) -> Self {
        let cap = preview.len().min(100);
        self.content_preview = Some(preview[..cap].to_vec());
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }
}

/// Why a verdict came out the way it did. Maps 1:1 to the `reason` field of
/// the audit record and drives the user-visible remediation hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    Allowed,
    AllowedException,
    AllowedTrusted,
    AllowedInstallMode,
    AllowedProjectConfig,
    AllowedProjectSource,
    BlockedRead,
    BlockedWrite,
    BlockedExtension,
    ExecutableFileBlocked,
    StrictModeNotAllowed,
    FirewallOutputTampering,
    HardLimitExceeded,
    ThresholdExceeded,
    BlockedDomain,
    NotInAllowedDomains,
    SuspiciousPort,
    CredentialExfiltration,
    TimingCorrelation,
    InstallPhaseExternalNetwork,
    RepoCreationBlocked,
    WorkflowCreationBlocked,
    ShellMetacharactersDetected,
    WhitelistedCommandWithShellInjection,
    NotInAllowedCommands,
    BlockedCommand,
    ProtectedVariable,
    StrictModeNoContext,
    UntrustedNoContext,
    FirewallNotReady,
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// The policy engine's decision for a single operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub allowed: bool,
    pub reason: Reason,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
}

impl Verdict {
    pub fn allow(reason: Reason) -> Self {
        Self {
            allowed: true,
            reason,
            severity: Severity::Info,
            pattern: None,
            limit: None,
            current: None,
            exception: None,
            extension: None,
        }
    }

    pub fn allow_exception(name: impl Into<String>) -> Self {
        Self {
            exception: Some(name.into()),
            ..Self::allow(Reason::AllowedException)
        }
    }

    pub fn deny(reason: Reason, severity: Severity) -> Self {
        Self {
            allowed: false,
            reason,
            severity,
            pattern: None,
            limit: None,
            current: None,
            exception: None,
            extension: None,
        }
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn with_limit(mut self, limit: u64, current: u64) -> Self {
        self.limit = Some(limit);
        self.current = Some(current);
        self
    }

    pub fn with_extension(mut self, ext: impl Into<String>) -> Self {
        self.extension = Some(ext.into());
        self
    }
}
