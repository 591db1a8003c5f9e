//! Environment protector: mediates every read, write, deletion, and
//! enumeration of the process environment.
//!
//! Sandboxed code is handed an `EnvironmentGuard`, never `std::env`
//! directly, so `get`/`set`/`unset`/`keys` all funnel through the same
//! policy check. Enumeration filters protected variables out entirely
//! rather than masking their values, so they can't leak through key
//! listing either.

use crate::engine::PolicyEngine;
use crate::error::AccessDenied;
use crate::types::{OpKind, Operation};

/// Sentinel returned in place of a protected value when the engine is in
/// alert-only mode rather than denying outright.
pub const PROTECTED_SENTINEL: &str = "[firewall:protected]";

pub struct EnvironmentGuard<'a> {
    engine: &'a PolicyEngine,
}

impl<'a> EnvironmentGuard<'a> {
    pub fn new(engine: &'a PolicyEngine) -> Self {
        Self { engine }
    }

    /// Mediated `get`. Denies per the environment resolution order; in
    /// alert-only mode a protected variable resolves to the sentinel instead
    /// of the real value rather than failing the call outright.
    pub fn get(&self, name: &str) -> Result<Option<String>, AccessDenied> {
        let op = Operation::new(OpKind::EnvGet, name, crate::origin::current());
        let verdict = self.engine.check(&op, crate::counters::CounterSnapshot::default());
        if !verdict.allowed {
            if self.engine.config().is_alert_only() {
                return Ok(Some(PROTECTED_SENTINEL.to_string()));
            }
            return Err(AccessDenied::new(verdict.reason, verdict.severity, name)
                .with_origin(op.origin));
        }
        Ok(std::env::var(name).ok())
    }

    pub fn set(&self, name: &str, value: &str) -> Result<(), AccessDenied> {
        let op = Operation::new(OpKind::EnvSet, name, crate::origin::current());
        let verdict = self.engine.check(&op, crate::counters::CounterSnapshot::default());
        if !verdict.allowed {
            return Err(AccessDenied::new(verdict.reason, verdict.severity, name)
                .with_origin(op.origin));
        }
        std::env::set_var(name, value);
        Ok(())
    }

    pub fn unset(&self, name: &str) -> Result<(), AccessDenied> {
        let op = Operation::new(OpKind::EnvDelete, name, crate::origin::current());
        let verdict = self.engine.check(&op, crate::counters::CounterSnapshot::default());
        if !verdict.allowed {
            return Err(AccessDenied::new(verdict.reason, verdict.severity, name)
                .with_origin(op.origin));
        }
        std::env::remove_var(name);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).ok().flatten().is_some()
    }

    /// Mediated own-keys enumeration: protected variables the caller's
    /// origin may not read are filtered out entirely rather than merely
    /// masked, so they don't leak through key enumeration even when the
    /// value itself would be denied.
    pub fn keys(&self) -> Vec<String> {
        let origin = crate::origin::current();
        std::env::vars()
            .map(|(k, _)| k)
            .filter(|name| {
                let op = Operation::new(OpKind::EnvEnum, name.clone(), origin.clone());
                self.engine
                    .check(&op, crate::counters::CounterSnapshot::default())
                    .allowed
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn protected_variable_get_denied_without_trusted_origin() {
        let _g = ENV_LOCK.lock().unwrap();
        std::env::set_var("AWS_SECRET_ACCESS_KEY", "super-secret");
        let mut cfg = Config::default();
        cfg.environment.protected_variables = vec!["AWS_*".into()];
        cfg.environment.allow_trusted_modules = false;
        let engine = PolicyEngine::new(cfg);
        let guard = EnvironmentGuard::new(&engine);
        let _origin = crate::origin::enter("untrusted-pkg");
        assert!(guard.get("AWS_SECRET_ACCESS_KEY").is_err());
        std::env::remove_var("AWS_SECRET_ACCESS_KEY");
    }

    #[test]
    fn protected_variable_absent_from_enumeration() {
        let _g = ENV_LOCK.lock().unwrap();
        std::env::set_var("AWS_SECRET_ACCESS_KEY", "super-secret");
        std::env::set_var("PLAIN_VAR", "fine");
        let mut cfg = Config::default();
        cfg.environment.protected_variables = vec!["AWS_*".into()];
        cfg.environment.allow_trusted_modules = false;
        let engine = PolicyEngine::new(cfg);
        let guard = EnvironmentGuard::new(&engine);
        let _origin = crate::origin::enter("untrusted-pkg");
        let keys = guard.keys();
        assert!(!keys.iter().any(|k| k == "AWS_SECRET_ACCESS_KEY"));
        assert!(keys.iter().any(|k| k == "PLAIN_VAR"));
        std::env::remove_var("AWS_SECRET_ACCESS_KEY");
        std::env::remove_var("PLAIN_VAR");
    }

    #[test]
    fn alert_only_mode_returns_sentinel_instead_of_denying() {
        let _g = ENV_LOCK.lock().unwrap();
        std::env::set_var("AWS_SECRET_ACCESS_KEY", "super-secret");
        let mut cfg = Config::default();
        cfg.mode = crate::config::Mode::AlertOnly;
        cfg.environment.protected_variables = vec!["AWS_*".into()];
        cfg.environment.allow_trusted_modules = false;
        let engine = PolicyEngine::new(cfg);
        let guard = EnvironmentGuard::new(&engine);
        let _origin = crate::origin::enter("untrusted-pkg");
        assert_eq!(guard.get("AWS_SECRET_ACCESS_KEY").unwrap().as_deref(), Some(PROTECTED_SENTINEL));
        std::env::remove_var("AWS_SECRET_ACCESS_KEY");
    }
}
