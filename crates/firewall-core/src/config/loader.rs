//! Environment variable reading helpers.
//!
//! Centralizes the primary/alias fallback chain so call sites never reach
//! for `std::env::var` directly.

use std::env;

use super::env_keys;

/// Read a primary variable or its aliases, falling back to `default` if unset
/// or empty.
pub fn env_or<F>(primary: &str, aliases: &[&str], default: F) -> String
where
    F: FnOnce() -> String,
{
    env::var(primary)
        .ok()
        .or_else(|| aliases.iter().find_map(|a| env::var(a).ok()))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(default)
}

/// Read a primary variable or its aliases. Empty values are treated as unset.
pub fn env_optional(primary: &str, aliases: &[&str]) -> Option<String> {
    env::var(primary)
        .ok()
        .or_else(|| aliases.iter().find_map(|a| env::var(a).ok()))
        .and_then(|s| {
            let s = s.trim().to_string();
            if s.is_empty() {
                None
            } else {
                Some(s)
            }
        })
}

/// Parse a boolean-ish environment variable: `1`/`true`/`yes` is true,
/// `0`/`false`/`no`/`off` is false, anything else falls back to `default`.
pub fn env_bool(primary: &str, aliases: &[&str], default: bool) -> bool {
    let v = env::var(primary)
        .ok()
        .or_else(|| aliases.iter().find_map(|a| env::var(a).ok()));
    match v.as_deref() {
        Some(s) => !matches!(
            s.trim().to_lowercase().as_str(),
            "0" | "false" | "no" | "off" | ""
        ),
        None => default,
    }
}

/// Whether any environment variable whose name ends with one of `suffixes`
/// holds one of `values`. Used to detect package-manager lifecycle hints
/// such as `npm_command=install` without hard-coding the package manager.
fn any_env_suffix_matches(suffixes: &[&str], values: &[&str]) -> bool {
    env::vars().any(|(k, v)| {
        suffixes.iter().any(|s| k.ends_with(s))
            && values.iter().any(|want| v.eq_ignore_ascii_case(want))
    })
}

/// Whether install mode should be enabled: `FIREWALL_INSTALL_MODE=1`, or a
/// package-manager-set `*_command=install|ci` / `*_lifecycle_event=install`.
pub fn is_install_mode() -> bool {
    env_bool(env_keys::FIREWALL_INSTALL_MODE, &[], false)
        || any_env_suffix_matches(
            env_keys::INSTALL_MODE_COMMAND_SUFFIXES,
            env_keys::INSTALL_MODE_COMMAND_VALUES,
        )
        || any_env_suffix_matches(
            env_keys::INSTALL_MODE_LIFECYCLE_SUFFIXES,
            env_keys::INSTALL_MODE_LIFECYCLE_VALUES,
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variable tests must not run concurrently with each other.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn env_bool_defaults_when_unset() {
        let _g = ENV_LOCK.lock().unwrap();
        env::remove_var("FIREWALL_TEST_BOOL");
        assert!(env_bool("FIREWALL_TEST_BOOL", &[], true));
        assert!(!env_bool("FIREWALL_TEST_BOOL", &[], false));
    }

    #[test]
    fn env_bool_parses_falsey_values() {
        let _g = ENV_LOCK.lock().unwrap();
        for v in ["0", "false", "no", "off"] {
            env::set_var("FIREWALL_TEST_BOOL", v);
            assert!(!env_bool("FIREWALL_TEST_BOOL", &[], true), "value {v}");
        }
        env::remove_var("FIREWALL_TEST_BOOL");
    }

    #[test]
    fn env_or_falls_back_to_alias() {
        let _g = ENV_LOCK.lock().unwrap();
        env::remove_var("FIREWALL_PRIMARY");
        env::set_var("FIREWALL_ALIAS", "value-from-alias");
        assert_eq!(
            env_or("FIREWALL_PRIMARY", &["FIREWALL_ALIAS"], || "default".to_string()),
            "value-from-alias"
        );
        env::remove_var("FIREWALL_ALIAS");
    }
}
