//! Pure predicates over paths, URLs and content previews.
//!
//! Nothing here touches configuration or counters; every function is a
//! total, side-effect-free function of its arguments so the policy engine
//! can treat this module as a cheap library call.

use std::net::IpAddr;
use std::path::Path;

use firewall_core::path_validation::matches_path_prefix;

/// Source file extensions exempt from behavioral-monitor counting when read
/// from within the project tree.
const SOURCE_EXTENSIONS: &[&str] = &[
    ".rs", ".ts", ".tsx", ".js", ".jsx", ".py", ".go", ".java", ".rb", ".c", ".h", ".cpp", ".hpp",
    ".json", ".toml", ".yaml", ".yml", ".md",
];

/// Directory name fragments recognized as package-manager caches or
/// transient compilation output, eligible for the install-mode fast path.
const INSTALL_FAST_PATH_FRAGMENTS: &[&str] = &[
    "/node_modules/",
    "/.cargo/registry/",
    "/.npm/",
    "/.cache/pip/",
    "/target/",
    "/.yarn/cache/",
    "/vendor/",
];

const LOCKFILE_MANIFEST_NAMES: &[&str] = &[
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "Cargo.lock",
    "package.json",
    "Cargo.toml",
    "requirements.txt",
    "poetry.lock",
];

/// Filename fragments identifying sensitive credential/key stores, used by
/// both the filesystem policy and the exfiltration detector's recent-reads
/// tracking.
const SENSITIVE_READ_FRAGMENTS: &[&str] = &[
    "/.ssh/", "/.aws/", "/.gnupg/", "/.kube/", ".env", "id_rsa", "id_ed25519", "id_ecdsa",
    ".pem", ".pfx", "credentials",
];

/// Executable file extensions; a write/create targeting one of these is
/// checked against the blocked-extension rule regardless of configuration.
pub fn is_blocked_extension(path: &str, blocked_extensions: &[String]) -> Option<String> {
    let lower = path.to_lowercase();
    blocked_extensions
        .iter()
        .find(|ext| lower.ends_with(ext.to_lowercase().as_str()))
        .cloned()
}

/// Whether `content` begins with a shebang line (`#!`), indicating the file
/// being written is intended to be directly executable.
pub fn has_shebang(content: &[u8]) -> bool {
    content.starts_with(b"#!")
}

/// Whether an existing file has any executable permission bit set.
#[cfg(unix)]
pub fn is_executable_on_disk(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
pub fn is_executable_on_disk(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("exe") | Some("bat") | Some("cmd")
    )
}

/// Whether `path` falls under a package-manager cache or build-output
/// directory eligible for the install-mode fast path or the approved
/// build/cache-directory write exemption.
pub fn is_install_fast_path(path: &str) -> bool {
    let normalized = path.replace('\\', "/");
    INSTALL_FAST_PATH_FRAGMENTS
        .iter()
        .any(|frag| normalized.contains(frag))
}

/// Whether `path`'s final component is a recognized lockfile or manifest.
pub fn is_lockfile_or_manifest(path: &str) -> bool {
    let name = Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");
    LOCKFILE_MANIFEST_NAMES.contains(&name)
}

/// Whether `path`'s final component looks like a project configuration file
/// (`.env`, `.env.local`, ...).
pub fn is_dotenv_file(path: &str) -> bool {
    Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n == ".env" || n.starts_with(".env."))
        .unwrap_or(false)
}

/// Whether `path` has a recognized source-code extension.
pub fn is_source_file(path: &str) -> bool {
    let lower = path.to_lowercase();
    SOURCE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Whether `path` matches any entry of `patterns` (the blocked read/write
/// path lists), checked trailing-slash-insensitively against both the
/// supplied path and its resolved absolute form.
pub fn matches_any_path_pattern(path: &str, patterns: &[String]) -> Option<String> {
    patterns
        .iter()
        .find(|p| matches_path_prefix(path, p))
        .cloned()
}

/// Whether `path` is recognizable as a sensitive credential/key file for
/// exfiltration-detector tracking purposes.
pub fn is_sensitive_read_target(path: &str) -> bool {
    let lower = path.to_lowercase();
    SENSITIVE_READ_FRAGMENTS
        .iter()
        .any(|frag| lower.contains(&frag.to_lowercase()))
}

/// Parsed network target: either a conventional URL-ish host/port/path, a
/// `socket://host:port` raw-socket pseudo-URL, or a `dns://name` lookup.
#[derive(Debug, Clone)]
pub struct NetworkTarget {
    pub host: String,
    pub port: Option<u16>,
    pub path: String,
    pub method: Option<String>,
    pub is_dns_only: bool,
}

/// Parse a network operation's `target` string into host/port/path parts.
/// Accepts `http(s)://host[:port]/path`, `socket://host:port`, and
/// `dns://name`.
pub fn parse_network_target(target: &str) -> NetworkTarget {
    if let Some(rest) = target.strip_prefix("dns://") {
        return NetworkTarget {
            host: rest.to_string(),
            port: None,
            path: String::new(),
            method: None,
            is_dns_only: true,
        };
    }
    let rest = target
        .strip_prefix("socket://")
        .or_else(|| target.strip_prefix("https://"))
        .or_else(|| target.strip_prefix("http://"))
        .unwrap_or(target);
    let (authority, path) = match rest.find('/') {
        Some(idx) => (&rest[..idx], rest[idx..].to_string()),
        None => (rest, String::new()),
    };
    let (host, port) = strip_port_suffix(authority);
    NetworkTarget {
        host,
        port,
        path,
        method: None,
        is_dns_only: false,
    }
}

/// Split `host:port` into its parts; a bracketed IPv6 literal is treated as
/// opaque until the bracket closes.
pub fn strip_port_suffix(authority: &str) -> (String, Option<u16>) {
    if authority.starts_with('[') {
        if let Some(end) = authority.find(']') {
            let host = authority[1..end].to_string();
            let port = authority[end + 1..]
                .strip_prefix(':')
                .and_then(|p| p.parse().ok());
            return (host, port);
        }
    }
    match authority.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) && !port.is_empty() => {
            (host.to_string(), port.parse().ok())
        }
        _ => (authority.to_string(), None),
    }
}

/// Whether `host` denotes the local machine: loopback addresses,
/// `0.0.0.0`, `localhost`, or the literal `unknown`.
pub fn is_loopback_host(host: &str) -> bool {
    if host.eq_ignore_ascii_case("localhost") || host == "0.0.0.0" || host == "unknown" {
        return true;
    }
    match host.parse::<IpAddr>() {
        Ok(ip) => ip.is_loopback(),
        Err(_) => false,
    }
}

/// RFC1918 / link-local / IPv6 ULA classification.
pub fn is_private_host(host: &str) -> bool {
    match host.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => v4.is_private() || v4.is_link_local(),
        Ok(IpAddr::V6(v6)) => {
            // fc00::/7
            let seg = v6.segments()[0];
            (seg & 0xfe00) == 0xfc00 || v6.is_unique_local()
        }
        Err(_) => false,
    }
}

/// Wildcard/exact/subdomain domain match used for both `blocked_domains`
/// (substring) and `allowed_domains` (exact/subdomain/leading-wildcard).
///
/// `pattern` starting with `*.` matches `host` being exactly the remainder
/// or a subdomain of it; otherwise an exact match or a strict subdomain
/// match is required (e.g. pattern `example.com` matches `api.example.com`
/// but not `evil-example.com`).
pub fn domain_matches_allowlist(host: &str, pattern: &str) -> bool {
    let host = host.to_lowercase();
    let pattern = pattern.to_lowercase();
    if let Some(suffix) = pattern.strip_prefix("*.") {
        return host == suffix || host.ends_with(&format!(".{suffix}"));
    }
    host == pattern || host.ends_with(&format!(".{pattern}"))
}

/// Substring match used for `blocked_domains`, which is intentionally more
/// permissive than the allow-list matcher: any occurrence of the blocked
/// string anywhere in the host is disqualifying.
pub fn domain_matches_blocklist(host: &str, pattern: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    host.to_lowercase().contains(&pattern.to_lowercase())
}

/// Whether the environment variable `name` matches a `protected_variables`
/// glob entry, case-insensitively. Supports a single trailing or leading
/// `*` wildcard, which covers every pattern the policy configuration uses
/// (`AWS_*`, `*_TOKEN`, `*_SECRET`, ...).
pub fn env_name_matches_glob(name: &str, glob: &str) -> bool {
    let name = name.to_ascii_uppercase();
    let glob = glob.to_ascii_uppercase();
    if glob == "*" {
        return true;
    }
    if let Some(prefix) = glob.strip_suffix('*') {
        return name.starts_with(prefix);
    }
    if let Some(suffix) = glob.strip_prefix('*') {
        return name.ends_with(suffix);
    }
    name == glob
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocked_extension_is_case_insensitive() {
        assert_eq!(
            is_blocked_extension("payload.SH", &[".sh".into()]),
            Some(".sh".into())
        );
        assert!(is_blocked_extension("readme.md", &[".sh".into()]).is_none());
    }

    #[test]
    fn shebang_detection() {
        assert!(has_shebang(b"#!/bin/sh\necho hi"));
        assert!(!has_shebang(b"plain text"));
    }

    #[test]
    fn install_fast_path_recognizes_node_modules_and_cargo_registry() {
        assert!(is_install_fast_path("/home/u/project/node_modules/left-pad/index.js"));
        assert!(is_install_fast_path("/home/u/.cargo/registry/src/foo"));
        assert!(!is_install_fast_path("/home/u/.ssh/id_rsa"));
    }

    #[test]
    fn sensitive_read_target_matches_ssh_and_env() {
        assert!(is_sensitive_read_target("/home/u/.ssh/id_rsa"));
        assert!(is_sensitive_read_target("/home/u/project/.env"));
        assert!(!is_sensitive_read_target("/home/u/project/src/main.rs"));
    }

    #[test]
    fn parse_network_target_handles_socket_and_dns_pseudo_urls() {
        let t = parse_network_target("socket://192.168.1.5:4444");
        assert_eq!(t.host, "192.168.1.5");
        assert_eq!(t.port, Some(4444));

        let t = parse_network_target("dns://evil.example.com");
        assert!(t.is_dns_only);
        assert_eq!(t.host, "evil.example.com");

        let t = parse_network_target("https://api.example.com/user/repos");
        assert_eq!(t.host, "api.example.com");
        assert_eq!(t.path, "/user/repos");
    }

    #[test]
    fn private_and_loopback_classification() {
        assert!(is_loopback_host("127.0.0.1"));
        assert!(is_loopback_host("localhost"));
        assert!(is_private_host("10.0.0.5"));
        assert!(is_private_host("172.16.0.1"));
        assert!(is_private_host("192.168.1.1"));
        assert!(is_private_host("169.254.1.1"));
        assert!(is_private_host("fc00::1"));
        assert!(!is_private_host("8.8.8.8"));
    }

    #[test]
    fn allowlist_domain_matching_requires_subdomain_boundary() {
        assert!(domain_matches_allowlist("api.example.com", "example.com"));
        assert!(domain_matches_allowlist("example.com", "example.com"));
        assert!(!domain_matches_allowlist("evil-example.com", "example.com"));
        assert!(domain_matches_allowlist("sub.example.com", "*.example.com"));
    }

    #[test]
    fn blocklist_domain_matching_is_substring() {
        assert!(domain_matches_blocklist("www.pastebin.com", "pastebin.com"));
        assert!(domain_matches_blocklist("anything.at.all", "*"));
    }

    #[test]
    fn env_glob_matches_prefix_and_suffix_wildcards() {
        assert!(env_name_matches_glob("AWS_SECRET_ACCESS_KEY", "AWS_*"));
        assert!(env_name_matches_glob("npm_token", "*_TOKEN"));
        assert!(!env_name_matches_glob("PATH", "AWS_*"));
    }
}
