//! GitHub API monitor: a specialized policy lobe layered on top of the
//! network interceptor. Integrated after the full request body has been
//! collected, not on first write, since the decisive fields (repo name,
//! workflow filename, workflow content) only become available once the
//! body is complete.

use base64::Engine as _;

use crate::classify::parse_network_target;
use crate::config::Config;
use crate::types::{Operation, Reason, Severity, Verdict};

const GITHUB_API_HOSTS: &[&str] = &["api.github.com", "raw.githubusercontent.com"];

pub fn is_github_api_host(host: &str) -> bool {
    GITHUB_API_HOSTS.iter().any(|h| host.eq_ignore_ascii_case(h))
}

/// Evaluate a fully-buffered GitHub API request. `op.target` carries the
/// request path (e.g. `/user/repos` or `/repos/o/r/contents/.github/workflows/ci.yml`),
/// `op.method` the HTTP verb, and `op.body` the JSON/text request body.
pub fn check_github_api(config: &Config, op: &Operation) -> Verdict {
    let target = parse_network_target(&op.target);
    if !is_github_api_host(&target.host) && !op.target.starts_with('/') {
        return Verdict::allow(Reason::Allowed);
    }

    let path = if op.target.starts_with('/') {
        op.target.as_str()
    } else {
        target.path.as_str()
    };
    let method = op.method.as_deref().unwrap_or("GET");
    let body = op
        .body
        .as_deref()
        .and_then(|b| std::str::from_utf8(b).ok())
        .unwrap_or("");

    if config.github_api.monitor_repo_creation
        && method.eq_ignore_ascii_case("POST")
        && (path == "/user/repos" || path.starts_with("/orgs/") && path.ends_with("/repos"))
    {
        if let Some(name) = extract_json_string_field(body, "name") {
            if config
                .github_api
                .blocked_repo_names
                .iter()
                .any(|blocked| name.to_lowercase().contains(&blocked.to_lowercase()))
            {
                return Verdict::deny(Reason::RepoCreationBlocked, Severity::Critical).with_pattern(name);
            }
        }
    }

    if config.github_api.monitor_workflow_creation
        && (method.eq_ignore_ascii_case("PUT") || method.eq_ignore_ascii_case("POST"))
        && path.contains("/.github/workflows/")
    {
        let filename = path.rsplit('/').next().unwrap_or("");
        if config
            .github_api
            .blocked_workflow_patterns
            .iter()
            .any(|pattern| regex::Regex::new(pattern).map(|re| re.is_match(filename)).unwrap_or(false))
        {
            return Verdict::deny(Reason::WorkflowCreationBlocked, Severity::Critical).with_pattern(filename.to_string());
        }

        let decoded = extract_json_string_field(body, "content")
            .and_then(|b64| base64::engine::general_purpose::STANDARD.decode(b64.replace('\n', "")).ok())
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .unwrap_or_else(|| body.to_string());

        if workflow_content_is_malicious(&decoded) {
            return Verdict::deny(Reason::WorkflowCreationBlocked, Severity::Critical)
                .with_pattern("self-hosted runner or secrets exfiltration".to_string());
        }
    }

    Verdict::allow(Reason::Allowed)
}

fn workflow_content_is_malicious(content: &str) -> bool {
    let lower = content.to_lowercase();
    if !lower.contains("runs-on:") && !lower.contains("secrets.") {
        return false;
    }
    let self_hosted = lower.contains("runs-on:") && lower.contains("self-hosted");
    let secrets_leak = lower.contains("secrets.")
        && (lower.contains("curl ") || lower.contains("wget ") || lower.contains("echo ") || lower.contains("env"));
    self_hosted || secrets_leak
}

/// Minimal string-field extraction for `"field": "value"` without pulling in
/// a full JSON parse of an arbitrary request body shape; good enough since
/// we only ever need these two well-known top-level string fields.
fn extract_json_string_field(body: &str, field: &str) -> Option<String> {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        return value.get(field)?.as_str().map(|s| s.to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocked_repo_name_denies_case_insensitively() {
        let mut cfg = Config::default();
        cfg.github_api.blocked_repo_names = vec!["shai-hulud".into()];
        let op = Operation::new(crate::types::OpKind::GitHubApi, "/user/repos", None)
            .with_method("POST")
            .with_body(br#"{"name":"SHAI-HULUD-backup"}"#.to_vec());
        let verdict = check_github_api(&cfg, &op);
        assert!(!verdict.allowed);
        assert_eq!(verdict.reason, Reason::RepoCreationBlocked);
    }

    #[test]
    fn workflow_creation_with_self_hosted_runner_is_blocked() {
        let cfg = Config::default();
        let yaml = "on: push\njobs:\n  build:\n    runs-on: self-hosted\n";
        let encoded = base64::engine::general_purpose::STANDARD.encode(yaml);
        let body = serde_json::json!({ "content": encoded }).to_string();
        let op = Operation::new(crate::types::OpKind::GitHubApi, "/repos/o/r/contents/.github/workflows/ci.yml", None)
            .with_method("PUT")
            .with_body(body.into_bytes());
        let verdict = check_github_api(&cfg, &op);
        assert!(!verdict.allowed);
        assert_eq!(verdict.reason, Reason::WorkflowCreationBlocked);
    }

    #[test]
    fn benign_workflow_is_allowed() {
        let cfg = Config::default();
        let yaml = "on: push\njobs:\n  build:\n    runs-on: ubuntu-latest\n    steps:\n      - run: cargo test\n";
        let encoded = base64::engine::general_purpose::STANDARD.encode(yaml);
        let body = serde_json::json!({ "content": encoded }).to_string();
        let op = Operation::new(crate::types::OpKind::GitHubApi, "/repos/o/r/contents/.github/workflows/ci.yml", None)
            .with_method("PUT")
            .with_body(body.into_bytes());
        let verdict = check_github_api(&cfg, &op);
        assert!(verdict.allowed);
    }
}
