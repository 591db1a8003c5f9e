//! Glue between the policy engine and the realpath-dual-check rule from the
//! interception fabric: "run the policy check on both the original and the
//! realpath form and take the most restrictive verdict". Kept separate from
//! [`crate::engine`] because the engine itself stays a pure function of a
//! single operation — doubling up the check is the wrapper's job, not the
//! engine's.

use firewall_core::path_validation::best_effort_canonicalize;
use std::path::Path;

use crate::counters::CounterSnapshot;
use crate::engine::PolicyEngine;
use crate::types::{Operation, Verdict};

/// Evaluate `op` against `engine` once for its literal target and, if the
/// target exists and its realpath differs, once more for the realpath —
/// returning whichever verdict is more restrictive (a deny beats an allow;
/// between two denies, the higher severity wins, with the original target's
/// verdict breaking ties so its `reason` — e.g. `AllowedProjectSource` — is
/// preserved when both sides agree).
pub fn combine_original_and_realpath(
    engine: &PolicyEngine,
    op: &Operation,
    counters: CounterSnapshot,
) -> Verdict {
    let original_verdict = engine.check(op, counters);

    let realpath = best_effort_canonicalize(Path::new(&op.target));
    let realpath_str = realpath.display().to_string();
    if realpath_str == op.target {
        return original_verdict;
    }

    let mut realpath_op = op.clone();
    realpath_op.target = realpath_str;
    let realpath_verdict = engine.check(&realpath_op, counters);

    match (original_verdict.allowed, realpath_verdict.allowed) {
        (true, true) => original_verdict,
        (false, true) => original_verdict,
        (true, false) => realpath_verdict,
        (false, false) => {
            if realpath_verdict.severity > original_verdict.severity {
                realpath_verdict
            } else {
                original_verdict
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::types::OpKind;

    #[test]
    fn realpath_blocked_denies_even_when_literal_path_is_clear() {
        let dir = tempfile::tempdir().unwrap();
        let secret_dir = dir.path().join(".ssh");
        std::fs::create_dir(&secret_dir).unwrap();
        let target = secret_dir.join("id_rsa");
        std::fs::write(&target, "fake key").unwrap();
        let link = dir.path().join("innocuous_link");
        #[cfg(unix)]
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let mut cfg = Config::default();
        cfg.filesystem.blocked_read_paths = vec!["/.ssh/".into()];
        let engine = PolicyEngine::new(cfg);

        #[cfg(unix)]
        {
            let op = Operation::new(OpKind::Read, link.to_string_lossy().to_string(), None);
            let verdict = combine_original_and_realpath(&engine, &op, CounterSnapshot::default());
            assert!(!verdict.allowed);
        }
    }
}
