//! Path containment helpers shared by the classifier and policy engine.

use std::path::{Path, PathBuf};

/// Canonicalize `path` if it exists, otherwise return it lexically cleaned.
/// Non-existent targets (about to be created) can't be canonicalized, but
/// policy checks still need a stable form to compare against.
pub fn best_effort_canonicalize(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// Whether `path` is contained in `root` or one of `root`'s first
/// `max_ancestors` ancestor directories.
///
/// Used for the ".env in CWD or up to two parent directories" and "source
/// file in CWD or a recognized build directory" allowances — project-local
/// reads are so much more frequent than anything policy cares about that
/// checking a handful of ancestors is cheap and keeps the fast path simple.
pub fn is_within_root_or_ancestors(path: &Path, root: &Path, max_ancestors: usize) -> bool {
    let mut candidate = Some(root.to_path_buf());
    for _ in 0..=max_ancestors {
        match candidate {
            Some(dir) => {
                if path.starts_with(&dir) {
                    return true;
                }
                candidate = dir.parent().map(|p| p.to_path_buf());
            }
            None => break,
        }
    }
    false
}

/// Trailing-slash-insensitive prefix match: `/path` matches both the exact
/// path and anything under `/path/`.
pub fn matches_path_prefix(candidate: &str, pattern: &str) -> bool {
    let pattern = pattern.trim_end_matches('/');
    if pattern.is_empty() {
        return false;
    }
    candidate == pattern
        || candidate.starts_with(&format!("{pattern}/"))
        || candidate.contains(&format!("{pattern}/"))
        || candidate.ends_with(pattern)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ancestors_within_two_levels_match() {
        let root = PathBuf::from("/home/user/project/sub");
        assert!(is_within_root_or_ancestors(
            Path::new("/home/user/project/.env"),
            &root,
            2
        ));
        assert!(is_within_root_or_ancestors(
            Path::new("/home/user/.env"),
            &root,
            2
        ));
        assert!(!is_within_root_or_ancestors(
            Path::new("/home/.env"),
            &root,
            2
        ));
    }

    #[test]
    fn trailing_slash_insensitive_prefix_match() {
        assert!(matches_path_prefix("/home/user/.ssh", "/.ssh/"));
        assert!(matches_path_prefix("/home/user/.ssh/id_rsa", "/.ssh"));
        assert!(!matches_path_prefix("/home/user/.sshhh", "/.ssh"));
    }
}
