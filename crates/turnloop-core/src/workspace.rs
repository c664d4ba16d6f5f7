//! Workspace path escaping for the session log directory layout
//! (spec §6.1, §8 property 8, §9 open question 3).
//!
//! Grounded in the teacher's `astrid-workspace::escape` module, which deals
//! with a different kind of "escape" (sandbox boundary escapes); the path
//! substitution scheme itself is this crate's own, as specified literally
//! in spec §6.1.

use std::path::{Path, PathBuf};

/// Escape an absolute workspace path into a single path segment suitable
/// for use as a directory name: every path separator is replaced with `-`,
/// and a leading separator becomes a leading `-`.
///
/// This is the scheme spec §6.1 describes literally. It is lossy: a path
/// that already contains a literal `-` adjacent to where a separator would
/// have been is indistinguishable from one that had a separator there. The
/// spec's open question #3 leaves the choice between documenting this
/// collision and adopting lossless hex-escaping to the implementer; this
/// engine documents the collision rather than adopting hex-escaping, matching
/// the teacher's own preference for human-readable project directory names
/// over perfectly reversible ones.
#[must_use]
pub fn escape_workspace_path(path: &Path) -> String {
    let s = path.to_string_lossy();
    s.replace(std::path::MAIN_SEPARATOR, "-")
}

/// Invert [`escape_workspace_path`] for the common case where the original
/// path contained no literal `-` characters. Because the forward mapping is
/// lossy, this is best-effort: it reconstructs *a* path that re-escapes to
/// the same string, which is sufficient for locating the session directory
/// on disk (the directory is looked up by its escaped name, never by
/// unescaping an arbitrary string from an untrusted source).
#[must_use]
pub fn unescape_workspace_path(escaped: &str) -> PathBuf {
    PathBuf::from(escaped.replace('-', &std::path::MAIN_SEPARATOR.to_string()))
}

/// Build the directory a session's log lives under:
/// `<root>/projects/<escaped-workspace>/`.
#[must_use]
pub fn session_dir(turnloop_root: &Path, workspace_root: &Path) -> PathBuf {
    turnloop_root
        .join("projects")
        .join(escape_workspace_path(workspace_root))
}

/// Build the full path to a session's log file:
/// `<root>/projects/<escaped-workspace>/<session-id>.log`.
#[must_use]
pub fn session_log_path(turnloop_root: &Path, workspace_root: &Path, session_id: &str) -> PathBuf {
    session_dir(turnloop_root, workspace_root).join(format!("{session_id}.log"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_replaces_separators_with_dashes() {
        let escaped = escape_workspace_path(Path::new("/home/user/project"));
        assert_eq!(escaped, "-home-user-project");
    }

    #[test]
    fn escape_is_idempotent_under_round_trip_for_separator_free_components() {
        // Property 8 from spec §8: escape then unescape yields the original
        // path, for paths whose components contain no literal '-' adjacent
        // to a separator boundary (the documented collision case excluded).
        let original = Path::new("/home/user/project");
        let escaped = escape_workspace_path(original);
        let unescaped = unescape_workspace_path(&escaped);
        assert_eq!(unescaped, original);
    }

    #[test]
    fn session_log_path_is_nested_under_projects() {
        let root = Path::new("/home/user/.turnloop");
        let workspace = Path::new("/home/user/project");
        let path = session_log_path(root, workspace, "abc123");
        assert_eq!(
            path,
            Path::new("/home/user/.turnloop/projects/-home-user-project/abc123.log")
        );
    }
}
