//! File Access Tracker — the read-before-write discipline (spec §4.5).
//!
//! Write/edit tools consult this before touching a file on disk: the
//! invocation must refuse with [`ToolError::RequiresRead`] if the file
//! exists but hasn't been read in this session, and with
//! [`ToolError::ExternalModification`] if the on-disk mtime has drifted
//! from the recorded read beyond a grace window. This prevents the
//! assistant from silently overwriting content a human edited out from
//! under it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::{Duration, SystemTime};

use turnloop_core::SessionId;

use crate::error::ToolError;

/// Grace window after a recorded read within which on-disk mtime drift is
/// tolerated (clock and filesystem timestamp granularity slop).
pub const GRACE_WINDOW: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
struct AccessRecord {
    session_id: SessionId,
    mtime: SystemTime,
}

/// Tracks, per file path, which session last read it and at what mtime.
pub struct FileAccessTracker {
    records: RwLock<HashMap<PathBuf, AccessRecord>>,
}

impl FileAccessTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Record that `session_id` just read `path`, capturing its current
    /// on-disk mtime. Called by read tools after a successful read, and by
    /// write/edit tools after a successful write (the tool now knows the
    /// file's exact contents, which is equivalent to having read it).
    ///
    /// # Errors
    ///
    /// Returns an I/O error if `path`'s metadata can't be read.
    pub fn record_read(&self, path: &Path, session_id: SessionId) -> std::io::Result<()> {
        let mtime = std::fs::metadata(path)?.modified()?;
        let mut records = self.records.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        records.insert(path.to_path_buf(), AccessRecord { session_id, mtime });
        Ok(())
    }

    /// Check whether `session_id` may write to `path`.
    ///
    /// A file that doesn't exist yet needs no prior read. An existing file
    /// must have been read by this exact session, and its on-disk mtime
    /// must not have drifted past the recorded read beyond
    /// [`GRACE_WINDOW`].
    pub fn check_before_write(&self, path: &Path, session_id: &SessionId) -> Result<(), ToolError> {
        if !path.exists() {
            return Ok(());
        }

        let records = self.records.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        let Some(record) = records.get(path) else {
            return Err(ToolError::RequiresRead(path.display().to_string()));
        };

        if &record.session_id != session_id {
            return Err(ToolError::RequiresRead(path.display().to_string()));
        }

        let current_mtime = std::fs::metadata(path)
            .and_then(std::fs::Metadata::modified)
            .map_err(ToolError::Io)?;

        if let Ok(drift) = current_mtime.duration_since(record.mtime) {
            if drift > GRACE_WINDOW {
                return Err(ToolError::ExternalModification(path.display().to_string()));
            }
        }

        Ok(())
    }
}

impl Default for FileAccessTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::FileTime;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn session(s: &str) -> SessionId {
        SessionId::from_existing(s)
    }

    #[test]
    fn new_file_needs_no_prior_read() {
        let tracker = FileAccessTracker::new();
        let result = tracker.check_before_write(Path::new("/tmp/turnloop_never_created_xyz"), &session("s1"));
        assert!(result.is_ok());
    }

    #[test]
    fn existing_unread_file_requires_read() {
        let tracker = FileAccessTracker::new();
        let f = NamedTempFile::new().unwrap();
        let result = tracker.check_before_write(f.path(), &session("s1"));
        assert!(matches!(result, Err(ToolError::RequiresRead(_))));
    }

    #[test]
    fn read_then_write_is_allowed() {
        let tracker = FileAccessTracker::new();
        let f = NamedTempFile::new().unwrap();
        tracker.record_read(f.path(), session("s1")).unwrap();
        let result = tracker.check_before_write(f.path(), &session("s1"));
        assert!(result.is_ok());
    }

    #[test]
    fn read_by_other_session_does_not_satisfy_requirement() {
        let tracker = FileAccessTracker::new();
        let f = NamedTempFile::new().unwrap();
        tracker.record_read(f.path(), session("s1")).unwrap();
        let result = tracker.check_before_write(f.path(), &session("s2"));
        assert!(matches!(result, Err(ToolError::RequiresRead(_))));
    }

    #[test]
    fn external_modification_after_read_is_detected() {
        let tracker = FileAccessTracker::new();
        let mut f = NamedTempFile::new().unwrap();
        tracker.record_read(f.path(), session("s1")).unwrap();

        // Simulate an external edit landing well outside the grace window.
        writeln!(f, "human edited this").unwrap();
        let future = FileTime::from_system_time(SystemTime::now() + Duration::from_secs(10));
        filetime::set_file_mtime(f.path(), future).unwrap();

        let result = tracker.check_before_write(f.path(), &session("s1"));
        assert!(matches!(result, Err(ToolError::ExternalModification(_))));
    }
}
