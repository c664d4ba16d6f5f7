//! The Session Log Store (C1, spec §4.1, §6.1).
//!
//! A per-session append-only JSONL file. The store owns id/parent-chain
//! assignment so callers never have to coordinate monotonic ids themselves,
//! the same way the teacher's `AuditLog::append` owns its own hash-chain
//! bookkeeping rather than trusting callers to supply a consistent link.

use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use serde_json::Value;
use tokio::fs;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::warn;

use crate::event::{CompactMetadata, Event, EventKind};
use crate::ids::SessionId;
use crate::workspace::session_log_path;

/// The fields a caller supplies when appending; the store fills in
/// `id`, `parent_id`, `session_id`, `timestamp`, `schema_version`, and
/// `workspace_root` itself.
#[derive(Debug, Clone)]
pub struct EventDraft {
    /// Event kind.
    pub kind: EventKind,
    /// Optional refinement of `kind`.
    pub subkind: Option<String>,
    /// Kind-specific payload.
    pub payload: Value,
    /// Compaction metadata, if this is a compaction boundary/summary event.
    pub compact_metadata: Option<CompactMetadata>,
    /// Explicit logical parent override (used across compaction boundaries).
    /// When `None`, the logical parent defaults to the chain parent.
    pub logical_parent_id: Option<u64>,
}

impl EventDraft {
    /// Start a draft for the given kind with an empty JSON object payload.
    #[must_use]
    pub fn new(kind: EventKind, payload: Value) -> Self {
        Self {
            kind,
            subkind: None,
            payload,
            compact_metadata: None,
            logical_parent_id: None,
        }
    }

    /// Attach a subkind.
    #[must_use]
    pub fn with_subkind(mut self, subkind: impl Into<String>) -> Self {
        self.subkind = Some(subkind.into());
        self
    }

    /// Attach compaction metadata.
    #[must_use]
    pub fn with_compact_metadata(mut self, metadata: CompactMetadata) -> Self {
        self.compact_metadata = Some(metadata);
        self
    }

    /// Attach an explicit logical parent.
    #[must_use]
    pub fn with_logical_parent(mut self, logical_parent_id: u64) -> Self {
        self.logical_parent_id = Some(logical_parent_id);
        self
    }
}

/// Existence/size statistics for a session log file (spec §4.1 `stats()`).
#[derive(Debug, Clone, Copy, Default)]
pub struct LogStats {
    /// Whether the file exists on disk.
    pub exists: bool,
    /// Size in bytes.
    pub size_bytes: u64,
    /// Number of well-formed lines (a trailing partial line is not counted).
    pub line_count: usize,
}

/// The append-only per-session log (spec §3 "Session", §4.1).
pub struct SessionLogStore {
    path: PathBuf,
    session_id: SessionId,
    workspace_root: PathBuf,
    vcs_branch: Option<String>,
    /// Last successfully written event id, if any. Doubles as the mutex
    /// serializing writers — spec §5 guarantees a single writer per session
    /// at the `SessionManager` level, but holding this lock across the
    /// whole append keeps the store itself safe if that guarantee is ever
    /// relaxed (e.g. in tests that spawn concurrent appends).
    last_id: Mutex<Option<u64>>,
    /// Set once an append has failed; surfaced to `SessionManager` so it can
    /// warn on resume (spec §4.1 "log-degraded").
    degraded: AtomicBool,
}

impl SessionLogStore {
    /// Open (creating if necessary) the log file for `session_id` under
    /// `turnloop_root/projects/<escaped-workspace>/`.
    ///
    /// If the file already exists, replays it to recover the last assigned
    /// id so newly appended events continue the chain.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created or the
    /// existing file cannot be read.
    pub async fn open(
        turnloop_root: &Path,
        workspace_root: &Path,
        session_id: SessionId,
    ) -> io::Result<Self> {
        let path = session_log_path(turnloop_root, workspace_root, session_id.as_str());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let store = Self {
            path,
            session_id,
            workspace_root: workspace_root.to_path_buf(),
            vcs_branch: None,
            last_id: Mutex::new(None),
            degraded: AtomicBool::new(false),
        };

        let existing = store.read_all().await.unwrap_or_else(|e| {
            warn!(error = %e, "failed to replay existing session log; starting fresh");
            Vec::new()
        });
        if let Some(last) = existing.last() {
            *store.last_id.lock().unwrap_or_else(std::sync::PoisonError::into_inner) =
                Some(last.id);
        }

        Ok(store)
    }

    /// Attach the VCS branch stamped onto subsequently appended events.
    #[must_use]
    pub fn with_vcs_branch(mut self, branch: impl Into<String>) -> Self {
        self.vcs_branch = Some(branch.into());
        self
    }

    /// Path to the underlying log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a prior append failed (spec §4.1: mark session "log-degraded").
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    /// Append a new event, assigning id and parent chain automatically.
    ///
    /// Writes a single line with one `write` call so the line either lands
    /// whole or not at all under normal OS append semantics (spec §4.1).
    ///
    /// # Errors
    ///
    /// Returns an error on disk-full or permission-denied; does not retry.
    /// On failure, marks the store degraded but the caller's turn must
    /// continue (spec §4.1, §7).
    pub async fn append(&self, draft: EventDraft) -> io::Result<Event> {
        let result = self.append_inner(draft).await;
        if result.is_err() {
            self.degraded.store(true, Ordering::Relaxed);
        }
        result
    }

    async fn append_inner(&self, draft: EventDraft) -> io::Result<Event> {
        let mut guard = self
            .last_id
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let parent_id = *guard;
        let next_id = parent_id.map_or(1, |p| p.saturating_add(1));

        let mut event = Event::new(
            next_id,
            parent_id,
            self.session_id.clone(),
            self.workspace_root.to_string_lossy().to_string(),
            draft.kind,
            draft.payload,
        );
        if let Some(subkind) = draft.subkind {
            event = event.with_subkind(subkind);
        }
        if let Some(metadata) = draft.compact_metadata {
            event = event.with_compact_metadata(metadata);
        }
        event.logical_parent_id = draft.logical_parent_id.or(parent_id);
        if let Some(branch) = &self.vcs_branch {
            event = event.with_vcs_branch(branch.clone());
        }

        let line = event
            .to_line()
            .map_err(|e| io::Error::new(ErrorKind::InvalidData, e))?;

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        *guard = Some(next_id);
        Ok(event)
    }

    /// Read every well-formed event in file order.
    ///
    /// Malformed lines (including a truncated trailing line left by a
    /// crash) are skipped with a warning rather than aborting the read
    /// (spec §4.1, §8 property 10).
    ///
    /// # Errors
    ///
    /// Returns an error only if the file exists but cannot be opened for
    /// reading; a missing file yields an empty vector.
    pub async fn read_all(&self) -> io::Result<Vec<Event>> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut events = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Event>(line) {
                Ok(event) => events.push(event),
                Err(e) => {
                    warn!(
                        path = %self.path.display(),
                        line = line_no + 1,
                        error = %e,
                        "skipping malformed session log line"
                    );
                },
            }
        }
        Ok(events)
    }

    /// Asynchronously walk the file line by line, invoking `callback` for
    /// each well-formed event. Intended for large files where `read_all`'s
    /// full materialization is wasteful.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub async fn stream<F: FnMut(Event)>(&self, mut callback: F) -> io::Result<()> {
        let file = match fs::File::open(&self.path).await {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };
        let mut lines = BufReader::new(file).lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Event>(&line) {
                Ok(event) => callback(event),
                Err(e) => warn!(error = %e, "skipping malformed session log line"),
            }
        }
        Ok(())
    }

    /// The last `n` well-formed events.
    ///
    /// # Errors
    ///
    /// Propagates [`Self::read_all`] errors.
    pub async fn last_n(&self, n: usize) -> io::Result<Vec<Event>> {
        let mut all = self.read_all().await?;
        if all.len() > n {
            all.drain(0..all.len() - n);
        }
        Ok(all)
    }

    /// Events matching `predicate`, in file order.
    ///
    /// # Errors
    ///
    /// Propagates [`Self::read_all`] errors.
    pub async fn filter<F: Fn(&Event) -> bool>(&self, predicate: F) -> io::Result<Vec<Event>> {
        Ok(self
            .read_all()
            .await?
            .into_iter()
            .filter(predicate)
            .collect())
    }

    /// Existence, size, and line-count statistics.
    pub async fn stats(&self) -> LogStats {
        match fs::metadata(&self.path).await {
            Ok(meta) => {
                let line_count = self.read_all().await.map(|v| v.len()).unwrap_or(0);
                LogStats {
                    exists: true,
                    size_bytes: meta.len(),
                    line_count,
                }
            },
            Err(_) => LogStats::default(),
        }
    }

    /// Remove the log file from disk (cleanup policy, spec §5 "Resource
    /// bounds").
    ///
    /// # Errors
    ///
    /// Returns an error if deletion fails for a reason other than the file
    /// already being absent.
    pub async fn delete(&self) -> io::Result<()> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn open_store(root: &Path, workspace: &Path) -> SessionLogStore {
        SessionLogStore::open(root, workspace, SessionId::from_existing("s1"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn append_assigns_monotonic_ids_and_parent_chain() {
        let dir = tempdir().unwrap();
        let workspace = tempdir().unwrap();
        let store = open_store(dir.path(), workspace.path()).await;

        let e1 = store
            .append(EventDraft::new(EventKind::User, serde_json::json!({})))
            .await
            .unwrap();
        let e2 = store
            .append(EventDraft::new(EventKind::Assistant, serde_json::json!({})))
            .await
            .unwrap();

        assert_eq!(e1.id, 1);
        assert_eq!(e1.parent_id, None);
        assert_eq!(e2.id, 2);
        assert_eq!(e2.parent_id, Some(1));
    }

    #[tokio::test]
    async fn read_all_skips_malformed_trailing_line() {
        let dir = tempdir().unwrap();
        let workspace = tempdir().unwrap();
        let store = open_store(dir.path(), workspace.path()).await;

        store
            .append(EventDraft::new(EventKind::User, serde_json::json!({})))
            .await
            .unwrap();

        // Simulate a crash mid-write: append a truncated JSON fragment.
        let mut file = fs::OpenOptions::new()
            .append(true)
            .open(store.path())
            .await
            .unwrap();
        file.write_all(b"{\"id\": 2, \"kind\"").await.unwrap();

        let events = store.read_all().await.unwrap();
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn resuming_continues_the_id_chain() {
        let dir = tempdir().unwrap();
        let workspace = tempdir().unwrap();
        {
            let store = open_store(dir.path(), workspace.path()).await;
            store
                .append(EventDraft::new(EventKind::User, serde_json::json!({})))
                .await
                .unwrap();
        }
        let resumed = open_store(dir.path(), workspace.path()).await;
        let e = resumed
            .append(EventDraft::new(EventKind::Assistant, serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(e.id, 2);
        assert_eq!(e.parent_id, Some(1));
    }

    #[tokio::test]
    async fn stats_reports_missing_file_as_absent() {
        let dir = tempdir().unwrap();
        let workspace = tempdir().unwrap();
        let store = open_store(dir.path(), workspace.path()).await;
        let stats = store.stats().await;
        assert!(!stats.exists);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempdir().unwrap();
        let workspace = tempdir().unwrap();
        let store = open_store(dir.path(), workspace.path()).await;
        store
            .append(EventDraft::new(EventKind::User, serde_json::json!({})))
            .await
            .unwrap();
        store.delete().await.unwrap();
        store.delete().await.unwrap();
        let stats = store.stats().await;
        assert!(!stats.exists);
    }

    #[tokio::test]
    async fn stream_visits_every_event_in_order() {
        let dir = tempdir().unwrap();
        let workspace = tempdir().unwrap();
        let store = open_store(dir.path(), workspace.path()).await;
        for _ in 0..3 {
            store
                .append(EventDraft::new(EventKind::User, serde_json::json!({})))
                .await
                .unwrap();
        }
        let mut ids = Vec::new();
        store.stream(|e| ids.push(e.id)).await.unwrap();
        assert_eq!(ids, vec![1, 2, 3]);
    }
}
