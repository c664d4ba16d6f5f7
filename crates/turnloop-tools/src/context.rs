//! Shared context available to every tool invocation (spec §6.2 `context`).

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use turnloop_core::SessionId;

use crate::access_tracker::FileAccessTracker;

/// Reports tool-emitted progress back to the front-end while a long-running
/// invocation is in flight (spec §6.2 `report_progress(str)`).
#[async_trait::async_trait]
pub trait ProgressReporter: Send + Sync {
    /// Deliver one progress message.
    async fn report(&self, message: &str);
}

/// Asks the user to confirm a sub-decision inside a tool invocation (spec
/// §6.2 `request_sub_confirmation(details)`) — e.g. a destructive shell
/// command a tool wants extra sign-off on beyond the ordinary permission
/// check.
#[async_trait::async_trait]
pub trait SubConfirmation: Send + Sync {
    /// Ask for confirmation, returning whether the user approved.
    async fn confirm(&self, details: &str) -> bool;
}

/// Per-invocation context passed to every [`crate::tool::Tool::invoke`] call.
pub struct ToolContext {
    /// Workspace root directory.
    pub workspace_root: PathBuf,
    /// Session this invocation belongs to.
    pub session_id: SessionId,
    /// Current working directory, persisted across invocations within a
    /// session (the natural companion to a shell tool; spec is silent on
    /// this, the teacher always threads one through).
    pub cwd: Arc<RwLock<PathBuf>>,
    /// The File Access Tracker write/edit tools must consult (spec §4.5).
    pub access_tracker: Arc<FileAccessTracker>,
    cancellation: CancellationToken,
    progress: RwLock<Option<Arc<dyn ProgressReporter>>>,
    confirmation: RwLock<Option<Arc<dyn SubConfirmation>>>,
}

impl ToolContext {
    /// Create a new tool context rooted at `workspace_root`.
    #[must_use]
    pub fn new(workspace_root: PathBuf, session_id: SessionId, access_tracker: Arc<FileAccessTracker>) -> Self {
        let cwd = Arc::new(RwLock::new(workspace_root.clone()));
        Self {
            workspace_root,
            session_id,
            cwd,
            access_tracker,
            cancellation: CancellationToken::new(),
            progress: RwLock::new(None),
            confirmation: RwLock::new(None),
        }
    }

    /// Create a context that shares its `cwd` with other invocations in the
    /// same session but otherwise stands alone.
    #[must_use]
    pub fn with_shared_cwd(
        workspace_root: PathBuf,
        session_id: SessionId,
        cwd: Arc<RwLock<PathBuf>>,
        access_tracker: Arc<FileAccessTracker>,
    ) -> Self {
        Self {
            workspace_root,
            session_id,
            cwd,
            access_tracker,
            cancellation: CancellationToken::new(),
            progress: RwLock::new(None),
            confirmation: RwLock::new(None),
        }
    }

    /// The cancellation token the invoker signals when a turn is aborted.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Whether this invocation has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Install a progress reporter for this invocation.
    pub async fn set_progress_reporter(&self, reporter: Option<Arc<dyn ProgressReporter>>) {
        *self.progress.write().await = reporter;
    }

    /// Report progress, if a reporter is installed; otherwise a no-op.
    pub async fn report_progress(&self, message: &str) {
        if let Some(reporter) = self.progress.read().await.clone() {
            reporter.report(message).await;
        }
    }

    /// Install a sub-confirmation handler for this invocation.
    pub async fn set_confirmation_handler(&self, handler: Option<Arc<dyn SubConfirmation>>) {
        *self.confirmation.write().await = handler;
    }

    /// Ask for a sub-confirmation. With no handler installed, the request
    /// is treated as approved — a tool that wants extra sign-off opts in by
    /// calling this, so absence of a handler means no front-end is wired up
    /// to ask and the invocation should proceed rather than deadlock.
    pub async fn request_sub_confirmation(&self, details: &str) -> bool {
        match self.confirmation.read().await.clone() {
            Some(handler) => handler.confirm(details).await,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ToolContext {
        ToolContext::new(
            std::env::temp_dir(),
            SessionId::from_existing("s1"),
            Arc::new(FileAccessTracker::new()),
        )
    }

    #[tokio::test]
    async fn not_cancelled_by_default() {
        assert!(!ctx().is_cancelled());
    }

    #[tokio::test]
    async fn cancellation_token_signals_context() {
        let ctx = ctx();
        ctx.cancellation_token().cancel();
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn sub_confirmation_defaults_to_approved() {
        assert!(ctx().request_sub_confirmation("delete everything").await);
    }
}
