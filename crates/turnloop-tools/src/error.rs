//! Tool execution error taxonomy (spec §4.5, §7).

use thiserror::Error;

/// Errors a tool's own `invoke` can raise.
///
/// These map onto the normalized `{success, error}` outcome at the
/// invocation boundary (see [`crate::outcome::ToolOutcome`]); a tool never
/// needs to build that shape itself.
#[derive(Debug, Error)]
pub enum ToolError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid arguments (beyond what schema validation catches).
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// Execution failed for a reason specific to the tool.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// Referenced path does not exist.
    #[error("path not found: {0}")]
    PathNotFound(String),

    /// The tool exceeded its execution budget.
    #[error("timeout after {0}ms")]
    Timeout(u64),

    /// Cooperative cancellation took effect mid-invocation.
    #[error("cancelled")]
    Cancelled,

    /// A write/edit tool was asked to modify a file that hasn't been read
    /// in this session (spec §4.5 read-before-write discipline).
    #[error("{0} must be read before it can be modified")]
    RequiresRead(String),

    /// A write/edit tool found the on-disk mtime had drifted past the
    /// recorded read beyond the grace window (spec §4.5).
    #[error("{0} was modified on disk since it was last read")]
    ExternalModification(String),

    /// Catch-all for conditions with no dedicated variant.
    #[error("{0}")]
    Other(String),
}

/// Raw result type a [`crate::tool::Tool`] implementation returns.
pub type ToolResult = Result<String, ToolError>;
