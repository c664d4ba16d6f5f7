//! Runtime error types (spec §7), narrowed from the teacher's `RuntimeError`
//! to this engine's own scope: no MCP/audit/capability/security variants,
//! since those subsystems aren't part of this workspace.

use thiserror::Error;

/// Errors that can occur in the runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Session not found.
    #[error("session not found: {session_id}")]
    SessionNotFound {
        /// The session id.
        session_id: String,
    },

    /// Session already exists.
    #[error("session already exists: {session_id}")]
    SessionExists {
        /// The session id.
        session_id: String,
    },

    /// LLM error.
    #[error("LLM error: {0}")]
    LlmError(#[from] turnloop_llm::LlmError),

    /// Tool invocation error that escaped the invoker's own normalization
    /// (the invoker turns most tool failures into a `ToolOutcome` rather
    /// than a `Result`; this variant exists for the few paths, like
    /// building a `ToolContext`, that can fail before invocation begins).
    #[error("tool error: {0}")]
    ToolError(#[from] turnloop_tools::ToolError),

    /// Session log store I/O failure.
    #[error("storage error: {0}")]
    StorageError(String),

    /// Event (de)serialization failure while rebuilding Conversation.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Context window exceeded even after compaction.
    #[error("context overflow: {current} tokens exceeds limit of {max}")]
    ContextOverflow {
        /// Current token count.
        current: usize,
        /// Maximum allowed.
        max: usize,
    },

    /// A tool call was denied by the permission engine, hook veto, or user.
    #[error("permission denied: {reason}")]
    PermissionDenied {
        /// Reason for denial.
        reason: String,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(#[from] turnloop_config::ConfigError),

    /// Hook discovery error.
    #[error("hook discovery error: {0}")]
    HookDiscoveryError(#[from] turnloop_hooks::DiscoveryError),

    /// IO error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// A programming fault — should never surface to a well-behaved caller.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

impl RuntimeError {
    /// Render this error as the engine-wide user-facing record (spec §7
    /// last paragraph), for publication on the event bus.
    #[must_use]
    pub fn to_user_facing(&self) -> turnloop_core::error::UserFacingError {
        use turnloop_core::error::ErrorKind;

        let (kind, retryable) = match self {
            Self::PermissionDenied { .. } => (ErrorKind::PermissionDenied, false),
            Self::LlmError(_) => (ErrorKind::Transport, true),
            Self::ContextOverflow { .. } | Self::ToolError(_) => (ErrorKind::Validation, false),
            Self::StorageError(_) | Self::IoError(_) => (ErrorKind::Io, false),
            Self::ConfigError(_) | Self::HookDiscoveryError(_) => (ErrorKind::Validation, false),
            Self::SessionNotFound { .. } | Self::SessionExists { .. } => {
                (ErrorKind::Validation, false)
            },
            Self::SerializationError(_) | Self::Internal(_) => (ErrorKind::Internal, false),
        };

        turnloop_core::error::UserFacingError {
            kind,
            message: self.to_string(),
            suggestions: Vec::new(),
            retryable,
        }
    }
}
