//! The error taxonomy shared across the engine (spec §7).
//!
//! Each variant corresponds to one of the kinds enumerated in the spec:
//! `ValidationError`, `PermissionDenied`, `Cancelled`, `Timeout`,
//! `Transport`, `IOError`, `InternalError`. Downstream crates define their
//! own leaf error types for crate-local detail, but map into this taxonomy
//! at the boundary the same way `astrid-core::SecurityError` is the shared
//! vocabulary downstream `astrid-*` crates funnel into.

use thiserror::Error;

/// The engine-wide error taxonomy.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Schema or rule mismatch (tool argument, config, event parse).
    #[error("validation error: {0}")]
    Validation(String),

    /// Policy, hook, or user rejection of a proposed action.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Cooperative cancellation took effect.
    #[error("cancelled")]
    Cancelled,

    /// A hook, LLM call, or tool exceeded its configured budget.
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// LLM stream I/O failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Filesystem error on the log, a tool, or a hook.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A programming fault — should never surface to a well-behaved caller.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type aliased to [`EngineError`].
pub type EngineResult<T> = Result<T, EngineError>;

/// One entry in the user-visible failure stream (spec §7, last paragraph).
///
/// Every error kind maps to exactly one of these; front-ends render them
/// inline in the transcript rather than as blocking dialogs.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct UserFacingError {
    /// Which taxonomy kind produced this.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
    /// Suggested next actions, if any.
    #[serde(default)]
    pub suggestions: Vec<String>,
    /// Whether retrying the same action might succeed.
    pub retryable: bool,
}

/// The taxonomy kind, carried as data so it can be serialized onto the
/// event bus and into tool results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// See [`EngineError::Validation`].
    Validation,
    /// See [`EngineError::PermissionDenied`].
    PermissionDenied,
    /// See [`EngineError::Cancelled`].
    Cancelled,
    /// See [`EngineError::Timeout`].
    Timeout,
    /// See [`EngineError::Transport`].
    Transport,
    /// See [`EngineError::Io`].
    Io,
    /// See [`EngineError::Internal`].
    Internal,
}

impl EngineError {
    /// Classify this error into its taxonomy kind.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Transport(_) => ErrorKind::Transport,
            Self::Io(_) => ErrorKind::Io,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether this error is expected to be transient.
    #[must_use]
    pub fn retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Timeout | ErrorKind::Transport)
    }

    /// Render this error as the user-facing record the bus carries.
    #[must_use]
    pub fn to_user_facing(&self) -> UserFacingError {
        UserFacingError {
            kind: self.kind(),
            message: self.to_string(),
            suggestions: Vec::new(),
            retryable: self.retryable(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_is_not_retryable() {
        let err = EngineError::Validation("bad arg".into());
        assert!(!err.retryable());
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn timeout_is_retryable() {
        let err = EngineError::Timeout(std::time::Duration::from_secs(1));
        assert!(err.retryable());
    }

    #[test]
    fn user_facing_round_trips_through_json() {
        let err = EngineError::PermissionDenied("plan mode forbids write".into());
        let facing = err.to_user_facing();
        let json = serde_json::to_string(&facing).unwrap();
        let back: UserFacingError = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind, ErrorKind::PermissionDenied);
    }
}
