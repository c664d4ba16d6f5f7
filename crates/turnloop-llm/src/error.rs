//! LLM client error taxonomy, mapped onto the engine's `Transport` error
//! kind at the call site (spec §7).

use thiserror::Error;

/// Errors that can occur talking to an LLM provider.
#[derive(Debug, Error)]
pub enum LlmError {
    /// API key not configured for the active provider.
    #[error("API key not configured for {provider}")]
    ApiKeyNotConfigured {
        /// Provider name.
        provider: String,
    },

    /// The provider's HTTP API returned a non-success status.
    #[error("API request failed: {0}")]
    ApiRequestFailed(String),

    /// The provider asked the caller to back off.
    #[error("rate limit exceeded, retry after {retry_after_secs} seconds")]
    RateLimitExceeded {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// The response body didn't match the expected shape.
    #[error("invalid API response: {0}")]
    InvalidResponse(String),

    /// A mid-stream transport failure (connection drop, malformed SSE
    /// frame, ...).
    #[error("streaming error: {0}")]
    StreamingError(String),

    /// Underlying HTTP transport error.
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Provider misconfigured (bad base URL, invalid header value, ...).
    #[error("configuration error: {0}")]
    ConfigError(String),
}

/// Result type for LLM operations.
pub type LlmResult<T> = Result<T, LlmError>;
