//! Configuration error types.

use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// The path that failed, pre-formatted for display.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A config file's contents did not parse as valid TOML.
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        /// The path that failed, pre-formatted for display.
        path: String,
        /// Underlying parse error.
        #[source]
        source: toml::de::Error,
    },
    /// The merged configuration failed post-merge validation.
    #[error("invalid configuration field '{field}': {message}")]
    Validation {
        /// The dotted field path that failed validation.
        field: String,
        /// Human-readable explanation.
        message: String,
    },
    /// The user's home directory could not be determined.
    #[error("could not determine home directory for global config lookup")]
    NoHomeDir,
}

/// Convenience alias for fallible configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
