//! Loading hook definitions from a workspace/user TOML config file (spec
//! §4.4, §6.6).
//!
//! Grounded in the teacher's `astrid-hooks::discovery`, simplified: this
//! engine reads one `hooks.toml` rather than walking a directory tree of
//! per-hook manifests.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::hook::HookDefinition;

/// Errors loading a hooks configuration file.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The file could not be read.
    #[error("failed to read hooks file {path}: {source}")]
    Read {
        /// The path that failed, pre-formatted for display.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The file's contents did not parse as valid hooks TOML.
    #[error("failed to parse hooks file {path}: {source}")]
    Parse {
        /// The path that failed, pre-formatted for display.
        path: String,
        /// Underlying parse error.
        #[source]
        source: toml::de::Error,
    },
}

/// The on-disk shape of a `hooks.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HooksConfig {
    /// Every configured hook, in file order.
    #[serde(default, rename = "hook")]
    pub hooks: Vec<HookDefinition>,
}

impl HooksConfig {
    /// Load hooks from `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or fails to parse.
    pub fn load(path: &Path) -> Result<Self, DiscoveryError> {
        let content = std::fs::read_to_string(path).map_err(|source| DiscoveryError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| DiscoveryError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Load hooks from `path` if it exists, returning an empty config
    /// otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but fails to parse.
    pub fn load_if_present(path: &Path) -> Result<Self, DiscoveryError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// The standard hooks file location under a workspace root:
    /// `<workspace_root>/.turnloop/hooks.toml`.
    #[must_use]
    pub fn workspace_path(workspace_root: &Path) -> PathBuf {
        workspace_root.join(".turnloop").join("hooks.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use turnloop_core::HookEvent;

    #[test]
    fn loads_hooks_from_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hooks.toml");
        std::fs::write(
            &path,
            r#"
            [[hook]]
            event = "pre_tool_use"
            command = "echo '{}'"
            timeout_secs = 5
            "#,
        )
        .unwrap();

        let config = HooksConfig::load(&path).unwrap();
        assert_eq!(config.hooks.len(), 1);
        assert_eq!(config.hooks[0].event, HookEvent::PreToolUse);
        assert_eq!(config.hooks[0].timeout_secs, 5);
    }

    #[test]
    fn missing_file_yields_empty_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.toml");
        let config = HooksConfig::load_if_present(&path).unwrap();
        assert!(config.hooks.is_empty());
    }
}
