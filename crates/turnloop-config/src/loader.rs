//! Config file discovery and layered loading.
//!
//! Implements the layered load algorithm (spec §6.6 ambient companion,
//! SPEC_FULL §B): global (`~/.turnloop/config.toml`) merged under project
//! (`{workspace}/.turnloop/config.toml`), then deserialized and validated.
//! Grounded in the teacher's `astrid-config::loader`, narrowed to two
//! layers (no `/etc` system layer, no env var fallback resolution — this
//! engine has no deployed-fleet system-config story, see DESIGN.md).

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{ConfigError, ConfigResult};
use crate::merge::deep_merge;
use crate::types::Config;
use crate::validate;

/// Maximum allowed config file size (1 MB), matching the teacher's bound.
const MAX_CONFIG_FILE_SIZE: u64 = 1_048_576;

/// Load configuration with global → project precedence.
///
/// `workspace_root` is the root of the current project. If `None`, the
/// project layer is skipped and only global config (or defaults) apply.
///
/// # Errors
///
/// Returns a [`ConfigError`] if any config file is malformed, or if the
/// final merged configuration fails validation.
pub fn load(workspace_root: Option<&Path>) -> ConfigResult<Config> {
    load_with_home(workspace_root, None)
}

/// Load configuration with an explicit global-config-home override
/// (bypasses `directories::BaseDirs` discovery — used by tests and by
/// callers that already know where `~/.turnloop` lives).
///
/// # Errors
///
/// Returns a [`ConfigError`] if any config file is malformed, or if the
/// final merged configuration fails validation.
pub fn load_with_home(
    workspace_root: Option<&Path>,
    home_override: Option<&Path>,
) -> ConfigResult<Config> {
    let mut merged = toml::Value::Table(toml::map::Map::new());

    let global_path = global_config_path(home_override)?;
    if let Some(global_path) = global_path {
        if let Some(overlay) = try_load_file(&global_path)? {
            deep_merge(&mut merged, &overlay);
            info!(path = %global_path.display(), "loaded global config");
        }
    }

    if let Some(ws_root) = workspace_root {
        let project_path = project_config_path(ws_root);
        if let Some(overlay) = try_load_file(&project_path)? {
            deep_merge(&mut merged, &overlay);
            info!(path = %project_path.display(), "loaded project config");
        }
    }

    let config: Config = merged
        .try_into()
        .map_err(|source| ConfigError::Parse {
            path: "<merged config>".to_owned(),
            source,
        })?;

    validate::validate(&config)?;
    Ok(config)
}

/// Load configuration from a single file (no layering, used by the CLI's
/// `doctor` subcommand to validate an arbitrary file).
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file cannot be read, parsed, or fails
/// validation.
pub fn load_file(path: &Path) -> ConfigResult<Config> {
    let metadata = std::fs::metadata(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    if metadata.len() > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::Validation {
            field: path.display().to_string(),
            message: format!(
                "config file is {} bytes, exceeding the {MAX_CONFIG_FILE_SIZE} byte limit",
                metadata.len()
            ),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;

    let config: Config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })?;

    validate::validate(&config)?;
    Ok(config)
}

/// The standard project config file location: `<workspace_root>/.turnloop/config.toml`.
#[must_use]
pub fn project_config_path(workspace_root: &Path) -> PathBuf {
    workspace_root.join(".turnloop").join("config.toml")
}

/// The standard global config file location, honoring `home_override` when
/// given, else `directories::BaseDirs::home_dir()`. Returns `None` if the
/// home directory can't be determined (global config is then simply
/// skipped rather than treated as fatal — see DESIGN.md).
fn global_config_path(home_override: Option<&Path>) -> ConfigResult<Option<PathBuf>> {
    let home = if let Some(h) = home_override {
        h.to_path_buf()
    } else {
        match directories::BaseDirs::new() {
            Some(dirs) => dirs.home_dir().to_path_buf(),
            None => return Ok(None),
        }
    };
    Ok(Some(home.join(".turnloop").join("config.toml")))
}

/// Try to load a file as a TOML value, returning `None` if it doesn't
/// exist. Reads in a single pass to avoid a TOCTOU race between an
/// existence check and the read.
fn try_load_file(path: &Path) -> ConfigResult<Option<toml::Value>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "config file not found, skipping");
            return Ok(None);
        },
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.display().to_string(),
                source,
            });
        },
    };

    if content.len() as u64 > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::Validation {
            field: path.display().to_string(),
            message: format!(
                "config file is {} bytes, exceeding the {MAX_CONFIG_FILE_SIZE} byte limit",
                content.len()
            ),
        });
    }

    let value: toml::Value = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })?;

    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_without_files_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = load_with_home(None, Some(dir.path())).unwrap();
        assert_eq!(config.agent.max_steps, 50);
    }

    #[test]
    fn project_layer_overrides_global_layer() {
        let home = tempdir().unwrap();
        std::fs::create_dir_all(home.path().join(".turnloop")).unwrap();
        std::fs::write(
            home.path().join(".turnloop").join("config.toml"),
            "[agent]\nmax_steps = 10\n\n[log]\nkeep_sessions = 5\n",
        )
        .unwrap();

        let workspace = tempdir().unwrap();
        std::fs::create_dir_all(workspace.path().join(".turnloop")).unwrap();
        std::fs::write(
            workspace.path().join(".turnloop").join("config.toml"),
            "[agent]\nmax_steps = 25\n",
        )
        .unwrap();

        let config = load_with_home(Some(workspace.path()), Some(home.path())).unwrap();
        assert_eq!(config.agent.max_steps, 25);
        assert_eq!(config.log.keep_sessions, 5);
    }

    #[test]
    fn missing_project_dir_falls_back_to_global_only() {
        let home = tempdir().unwrap();
        std::fs::create_dir_all(home.path().join(".turnloop")).unwrap();
        std::fs::write(
            home.path().join(".turnloop").join("config.toml"),
            "[log]\nkeep_sessions = 7\n",
        )
        .unwrap();

        let workspace = tempdir().unwrap();
        let config = load_with_home(Some(workspace.path()), Some(home.path())).unwrap();
        assert_eq!(config.log.keep_sessions, 7);
    }

    #[test]
    fn malformed_project_config_is_an_error() {
        let workspace = tempdir().unwrap();
        std::fs::create_dir_all(workspace.path().join(".turnloop")).unwrap();
        std::fs::write(
            workspace.path().join(".turnloop").join("config.toml"),
            "this is not valid toml =====",
        )
        .unwrap();

        let home = tempdir().unwrap();
        let result = load_with_home(Some(workspace.path()), Some(home.path()));
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn load_file_nonexistent_is_a_read_error() {
        let result = load_file(Path::new("/nonexistent/turnloop/config.toml"));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn oversized_config_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("huge.toml");
        let data = "x = \"".to_owned() + &"a".repeat(1_100_000) + "\"";
        std::fs::write(&path, data).unwrap();

        let result = try_load_file(&path);
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn invalid_merged_config_fails_validation() {
        let workspace = tempdir().unwrap();
        std::fs::create_dir_all(workspace.path().join(".turnloop")).unwrap();
        std::fs::write(
            workspace.path().join(".turnloop").join("config.toml"),
            "[agent]\nmax_steps = 0\n",
        )
        .unwrap();

        let home = tempdir().unwrap();
        let result = load_with_home(Some(workspace.path()), Some(home.path()));
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }
}
