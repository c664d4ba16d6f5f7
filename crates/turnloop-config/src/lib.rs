//! turnloop-config — the layered configuration surface (spec §6.6).
//!
//! Loads `permission_mode`, rule lists, hook policy, MCP server
//! definitions, and runtime tunables from TOML, merging a project layer
//! over a global layer. Grounded in the teacher's `astrid-config`, scoped
//! down to this engine's nine-section surface (see DESIGN.md for what was
//! dropped and why).

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod merge;
pub mod prelude;
pub mod types;
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use types::{
    AgentSection, BusSection, CompactionSection, Config, HookEntry, HookPolicySection,
    HooksSection, LogSection, McpServerConfig, PermissionsSection,
};

impl Config {
    /// Load configuration with global → project precedence.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if any config file is malformed or the
    /// final configuration fails validation.
    pub fn load(workspace_root: Option<&std::path::Path>) -> ConfigResult<Self> {
        loader::load(workspace_root)
    }

    /// Load configuration with an explicit global-config-home override.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if any config file is malformed or the
    /// final configuration fails validation.
    pub fn load_with_home(
        workspace_root: Option<&std::path::Path>,
        home_override: Option<&std::path::Path>,
    ) -> ConfigResult<Self> {
        loader::load_with_home(workspace_root, home_override)
    }

    /// Load configuration from a single file (no layering).
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file cannot be read, parsed, or
    /// fails validation.
    pub fn load_file(path: &std::path::Path) -> ConfigResult<Self> {
        loader::load_file(path)
    }
}
