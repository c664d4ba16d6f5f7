//! Convenience re-exports. `use turnloop_config::prelude::*;`

pub use crate::{
    AgentSection, BusSection, CompactionSection, Config, ConfigError, ConfigResult, HookEntry,
    HookPolicySection, HooksSection, LogSection, McpServerConfig, PermissionsSection,
};
