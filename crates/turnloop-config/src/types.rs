//! Configuration struct definitions (spec §6.6).
//!
//! Mirrors the teacher's `astrid-config::types` shape — one `#[serde(default)]`
//! struct per section, every field defaulted so a bare `[section]` header (or
//! an entirely absent file) produces a working configuration — but typed
//! directly against this engine's domain crates rather than a dependency-free
//! mirror (see DESIGN.md for why).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use turnloop_hooks::FailureBehaviour;
use turnloop_permission::PermissionMode;

/// Root configuration for the turnloop engine (spec §6.6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Session-wide permission policy tier.
    pub permission_mode: PermissionMode,
    /// Global allow/deny rule lists (session and project rules are added at
    /// runtime; this is the persisted global/project layer).
    pub permissions: PermissionsSection,
    /// Hook definitions grouped by lifecycle site.
    pub hooks: HooksSection,
    /// Named MCP server definitions.
    pub mcp_servers: HashMap<String, McpServerConfig>,
    /// Agent loop tunables (step cap, turn timeout).
    pub agent: AgentSection,
    /// Context compaction thresholds.
    pub compaction: CompactionSection,
    /// Session log retention.
    pub log: LogSection,
    /// Hook dispatch policy defaults.
    pub hook: HookPolicySection,
    /// Event bus backpressure tuning.
    pub bus: BusSection,
}

// ---------------------------------------------------------------------------
// PermissionsSection
// ---------------------------------------------------------------------------

/// Global/project permission rule lists (spec §6.6 `permissions.allow[]`,
/// `permissions.deny[]`). Patterns use the canonical grammar (spec §6.5).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionsSection {
    /// Canonical patterns that are always allowed.
    pub allow: Vec<String>,
    /// Canonical patterns that are always denied.
    pub deny: Vec<String>,
}

// ---------------------------------------------------------------------------
// HooksSection
// ---------------------------------------------------------------------------

/// One hook entry under a `[hooks.<site>]` array (spec §6.6 `hooks.<site>[]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookEntry {
    /// The shell command to execute.
    pub command: String,
    /// Seconds to wait before killing the hook process. `None` falls back
    /// to `hook.default_timeout_s`.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Behaviour on timeout or non-zero exit. `None` falls back to
    /// `hook.failure_behaviour`.
    #[serde(default)]
    pub failure_behaviour: Option<FailureBehaviour>,
    /// Optional glob restricting which tool names this hook runs for.
    #[serde(default)]
    pub matcher: Option<String>,
}

/// Hook definitions grouped by lifecycle site name (e.g. `"pre_tool_use"`),
/// matching [`turnloop_core::HookEvent`]'s `snake_case` serde form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, transparent)]
pub struct HooksSection {
    /// Site name (e.g. `"pre_tool_use"`) to the hooks registered for it.
    pub sites: HashMap<String, Vec<HookEntry>>,
}

// ---------------------------------------------------------------------------
// McpServerConfig
// ---------------------------------------------------------------------------

/// One configured MCP server (spec §6.6
/// `mcp_servers.<name>.{type, command?, url?, env?, args?}`).
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct McpServerConfig {
    /// Transport type (`"stdio"`, `"sse"`, `"streamable-http"`).
    #[serde(rename = "type")]
    pub transport: String,
    /// Command to launch the server (stdio transport).
    pub command: Option<String>,
    /// URL for network-based transports.
    pub url: Option<String>,
    /// Extra environment variables passed to the server process.
    #[serde(skip_serializing)]
    pub env: HashMap<String, String>,
    /// Arguments passed to `command`.
    pub args: Vec<String>,
}

impl Default for McpServerConfig {
    fn default() -> Self {
        Self {
            transport: "stdio".to_owned(),
            command: None,
            url: None,
            env: HashMap::new(),
            args: Vec::new(),
        }
    }
}

impl std::fmt::Debug for McpServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redacted_env: HashMap<&String, &str> = self.env.keys().map(|k| (k, "***")).collect();
        f.debug_struct("McpServerConfig")
            .field("transport", &self.transport)
            .field("command", &self.command)
            .field("url", &self.url)
            .field("env", &redacted_env)
            .field("args", &self.args)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// AgentSection
// ---------------------------------------------------------------------------

/// Agent loop tunables (spec §6.6 `max_steps`, `turn_timeout_ms`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// Maximum tool-call steps the agent loop takes in a single turn
    /// before forcing a stop (spec §4.7 step budget).
    pub max_steps: usize,
    /// Wall-clock budget for a single turn. `None` means unlimited.
    pub turn_timeout_ms: Option<u64>,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_steps: 50,
            turn_timeout_ms: None,
        }
    }
}

// ---------------------------------------------------------------------------
// CompactionSection
// ---------------------------------------------------------------------------

/// Context compaction thresholds (spec §6.6 `compaction.*`, §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactionSection {
    /// Fraction of the context window at which compaction triggers.
    pub threshold_ratio: f64,
    /// Fraction of the message count retained after a normal compaction
    /// (applied as `ceil(message_count * ratio)`, not a token-window
    /// fraction).
    pub retain_ratio: f64,
    /// Fraction of the message count retained when the summarizing LLM call
    /// itself fails and a cruder fallback strategy is used (spec §4.6
    /// fallback path).
    pub fallback_retain_ratio: f64,
}

impl Default for CompactionSection {
    fn default() -> Self {
        Self {
            threshold_ratio: 0.8,
            retain_ratio: 0.2,
            fallback_retain_ratio: 0.3,
        }
    }
}

// ---------------------------------------------------------------------------
// LogSection
// ---------------------------------------------------------------------------

/// Session log retention (spec §6.6 `log.keep_sessions`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Number of most-recent sessions whose logs are retained on disk.
    pub keep_sessions: usize,
}

impl Default for LogSection {
    fn default() -> Self {
        Self { keep_sessions: 100 }
    }
}

// ---------------------------------------------------------------------------
// HookPolicySection
// ---------------------------------------------------------------------------

/// Hook dispatch policy defaults (spec §6.6 `hook.default_timeout_s`,
/// `hook.failure_behaviour`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HookPolicySection {
    /// Default per-hook timeout when an entry doesn't set its own.
    pub default_timeout_s: u64,
    /// Default failure behaviour when an entry doesn't set its own.
    pub failure_behaviour: FailureBehaviour,
}

impl Default for HookPolicySection {
    fn default() -> Self {
        Self {
            default_timeout_s: 60,
            failure_behaviour: FailureBehaviour::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// BusSection
// ---------------------------------------------------------------------------

/// Event bus backpressure tuning (spec §6.6 `bus.high_water`, §4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusSection {
    /// Number of buffered events after which the bus starts coalescing
    /// chunk-like events to shed backpressure.
    pub high_water: usize,
}

impl Default for BusSection {
    fn default() -> Self {
        Self { high_water: 256 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_spec_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.agent.max_steps, 50);
        assert_eq!(cfg.compaction.threshold_ratio, 0.8);
        assert_eq!(cfg.compaction.retain_ratio, 0.2);
        assert_eq!(cfg.compaction.fallback_retain_ratio, 0.3);
        assert_eq!(cfg.log.keep_sessions, 100);
        assert_eq!(cfg.hook.default_timeout_s, 60);
        assert_eq!(cfg.hook.failure_behaviour, FailureBehaviour::Ignore);
        assert_eq!(cfg.bus.high_water, 256);
        assert_eq!(cfg.permission_mode, PermissionMode::Default);
    }

    #[test]
    fn bare_section_headers_deserialize_to_defaults() {
        let toml = "[agent]\n[compaction]\n[log]\n";
        let cfg: Config = toml::from_str(toml).unwrap();
        assert_eq!(cfg.agent.max_steps, 50);
        assert_eq!(cfg.log.keep_sessions, 100);
    }

    #[test]
    fn mcp_server_config_debug_redacts_env() {
        let mut server = McpServerConfig::default();
        server
            .env
            .insert("API_KEY".to_owned(), "super-secret".to_owned());
        let debug = format!("{server:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("API_KEY"));
        assert!(debug.contains("***"));
    }

    #[test]
    fn hooks_section_parses_sites() {
        let toml = r#"
[[hooks.pre_tool_use]]
command = "echo hi"
timeout_secs = 5
"#;
        let cfg: Config = toml::from_str(toml).unwrap();
        let site = cfg.hooks.sites.get("pre_tool_use").unwrap();
        assert_eq!(site.len(), 1);
        assert_eq!(site[0].command, "echo hi");
        assert_eq!(site[0].timeout_secs, Some(5));
    }

    #[test]
    fn mcp_servers_parse() {
        let toml = r#"
[mcp_servers.fs]
type = "stdio"
command = "mcp-fs"
args = ["--root", "."]
"#;
        let cfg: Config = toml::from_str(toml).unwrap();
        let server = &cfg.mcp_servers["fs"];
        assert_eq!(server.transport, "stdio");
        assert_eq!(server.command.as_deref(), Some("mcp-fs"));
        assert_eq!(server.args, vec!["--root", "."]);
    }
}
