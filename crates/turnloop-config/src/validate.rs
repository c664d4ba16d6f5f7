//! Post-merge configuration validation (spec §6.6 enumerated ranges).
//!
//! Grounded in the teacher's `astrid-config::validate` — one checking
//! function per section, first failure wins.

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Validate a fully-merged and deserialized configuration.
///
/// # Errors
///
/// Returns the first validation error encountered.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_agent(config)?;
    validate_compaction(config)?;
    validate_log(config)?;
    validate_hook(config)?;
    validate_bus(config)?;
    validate_servers(config)?;
    Ok(())
}

fn validate_agent(config: &Config) -> ConfigResult<()> {
    if config.agent.max_steps == 0 {
        return Err(ConfigError::Validation {
            field: "agent.max_steps".to_owned(),
            message: "max_steps must be greater than 0".to_owned(),
        });
    }
    if matches!(config.agent.turn_timeout_ms, Some(0)) {
        return Err(ConfigError::Validation {
            field: "agent.turn_timeout_ms".to_owned(),
            message: "turn_timeout_ms must be greater than 0 when set".to_owned(),
        });
    }
    Ok(())
}

fn validate_ratio(value: f64, field: &str) -> ConfigResult<()> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::Validation {
            field: field.to_owned(),
            message: format!("{field} must be between 0.0 and 1.0, got {value}"),
        });
    }
    Ok(())
}

fn validate_compaction(config: &Config) -> ConfigResult<()> {
    let c = &config.compaction;
    validate_ratio(c.threshold_ratio, "compaction.threshold_ratio")?;
    validate_ratio(c.retain_ratio, "compaction.retain_ratio")?;
    validate_ratio(c.fallback_retain_ratio, "compaction.fallback_retain_ratio")?;
    Ok(())
}

fn validate_log(config: &Config) -> ConfigResult<()> {
    if config.log.keep_sessions == 0 {
        return Err(ConfigError::Validation {
            field: "log.keep_sessions".to_owned(),
            message: "keep_sessions must be greater than 0".to_owned(),
        });
    }
    Ok(())
}

fn validate_hook(config: &Config) -> ConfigResult<()> {
    if config.hook.default_timeout_s == 0 {
        return Err(ConfigError::Validation {
            field: "hook.default_timeout_s".to_owned(),
            message: "default_timeout_s must be greater than 0".to_owned(),
        });
    }
    Ok(())
}

fn validate_bus(config: &Config) -> ConfigResult<()> {
    if config.bus.high_water == 0 {
        return Err(ConfigError::Validation {
            field: "bus.high_water".to_owned(),
            message: "high_water must be greater than 0".to_owned(),
        });
    }
    Ok(())
}

fn validate_servers(config: &Config) -> ConfigResult<()> {
    for (name, server) in &config.mcp_servers {
        match server.transport.as_str() {
            "stdio" => {
                if server.command.is_none() {
                    return Err(ConfigError::Validation {
                        field: format!("mcp_servers.{name}.command"),
                        message: "stdio transport requires a command".to_owned(),
                    });
                }
            },
            "sse" | "streamable-http" => {
                if server.url.is_none() {
                    return Err(ConfigError::Validation {
                        field: format!("mcp_servers.{name}.url"),
                        message: format!("{} transport requires a url", server.transport),
                    });
                }
            },
            other => {
                return Err(ConfigError::Validation {
                    field: format!("mcp_servers.{name}.type"),
                    message: format!(
                        "unsupported transport '{other}'; expected one of: stdio, sse, streamable-http"
                    ),
                });
            },
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::McpServerConfig;

    #[test]
    fn default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn zero_max_steps_rejected() {
        let mut cfg = Config::default();
        cfg.agent.max_steps = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn retain_ratio_independent_of_threshold_ratio() {
        // trigger-early/keep-most is a legitimate combination: threshold_ratio
        // and retain_ratio live on unrelated axes (token-window trigger vs.
        // message-count retention), so this must not be rejected.
        let mut cfg = Config::default();
        cfg.compaction.retain_ratio = 0.6;
        cfg.compaction.threshold_ratio = 0.5;
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn out_of_range_ratio_rejected() {
        let mut cfg = Config::default();
        cfg.compaction.threshold_ratio = 1.5;
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn stdio_server_without_command_rejected() {
        let mut cfg = Config::default();
        cfg.mcp_servers.insert(
            "bad".to_owned(),
            McpServerConfig {
                transport: "stdio".to_owned(),
                command: None,
                ..Default::default()
            },
        );
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn sse_server_without_url_rejected() {
        let mut cfg = Config::default();
        cfg.mcp_servers.insert(
            "bad".to_owned(),
            McpServerConfig {
                transport: "sse".to_owned(),
                url: None,
                ..Default::default()
            },
        );
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn unknown_transport_rejected() {
        let mut cfg = Config::default();
        cfg.mcp_servers.insert(
            "bad".to_owned(),
            McpServerConfig {
                transport: "carrier-pigeon".to_owned(),
                ..Default::default()
            },
        );
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn zero_keep_sessions_rejected() {
        let mut cfg = Config::default();
        cfg.log.keep_sessions = 0;
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn zero_bus_high_water_rejected() {
        let mut cfg = Config::default();
        cfg.bus.high_water = 0;
        assert!(validate(&cfg).is_err());
    }
}
