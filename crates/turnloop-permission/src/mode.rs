//! Permission modes and tool kinds (spec §4.3, §6.6).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse classification of what a tool does, set by the tool itself
/// (spec §6.2 `kind: readonly | write | execute | external`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// Reads state without mutating anything (e.g. `read_file`, `grep`).
    ReadOnly,
    /// Mutates workspace files.
    Write,
    /// Runs an external process.
    Execute,
    /// Talks to something outside the workspace (network, MCP server).
    External,
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ReadOnly => "readonly",
            Self::Write => "write",
            Self::Execute => "execute",
            Self::External => "external",
        };
        write!(f, "{s}")
    }
}

/// The session-wide permission policy tier (spec §4.3, §6.6
/// `permission_mode`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PermissionMode {
    /// Fall through to rule matching, hook veto, and user prompt.
    Default,
    /// Allow readonly and write tools without asking; execute/external
    /// still fall through.
    AutoEdit,
    /// Allow everything; no user permission prompt is ever emitted (spec
    /// §4.3 step 1, §4.9 item 6).
    Yolo,
    /// Allow only readonly tools; everything else is denied outright.
    Plan,
}

impl PermissionMode {
    /// Apply the mode short-circuit (spec §4.3 step 1).
    ///
    /// Returns `Some(decision-ish bool)` when the mode alone settles the
    /// question: `Some(true)` = allow, `Some(false)` = deny. `None` means
    /// fall through to the rest of the algorithm.
    #[must_use]
    pub fn short_circuit(self, kind: ToolKind) -> Option<ShortCircuit> {
        match self {
            Self::Yolo => Some(ShortCircuit::Allow),
            Self::Plan => {
                if kind == ToolKind::ReadOnly {
                    Some(ShortCircuit::Allow)
                } else {
                    Some(ShortCircuit::Deny("plan mode forbids write/execute"))
                }
            },
            Self::AutoEdit => {
                if matches!(kind, ToolKind::ReadOnly | ToolKind::Write) {
                    Some(ShortCircuit::Allow)
                } else {
                    None
                }
            },
            Self::Default => None,
        }
    }
}

impl Default for PermissionMode {
    fn default() -> Self {
        Self::Default
    }
}

impl fmt::Display for PermissionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Default => "default",
            Self::AutoEdit => "auto-edit",
            Self::Yolo => "yolo",
            Self::Plan => "plan",
        };
        write!(f, "{s}")
    }
}

/// The result of a mode short-circuit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortCircuit {
    /// The mode allows the call outright.
    Allow,
    /// The mode denies the call outright, with a fixed reason.
    Deny(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yolo_allows_everything() {
        for kind in [
            ToolKind::ReadOnly,
            ToolKind::Write,
            ToolKind::Execute,
            ToolKind::External,
        ] {
            assert_eq!(
                PermissionMode::Yolo.short_circuit(kind),
                Some(ShortCircuit::Allow)
            );
        }
    }

    #[test]
    fn plan_allows_only_readonly() {
        assert_eq!(
            PermissionMode::Plan.short_circuit(ToolKind::ReadOnly),
            Some(ShortCircuit::Allow)
        );
        assert!(matches!(
            PermissionMode::Plan.short_circuit(ToolKind::Write),
            Some(ShortCircuit::Deny(_))
        ));
        assert!(matches!(
            PermissionMode::Plan.short_circuit(ToolKind::Execute),
            Some(ShortCircuit::Deny(_))
        ));
    }

    #[test]
    fn auto_edit_allows_readonly_and_write_only() {
        assert_eq!(
            PermissionMode::AutoEdit.short_circuit(ToolKind::ReadOnly),
            Some(ShortCircuit::Allow)
        );
        assert_eq!(
            PermissionMode::AutoEdit.short_circuit(ToolKind::Write),
            Some(ShortCircuit::Allow)
        );
        assert_eq!(PermissionMode::AutoEdit.short_circuit(ToolKind::Execute), None);
    }

    #[test]
    fn default_never_short_circuits() {
        for kind in [
            ToolKind::ReadOnly,
            ToolKind::Write,
            ToolKind::Execute,
            ToolKind::External,
        ] {
            assert_eq!(PermissionMode::Default.short_circuit(kind), None);
        }
    }
}
