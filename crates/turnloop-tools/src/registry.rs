//! Tool lookup and LLM schema export (spec §4.5: "registry maps tool
//! name → Tool").

use std::collections::HashMap;

use turnloop_llm::LlmToolDefinition;

use crate::builtin::{BashTool, EditFileTool, GlobTool, ReadFileTool, WriteFileTool};
use crate::tool::Tool;

/// MCP-discovered tools are namespaced this way; anything else is native.
const MCP_PREFIX: &str = "mcp__";

/// Registry of tools available to a session, for lookup and LLM schema
/// export.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Create a registry with the built-in demonstration tools registered.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(ReadFileTool));
        registry.register(Box::new(WriteFileTool));
        registry.register(Box::new(EditFileTool));
        registry.register(Box::new(GlobTool));
        registry.register(Box::new(BashTool));
        registry
    }

    /// Register a tool, native or MCP-discovered.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Remove a previously registered tool (e.g. an MCP server that went
    /// away between turns).
    pub fn unregister(&mut self, name: &str) {
        self.tools.remove(name);
    }

    /// Look up a tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(AsRef::as_ref)
    }

    /// Whether `name` refers to a natively-registered tool rather than one
    /// discovered via MCP.
    #[must_use]
    pub fn is_native(name: &str) -> bool {
        !name.starts_with(MCP_PREFIX)
    }

    /// Export every registered tool's definition for the LLM request.
    #[must_use]
    pub fn all_definitions(&self) -> Vec<LlmToolDefinition> {
        self.tools
            .values()
            .map(|t| {
                LlmToolDefinition::new(t.name())
                    .with_description(t.description())
                    .with_schema(t.input_schema())
            })
            .collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_native_distinguishes_mcp_tools() {
        assert!(ToolRegistry::is_native("read_file"));
        assert!(ToolRegistry::is_native("bash"));
        assert!(!ToolRegistry::is_native("mcp__filesystem__read_file"));
    }

    #[test]
    fn with_defaults_registers_the_demonstration_tools() {
        let registry = ToolRegistry::with_defaults();
        assert!(registry.get("read_file").is_some());
        assert!(registry.get("write_file").is_some());
        assert!(registry.get("edit_file").is_some());
        assert!(registry.get("glob").is_some());
        assert!(registry.get("bash").is_some());
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    fn all_definitions_export_every_tool() {
        let registry = ToolRegistry::with_defaults();
        let defs = registry.all_definitions();
        assert_eq!(defs.len(), 5);
        for def in &defs {
            assert!(def.description.is_some());
        }
    }

    #[test]
    fn unregister_removes_a_tool() {
        let mut registry = ToolRegistry::with_defaults();
        registry.unregister("bash");
        assert!(registry.get("bash").is_none());
    }
}
