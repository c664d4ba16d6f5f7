//! Convenience re-exports. `use turnloop_tools::prelude::*;`

pub use crate::{
    BashTool, EditFileTool, FileAccessTracker, GlobTool, Invoker, ProgressReporter, ReadFileTool,
    SubConfirmation, Tool, ToolContext, ToolError, ToolOutcome, ToolRegistry, ToolResult,
    WriteFileTool, GRACE_WINDOW, MAX_OUTPUT_CHARS,
};
