//! turnloop-tools — the Tool Registry & Invoker (spec §4.5 C5): the
//! `Tool` trait, the registry that maps name → tool, the invocation
//! pipeline, the File Access Tracker, and a handful of built-in tools.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod access_tracker;
pub mod builtin;
pub mod context;
pub mod error;
pub mod invoker;
pub mod outcome;
pub mod prelude;
pub mod registry;
pub mod tool;
pub mod truncate;

pub use access_tracker::{FileAccessTracker, GRACE_WINDOW};
pub use builtin::{BashTool, EditFileTool, GlobTool, ReadFileTool, WriteFileTool};
pub use context::{ProgressReporter, SubConfirmation, ToolContext};
pub use error::{ToolError, ToolResult};
pub use invoker::Invoker;
pub use outcome::ToolOutcome;
pub use registry::ToolRegistry;
pub use tool::Tool;
pub use truncate::{truncate_at_char_boundary, truncate_output, MAX_OUTPUT_CHARS};
