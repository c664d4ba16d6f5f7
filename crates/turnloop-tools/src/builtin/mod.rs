//! Built-in coding tools, exercising the C5 pipeline end to end (spec
//! §4.5: "a handful of built-in tools to exercise the pipeline").

mod bash;
mod edit_file;
mod glob;
mod read_file;
mod write_file;

pub use bash::BashTool;
pub use edit_file::EditFileTool;
pub use glob::GlobTool;
pub use read_file::ReadFileTool;
pub use write_file::WriteFileTool;

/// Build a canonical permission-rule pattern string (spec §6.5):
/// `ToolName(arg:value, ...)`.
#[must_use]
pub(crate) fn format_permission_pattern(tool_name: &str, pairs: &[(&str, &str)]) -> String {
    let args = pairs
        .iter()
        .map(|(k, v)| format!("{k}:{v}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("{tool_name}({args})")
}

/// Generalize a bash command to its canonical family pattern (spec §4.3
/// step 2: "Bash(command: → keep the first word, generalize arguments to
/// `*`"), so an `allow_always` on one invocation covers the whole command
/// family rather than only the exact argument string.
#[must_use]
pub(crate) fn generalize_bash_command(command: &str) -> String {
    match command.split_whitespace().next() {
        Some(first) => format!("{first} *"),
        None => "*".to_string(),
    }
}

/// Generalize a file path to its extension-scoped glob (spec §4.3 step 2:
/// "file tools → generalize to `**/*.<ext>`"), so an `allow_always` on one
/// file covers every file sharing its extension.
#[must_use]
pub(crate) fn generalize_file_path(file_path: &str) -> String {
    match std::path::Path::new(file_path).extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("**/*.{ext}"),
        None => "**/*".to_string(),
    }
}
