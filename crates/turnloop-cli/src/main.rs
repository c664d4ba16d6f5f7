//! turnloop — an interactive front-end for the turnloop agent execution
//! engine.
//!
//! A thin client: parse arguments, load config, construct an
//! [`turnloop_runtime::AgentSession`], and drive it. All the real work
//! (conversation, compaction, permissions, tools) lives in the other
//! `turnloop-*` crates; this crate's job stops at argument parsing,
//! logging setup, graceful shutdown, and rendering.
//!
//! Grounded in the teacher's `astrid-cli::main`, narrowed to the three
//! subcommands this engine's scope covers (no daemon, no audit log, no
//! capsule packaging — see DESIGN.md).

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod repl;
mod shutdown;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use turnloop_events::EventBus;
use turnloop_llm::{ClaudeProvider, LlmProvider, ProviderConfig};
use turnloop_runtime::{AgentSession, EndReason};
use turnloop_tools::ToolRegistry;

/// turnloop — run and manage agent execution sessions.
#[derive(Parser)]
#[command(name = "turnloop")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose (debug-level) logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive session in the current (or given) workspace.
    Run {
        /// Resume a specific session id instead of starting a new one.
        #[arg(short, long)]
        session: Option<String>,

        /// Workspace root to run in. Defaults to the current directory.
        #[arg(short, long)]
        workspace: Option<PathBuf>,
    },
    /// Manage sessions.
    Sessions {
        #[command(subcommand)]
        command: SessionCommands,
    },
    /// Run basic environment health checks.
    Doctor,
}

#[derive(Subcommand)]
enum SessionCommands {
    /// List sessions recorded for the current workspace.
    List {
        /// Workspace root to list sessions for. Defaults to the current directory.
        #[arg(short, long)]
        workspace: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Run { session, workspace } => run_command(session, workspace).await,
        Commands::Sessions { command: SessionCommands::List { workspace } } => {
            sessions_list_command(workspace)
        },
        Commands::Doctor => doctor_command().await,
    }
}

/// `~/.turnloop`, the root under which every workspace's session logs and
/// global config live (spec §6.1; mirrors `turnloop-config`'s own
/// `directories::BaseDirs` resolution in `loader.rs`).
fn default_turnloop_root() -> Result<PathBuf> {
    let home = directories::BaseDirs::new()
        .context("could not determine the home directory")?
        .home_dir()
        .to_path_buf();
    Ok(home.join(".turnloop"))
}

async fn run_command(session: Option<String>, workspace: Option<PathBuf>) -> Result<()> {
    let workspace_root = match workspace {
        Some(w) => w,
        None => std::env::current_dir().context("could not determine the current directory")?,
    };
    let turnloop_root = default_turnloop_root()?;
    let config = turnloop_config::loader::load(Some(&workspace_root))
        .context("failed to load configuration")?;

    let api_key = std::env::var("ANTHROPIC_API_KEY")
        .context("ANTHROPIC_API_KEY must be set to run a session")?;
    let provider_config = ProviderConfig::new(api_key, "claude-sonnet-4-5".to_string());
    let llm: Arc<dyn LlmProvider> = Arc::new(ClaudeProvider::new(provider_config));

    let bus = Arc::new(EventBus::new());
    let agent_session = AgentSession::start(
        &config,
        turnloop_root,
        workspace_root,
        session,
        llm,
        ToolRegistry::with_defaults(),
        None,
        bus,
    )
    .await
    .context("failed to start session")?;
    let agent_session = Arc::new(agent_session);

    let session_for_cleanup = agent_session.clone();
    let interrupted = shutdown::run_with_graceful_shutdown(repl::run(agent_session.clone()), async move {
        let _ = session_for_cleanup.end(EndReason::CtrlC).await;
    })
    .await?;

    if interrupted {
        println!("\nshutting down...");
    }
    Ok(())
}

fn sessions_list_command(workspace: Option<PathBuf>) -> Result<()> {
    let workspace_root = match workspace {
        Some(w) => w,
        None => std::env::current_dir().context("could not determine the current directory")?,
    };
    let turnloop_root = default_turnloop_root()?;
    let dir = turnloop_core::workspace::session_dir(&turnloop_root, &workspace_root);

    let Ok(entries) = std::fs::read_dir(&dir) else {
        println!("no sessions recorded for {}", workspace_root.display());
        return Ok(());
    };

    let mut found = false;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("log") {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                println!("{stem}");
                found = true;
            }
        }
    }
    if !found {
        println!("no sessions recorded for {}", workspace_root.display());
    }
    Ok(())
}

async fn doctor_command() -> Result<()> {
    println!("turnloop doctor");

    let workspace_root = std::env::current_dir().ok();
    match turnloop_config::loader::load(workspace_root.as_deref()) {
        Ok(_) => println!("[ok]   configuration loads cleanly"),
        Err(e) => println!("[fail] configuration: {e}"),
    }

    match default_turnloop_root() {
        Ok(root) => println!("[ok]   state directory: {}", root.display()),
        Err(e) => println!("[fail] state directory: {e}"),
    }

    match std::env::var("ANTHROPIC_API_KEY") {
        Ok(_) => println!("[ok]   ANTHROPIC_API_KEY is set"),
        Err(_) => println!("[warn] ANTHROPIC_API_KEY is not set; `run` will fail"),
    }

    Ok(())
}
