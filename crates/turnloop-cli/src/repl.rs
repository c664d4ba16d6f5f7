//! The interactive read-eval-print loop (spec §4.9, §4.8): read a line,
//! submit it as a turn, render the events the engine publishes while the
//! turn runs, answer permission prompts on stdin.
//!
//! Grounded loosely in the teacher's `astrid-cli::repl` in spirit only —
//! that module drives a daemon/client connection; this one drives an
//! in-process [`turnloop_runtime::AgentSession`] directly, so there is no
//! transport layer to render around.

use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::error;
use turnloop_events::{AgentEvent, PermissionOutcome};
use turnloop_runtime::{AgentSession, EndReason};

/// Drive one interactive session until the user exits or the process is
/// asked to shut down.
pub async fn run(session: Arc<AgentSession>) -> Result<()> {
    let renderer = tokio::spawn(render_events(session.clone()));

    println!("turnloop session {} — type /exit to quit", session.session_id());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        use std::io::Write;
        std::io::stdout().flush().ok();

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/exit" {
            session.end(EndReason::UserExit).await?;
            break;
        }

        match session.submit(line).await {
            Ok(reason) => {
                if matches!(reason, turnloop_runtime::TurnEndReason::Cancelled) {
                    println!("(cancelled)");
                }
            },
            Err(e) => {
                error!(error = %e, "turn failed");
                println!("error: {}", e.to_user_facing().message);
            },
        }
    }

    renderer.abort();
    Ok(())
}

/// Render events published on the session's bus, and answer
/// `permission_request` events by prompting on stdin.
async fn render_events(session: Arc<AgentSession>) {
    let mut rx = session.subscribe();
    while let Some(event) = rx.recv().await {
        match event.as_ref() {
            AgentEvent::AssistantTextChunk { text, .. } => {
                print!("{text}");
                use std::io::Write;
                std::io::stdout().flush().ok();
            },
            AgentEvent::ToolCallStart { tool_name, .. } => {
                println!("\n[tool] {tool_name}");
            },
            AgentEvent::ToolCallComplete { success, .. } => {
                if !success {
                    println!("[tool failed]");
                }
            },
            AgentEvent::PermissionRequest { metadata, request, .. } => {
                println!(
                    "\npermission requested: {} ({})",
                    request.description, request.candidate_pattern
                );
                println!("allow [o]nce / [a]lways / [d]eny?");
                let outcome = read_permission_choice().await;
                session.respond_permission(metadata.id, outcome);
            },
            AgentEvent::TurnEnded { .. } => {
                println!();
            },
            AgentEvent::TurnError { error, .. } => {
                println!("\nturn error: {}", error.message);
            },
            AgentEvent::CompactionStarted { .. } => {
                println!("\n(compacting context...)");
            },
            AgentEvent::CompactionCompleted { pre_tokens, post_tokens, .. } => {
                println!("(compacted {pre_tokens} -> {post_tokens} tokens)");
            },
            AgentEvent::AssistantThinkingChunk { .. } | AgentEvent::PlanUpdate { .. } | AgentEvent::TurnStarted { .. } => {},
        }
    }
}

async fn read_permission_choice() -> PermissionOutcome {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    match lines.next_line().await {
        Ok(Some(answer)) => match answer.trim().to_lowercase().as_str() {
            "a" | "always" => PermissionOutcome::AllowAlways,
            "o" | "once" | "" | "y" => PermissionOutcome::AllowOnce,
            _ => PermissionOutcome::Deny,
        },
        _ => PermissionOutcome::Deny,
    }
}
