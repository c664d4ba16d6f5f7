//! Graceful shutdown wiring (spec §4.9: SIGTERM, and SIGINT while
//! non-interactive, trigger graceful shutdown; cleanup runs LIFO within a
//! bounded deadline; terminal state is always restored).
//!
//! Grounded in the teacher's `astrid-cli`/daemon shutdown pattern: a
//! `tokio::select!` over the signal futures and the run future, followed by
//! a sequential run of registered cleanup closures.

use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};

/// How long cleanup handlers collectively get before we give up and exit
/// anyway (spec §4.9 "5-second deadline").
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(5);

/// Wait for SIGTERM or Ctrl-C.
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = term.recv() => info!("received SIGTERM"),
            _ = tokio::signal::ctrl_c() => info!("received SIGINT"),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("received ctrl-c");
    }
}

/// Run `work` to completion, racing it against an OS shutdown signal. If
/// the signal arrives first, `cleanup` runs (LIFO order is the caller's
/// responsibility — push handlers in the order they should run) and this
/// returns `Ok(true)` to signal an interrupted exit; otherwise `work`'s own
/// result is returned unwrapped, tagged `false`.
pub async fn run_with_graceful_shutdown<F, C>(work: F, cleanup: C) -> Result<bool>
where
    F: std::future::Future<Output = Result<()>>,
    C: std::future::Future<Output = ()>,
{
    tokio::select! {
        result = work => {
            result?;
            Ok(false)
        }
        () = wait_for_signal() => {
            let outcome = tokio::time::timeout(SHUTDOWN_DEADLINE, cleanup).await;
            if outcome.is_err() {
                warn!("cleanup did not finish within the shutdown deadline, exiting anyway");
            }
            Ok(true)
        }
    }
}
