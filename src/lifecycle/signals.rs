//! OS signal handling.
//!
//! # Responsibilities
//! - Watch SIGHUP, SIGINT, SIGTERM and SIGQUIT (Ctrl-C elsewhere)
//! - Translate the first one observed into cancellation of a token
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - One-shot: after the first signal the observer exits
//! - Every termination signal takes the same path; none of them reloads config

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Handle to a running signal observer. Dropping it stops observation.
#[derive(Debug)]
pub struct SignalObserver {
    task: Option<JoinHandle<()>>,
}

impl SignalObserver {
    /// Start observing termination signals; the first one cancels `token`.
    ///
    /// The observer also exits once `token` is cancelled by anyone else.
    pub fn spawn(token: CancellationToken) -> Self {
        let task = tokio::spawn(async move {
            tokio::select! {
                signal = wait_for_termination() => {
                    match signal {
                        Ok(name) => {
                            tracing::info!(signal = name, "Termination signal received");
                            token.cancel();
                        }
                        Err(e) => tracing::error!(error = %e, "Failed to install signal handlers"),
                    }
                }
                _ = token.cancelled() => {}
            }
        });

        Self { task: Some(task) }
    }

    /// Stop observing signals. Safe to call more than once.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for SignalObserver {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(unix)]
async fn wait_for_termination() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut quit = signal(SignalKind::quit())?;

    let name = tokio::select! {
        _ = hangup.recv() => "SIGHUP",
        _ = interrupt.recv() => "SIGINT",
        _ = terminate.recv() => "SIGTERM",
        _ = quit.recv() => "SIGQUIT",
    };
    Ok(name)
}

#[cfg(not(unix))]
async fn wait_for_termination() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}
