//! Bounded-time shutdown of a single stoppable resource.
//!
//! # Responsibilities
//! - Derive a deadline-bound [`StopContext`] from an ambient cancellation token
//! - Invoke the resource's `stop` with it
//! - Treat "already closed" as success; hand every other error back unchanged

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::BoxError;

/// Stand-in deadline for budgets too large to add to the current instant.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Why a [`StopContext`] is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContextError {
    /// The stop budget ran out.
    #[error("context deadline exceeded")]
    DeadlineExceeded,
    /// The ambient token was cancelled.
    #[error("context canceled")]
    Cancelled,
}

/// Errors reported by [`Stoppable::stop`].
#[derive(Debug, Error)]
pub enum StopError {
    /// The resource had already finished closing through another path.
    #[error("resource already closed")]
    Closed,

    /// The stop context expired or was cancelled before the resource drained.
    #[error("stop interrupted: {0}")]
    Context(#[from] ContextError),

    /// Any other failure while stopping.
    #[error("stop failed: {0}")]
    Failed(#[source] BoxError),
}

impl StopError {
    /// The context cause behind this error, if any.
    pub fn context_error(&self) -> Option<ContextError> {
        match self {
            StopError::Context(cause) => Some(*cause),
            _ => None,
        }
    }

    pub fn is_deadline_exceeded(&self) -> bool {
        self.context_error() == Some(ContextError::DeadlineExceeded)
    }

    pub fn is_cancelled(&self) -> bool {
        self.context_error() == Some(ContextError::Cancelled)
    }
}

/// A deadline-bound cancellation signal handed to [`Stoppable::stop`].
///
/// Done when either the deadline passes or the parent token is cancelled.
#[derive(Debug, Clone)]
pub struct StopContext {
    token: CancellationToken,
    deadline: Instant,
}

impl StopContext {
    /// Derive a context from `parent` that expires after `timeout`.
    ///
    /// A timeout past the clock's range saturates to a deadline decades out.
    pub fn with_timeout(parent: &CancellationToken, timeout: Duration) -> Self {
        let now = Instant::now();
        Self {
            token: parent.child_token(),
            deadline: now.checked_add(timeout).unwrap_or(now + FAR_FUTURE),
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left before the deadline (zero once it has passed).
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// The current state without waiting. Cancellation is reported ahead of an
    /// elapsed deadline.
    pub fn err(&self) -> Option<ContextError> {
        if self.token.is_cancelled() {
            Some(ContextError::Cancelled)
        } else if Instant::now() >= self.deadline {
            Some(ContextError::DeadlineExceeded)
        } else {
            None
        }
    }

    /// Wait until the context is done and report why.
    pub async fn done(&self) -> ContextError {
        if let Some(cause) = self.err() {
            return cause;
        }
        tokio::select! {
            _ = self.token.cancelled() => ContextError::Cancelled,
            _ = tokio::time::sleep_until(self.deadline) => ContextError::DeadlineExceeded,
        }
    }
}

/// A resource that can be stopped once, honoring a [`StopContext`].
#[async_trait]
pub trait Stoppable: Send + Sync {
    async fn stop(&self, ctx: &StopContext) -> Result<(), StopError>;
}

/// Stop `resource` within `timeout`, derived from `parent`.
///
/// A zero timeout is legal: the context is already expired, but `stop` is still
/// called so draining attempts happen.
pub async fn shutdown_with_timeout<R>(
    parent: &CancellationToken,
    resource: &R,
    timeout: Duration,
) -> Result<(), StopError>
where
    R: Stoppable + ?Sized,
{
    tracing::info!(timeout = ?timeout, "Initiating shutdown");

    let ctx = StopContext::with_timeout(parent, timeout);
    let result = resource.stop(&ctx).await;

    match result {
        Ok(()) => {
            tracing::info!("Shutdown completed gracefully");
            Ok(())
        }
        Err(StopError::Closed) => {
            tracing::info!("Resource was already closed");
            Ok(())
        }
        Err(err) => {
            match err.context_error() {
                Some(ContextError::DeadlineExceeded) => tracing::warn!(
                    timeout = ?timeout,
                    "Shutdown deadline exceeded; resource took too long to drain"
                ),
                Some(ContextError::Cancelled) => {
                    tracing::warn!("Shutdown was cancelled by its parent")
                }
                None => tracing::error!(error = %err, "Error during shutdown"),
            }
            Err(err)
        }
    }
}
