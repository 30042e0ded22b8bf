//! Listener lifecycle orchestration.
//!
//! # State Machine
//! ```text
//! Starting ──▶ Serving ──▶ AwaitingTermination ──▶ ShuttingDown ──▶ Stopped
//!    │                          │                        │
//!    │ config / registration    │ first of:              │ timed stop on a
//!    │ errors abort here        │ - listener outcome     │ fresh token
//!    │                          │ - base token cancelled │
//!    ▼                          ▼                        ▼
//!  Err(Config|Registration)   TerminationCause        reconcile
//! ```
//!
//! # Design Decisions
//! - A listener failure is always the primary error; a shutdown error after it
//!   is only logged
//! - Shutdown runs on its own deadline so a cancelled base token can't cut it short
//! - OS signals stop being observed as soon as termination starts

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;

use crate::config::keys::*;
use crate::config::{Config, ConfigError, Key};
use crate::error::BoxError;
use crate::features::{FeatureProvider, NoopProvider};
use crate::http::{HttpServer, RouteRegistry, ServerSettings};
use crate::lifecycle::shutdown::{shutdown_with_timeout, StopError, Stoppable};
use crate::lifecycle::signals::SignalObserver;
use crate::telemetry::TelemetryHandles;

/// How long to wait for the serve task to return after it has been stopped.
const SERVE_EXIT_GRACE: Duration = Duration::from_secs(1);

/// Failures of the serving side of a listener.
#[derive(Debug, Error)]
pub enum ServeError {
    /// The listening socket could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Accepting or serving connections failed.
    #[error("failed to serve: {0}")]
    Accept(#[source] std::io::Error),

    /// The serve task itself failed (panicked or was aborted).
    #[error("listener task failed: {0}")]
    Task(#[from] JoinError),

    #[error("listener failed: {0}")]
    Other(#[source] BoxError),
}

impl ServeError {
    /// The underlying IO error kind, if this is an IO failure.
    pub fn io_kind(&self) -> Option<std::io::ErrorKind> {
        match self {
            ServeError::Bind { source, .. } => Some(source.kind()),
            ServeError::Accept(e) => Some(e.kind()),
            _ => None,
        }
    }
}

/// Everything [`run_listener`] and [`Runner::run`] can report.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("route registration failed: {0}")]
    Registration(#[source] BoxError),

    #[error(transparent)]
    Listener(#[from] ServeError),

    #[error("shutdown failed: {0}")]
    Shutdown(#[from] StopError),
}

/// Why serving ended.
#[derive(Debug)]
pub enum TerminationCause {
    /// The base token was cancelled (OS signal or caller).
    SignalReceived,
    /// The listener stopped on its own with an error.
    ResourceFailed(ServeError),
    /// The listener stopped on its own without an error.
    ResourceClosedCleanly,
}

/// A listener that serves until stopped.
///
/// `serve` returning `Ok` means it was closed deliberately.
#[async_trait]
pub trait Listener: Stoppable + 'static {
    async fn serve(&self, base: CancellationToken) -> Result<(), ServeError>;
}

fn classify(outcome: Result<Result<(), ServeError>, JoinError>) -> TerminationCause {
    match outcome {
        Ok(Ok(())) => TerminationCause::ResourceClosedCleanly,
        Ok(Err(e)) => TerminationCause::ResourceFailed(e),
        Err(e) => TerminationCause::ResourceFailed(ServeError::Task(e)),
    }
}

/// Run `listener` until it fails or `ctx` (or an OS termination signal) asks
/// it to stop, then stop it within `shutdown_timeout`.
pub async fn run_listener<L>(
    ctx: &CancellationToken,
    listener: Arc<L>,
    shutdown_timeout: Duration,
) -> Result<(), RunError>
where
    L: Listener,
{
    // Starting
    let base = ctx.child_token();
    let mut signals = SignalObserver::spawn(base.clone());

    let serving = listener.clone();
    let serve_base = base.clone();
    let mut serve_task = tokio::spawn(async move { serving.serve(serve_base).await });
    tracing::info!("Listener serving");

    // Serving / AwaitingTermination
    let (cause, task_done) = tokio::select! {
        biased;
        outcome = &mut serve_task => (classify(outcome), true),
        _ = base.cancelled() => (TerminationCause::SignalReceived, false),
    };
    signals.stop();

    match &cause {
        TerminationCause::SignalReceived => {
            tracing::info!("Shutdown requested; proceeding to shutdown")
        }
        TerminationCause::ResourceFailed(e) => {
            tracing::error!(error = %e, "Listener stopped due to an error")
        }
        TerminationCause::ResourceClosedCleanly => {
            tracing::info!("Listener closed before any shutdown request")
        }
    }

    // ShuttingDown
    let shutdown_result =
        shutdown_with_timeout(&CancellationToken::new(), listener.as_ref(), shutdown_timeout).await;

    // A failure racing the shutdown request still wins.
    let cause = match cause {
        TerminationCause::ResourceFailed(e) => TerminationCause::ResourceFailed(e),
        other if !task_done => match tokio::time::timeout(SERVE_EXIT_GRACE, &mut serve_task).await {
            Ok(outcome) => match classify(outcome) {
                TerminationCause::ResourceFailed(e) => {
                    tracing::error!(error = %e, "Listener failure surfaced during shutdown");
                    TerminationCause::ResourceFailed(e)
                }
                _ => other,
            },
            Err(_) => {
                tracing::warn!("Listener did not exit after shutdown; aborting");
                serve_task.abort();
                other
            }
        },
        other => other,
    };

    // Stopped
    match cause {
        TerminationCause::ResourceFailed(e) => {
            if let Err(shutdown_err) = shutdown_result {
                tracing::error!(
                    error = %shutdown_err,
                    "Additional error during shutdown after listener failure"
                );
            }
            Err(RunError::Listener(e))
        }
        _ => {
            shutdown_result?;
            tracing::info!("Listener stopped");
            Ok(())
        }
    }
}

/// Callback that registers routes before the listener starts.
pub trait RegisterRoutes: Send {
    fn register(self, config: &Config, routes: &mut RouteRegistry) -> Result<(), BoxError>;
}

impl<F> RegisterRoutes for F
where
    F: FnOnce(&Config, &mut RouteRegistry) -> Result<(), BoxError> + Send,
{
    fn register(self, config: &Config, routes: &mut RouteRegistry) -> Result<(), BoxError> {
        self(config, routes)
    }
}

/// Keys [`Runner::run`] refuses to start without.
pub fn required_keys() -> [&'static dyn Key; 5] {
    [
        &SERVER_PORT,
        &SERVER_READ_TIMEOUT,
        &SERVER_WRITE_TIMEOUT,
        &SERVER_REQUEST_TIMEOUT,
        &SERVER_SHUTDOWN_TIMEOUT,
    ]
}

/// Runs the HTTP service from configuration to shutdown.
pub struct Runner {
    config: Config,
    features: Arc<dyn FeatureProvider>,
    telemetry: TelemetryHandles,
}

impl Runner {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            features: Arc::new(NoopProvider),
            telemetry: TelemetryHandles::default(),
        }
    }

    /// Feature provider exposed to route registration.
    pub fn with_features(mut self, features: Arc<dyn FeatureProvider>) -> Self {
        self.features = features;
        self
    }

    /// Telemetry handles used to instrument requests.
    pub fn with_telemetry(mut self, telemetry: TelemetryHandles) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Check configuration, register routes, then serve until `ctx` is
    /// cancelled, a termination signal arrives, or the listener fails.
    pub async fn run<R>(self, ctx: CancellationToken, register: R) -> Result<(), RunError>
    where
        R: RegisterRoutes,
    {
        if let Err(e) = self.config.require(&required_keys()) {
            tracing::error!(error = %e, "Required configuration missing");
            return Err(e.into());
        }
        let settings = ServerSettings::from_config(&self.config)?;

        let mut routes = RouteRegistry::new(self.features.clone());
        if let Err(e) = register.register(&self.config, &mut routes) {
            tracing::error!(error = %e, "Failed to register routes");
            return Err(RunError::Registration(e));
        }

        let shutdown_timeout = settings.shutdown_timeout;
        let server = Arc::new(HttpServer::new(settings, routes, self.telemetry));

        run_listener(&ctx, server, shutdown_timeout).await
    }
}
