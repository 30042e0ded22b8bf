//! HTTP server setup and lifecycle.
//!
//! # Responsibilities
//! - Build the Axum router with the registered routes and middleware
//! - Bind `0.0.0.0:<port>` and serve until stopped
//! - Drain gracefully on stop; force close when the stop deadline passes
//!
//! # States
//! ```text
//! Idle ──serve──▶ Serving ──stop / failure──▶ Finished
//!   └────────────stop before serve────────────▶ Finished
//! ```

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::Request;
use axum::http::HeaderName;
use axum::{middleware, Extension, Router};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::{RequestBodyTimeoutLayer, ResponseBodyTimeoutLayer, TimeoutBody, TimeoutLayer};
use tower_http::trace::{DefaultOnResponse, TraceLayer};
use tower_http::LatencyUnit;
use tracing::Level;

use crate::config::keys::*;
use crate::config::{Config, ConfigError};
use crate::http::middleware::{instrument, resolve_client_ip, ClientIp};
use crate::http::routes::RouteRegistry;
use crate::lifecycle::runner::{Listener, ServeError};
use crate::lifecycle::shutdown::{StopContext, StopError, Stoppable};
use crate::net::client_ip::parse_header_list;
use crate::telemetry::TelemetryHandles;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Server settings read from configuration. A zero timeout disables it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub port: u16,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub request_timeout: Duration,
    pub shutdown_timeout: Duration,
    /// Headers consulted for the client address; empty means the defaults.
    pub real_ip_headers: Vec<String>,
}

impl ServerSettings {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let port = config.get(&SERVER_PORT)?;
        let port = u16::try_from(port).map_err(|_| ConfigError::Invalid {
            key: SERVER_PORT.key().to_string(),
            expected: "port number",
            found: port.to_string(),
        })?;

        Ok(Self {
            port,
            read_timeout: config.duration_secs(&SERVER_READ_TIMEOUT)?,
            write_timeout: config.duration_secs(&SERVER_WRITE_TIMEOUT)?,
            request_timeout: config.duration_secs(&SERVER_REQUEST_TIMEOUT)?,
            shutdown_timeout: config.duration_secs(&SERVER_SHUTDOWN_TIMEOUT)?,
            real_ip_headers: parse_header_list(&config.get_or(&HTTP_REAL_IP_HEADERS, String::new())?),
        })
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.port))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Idle,
    Serving(SocketAddr),
    Finished,
}

/// The HTTP listener.
pub struct HttpServer {
    settings: ServerSettings,
    router: Mutex<Option<Router>>,
    drain: CancellationToken,
    force: CancellationToken,
    state: watch::Sender<ServerState>,
}

impl HttpServer {
    pub fn new(settings: ServerSettings, routes: RouteRegistry, telemetry: TelemetryHandles) -> Self {
        let router = Self::build_router(&settings, routes, telemetry);
        let (state, _) = watch::channel(ServerState::Idle);

        Self {
            settings,
            router: Mutex::new(Some(router)),
            drain: CancellationToken::new(),
            force: CancellationToken::new(),
            state,
        }
    }

    /// Wire the registered routes and the middleware stack.
    #[allow(deprecated)]
    fn build_router(settings: &ServerSettings, routes: RouteRegistry, telemetry: TelemetryHandles) -> Router {
        let check_headers: Arc<[String]> = settings.real_ip_headers.clone().into();

        let trace = TraceLayer::new_for_http()
            .make_span_with(|req: &Request| {
                let request_id = req
                    .headers()
                    .get(&X_REQUEST_ID)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default();
                let client_ip = req
                    .extensions()
                    .get::<ClientIp>()
                    .map(ClientIp::display)
                    .unwrap_or_default();
                tracing::info_span!(
                    "http_request",
                    method = %req.method(),
                    uri = %req.uri(),
                    request_id = %request_id,
                    client_ip = %client_ip,
                )
            })
            .on_response(
                DefaultOnResponse::new()
                    .level(Level::INFO)
                    .latency_unit(LatencyUnit::Millis),
            );

        let mut router = routes.into_router();

        // Innermost first: body timeouts, then the overall request timeout.
        if !settings.write_timeout.is_zero() {
            router = router.layer(ResponseBodyTimeoutLayer::new(settings.write_timeout));
        }
        if !settings.read_timeout.is_zero() {
            router = router.layer(
                ServiceBuilder::new()
                    .layer(RequestBodyTimeoutLayer::new(settings.read_timeout))
                    .map_request(|req: Request<TimeoutBody<Body>>| req.map(Body::new)),
            );
        }
        if !settings.request_timeout.is_zero() {
            router = router.layer(TimeoutLayer::new(settings.request_timeout));
        }

        router.layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid))
                .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
                .layer(CatchPanicLayer::new())
                .layer(middleware::from_fn_with_state(check_headers, resolve_client_ip))
                .layer(trace)
                .layer(middleware::from_fn_with_state(telemetry, instrument)),
        )
    }

    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }

    pub fn state(&self) -> ServerState {
        *self.state.borrow()
    }

    /// The bound address once serving.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match self.state() {
            ServerState::Serving(addr) => Some(addr),
            _ => None,
        }
    }

    /// Wait until the server is serving (returns its address) or finished.
    pub async fn ready(&self) -> Option<SocketAddr> {
        let mut rx = self.state.subscribe();
        let state = rx
            .wait_for(|s| !matches!(s, ServerState::Idle))
            .await
            .map(|s| *s)
            .unwrap_or(ServerState::Finished);
        match state {
            ServerState::Serving(addr) => Some(addr),
            _ => None,
        }
    }

    async fn serve_inner(&self, base: CancellationToken) -> Result<(), ServeError> {
        let router = self
            .router
            .lock()
            .ok()
            .and_then(|mut slot| slot.take())
            .ok_or_else(|| ServeError::Other("server already started".into()))?;

        if self.drain.is_cancelled() {
            tracing::info!("Server stopped before it started serving");
            return Ok(());
        }

        let addr = self.settings.bind_addr();
        let listener = TcpListener::bind(addr).await.map_err(|source| ServeError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        let local = listener.local_addr().map_err(ServeError::Accept)?;

        tracing::info!(address = %local, "HTTP server listening");
        self.state.send_replace(ServerState::Serving(local));

        let app = router
            .layer(Extension(base))
            .into_make_service_with_connect_info::<SocketAddr>();
        let drain = self.drain.clone();
        let serving = axum::serve(listener, app)
            .with_graceful_shutdown(async move { drain.cancelled().await })
            .into_future();

        tokio::select! {
            result = serving => result.map_err(ServeError::Accept),
            _ = self.force.cancelled() => {
                tracing::warn!("HTTP server force closed; in-flight connections dropped");
                Ok(())
            }
        }
    }
}

#[async_trait]
impl Listener for HttpServer {
    async fn serve(&self, base: CancellationToken) -> Result<(), ServeError> {
        let result = self.serve_inner(base).await;
        self.state.send_replace(ServerState::Finished);
        tracing::info!("HTTP server stopped");
        result
    }
}

#[async_trait]
impl Stoppable for HttpServer {
    async fn stop(&self, ctx: &StopContext) -> Result<(), StopError> {
        if self.drain.is_cancelled() || self.state() == ServerState::Finished {
            return Err(StopError::Closed);
        }
        self.drain.cancel();

        // Never served: nothing to drain.
        if self.state() == ServerState::Idle {
            return Ok(());
        }

        let mut rx = self.state.subscribe();
        tokio::select! {
            _ = rx.wait_for(|s| *s == ServerState::Finished) => Ok(()),
            cause = ctx.done() => {
                self.force.cancel();
                Err(cause.into())
            }
        }
    }
}
