//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::post;
use axum::Router;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use runway::config::Config;
use runway::lifecycle::{Listener, ServeError, StopContext, StopError, Stoppable};

/// A port that was free a moment ago.
pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("0.0.0.0:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Minimal server configuration (timeouts in seconds).
pub fn server_config(port: u16, shutdown_secs: u64) -> Config {
    Config::from_pairs([
        ("server.port", port.to_string()),
        ("server.read_timeout", "5".to_string()),
        ("server.write_timeout", "5".to_string()),
        ("server.request_timeout", "10".to_string()),
        ("server.shutdown_timeout", shutdown_secs.to_string()),
    ])
}

/// Client that never goes through a proxy.
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

/// Poll until something accepts connections on `port`.
pub async fn wait_for_port(port: u16) {
    for _ in 0..100 {
        if tokio::net::TcpStream::connect(("127.0.0.1", port)).await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("nothing listening on port {}", port);
}

/// How a [`ScriptedListener`] serves.
#[derive(Clone)]
pub enum ServeScript {
    /// Serve until stopped.
    UntilStopped,
    /// Fail right away.
    FailImmediately(&'static str),
    /// Fail once the base token is cancelled.
    FailOnCancel(&'static str),
}

/// How a [`ScriptedListener`] stops.
#[derive(Clone)]
pub enum StopScript {
    /// Take this long, then succeed.
    After(Duration),
    /// Never drain; wait for the context to expire.
    Hang,
    /// Fail with this message.
    Fail(&'static str),
}

/// Listener double with scripted serve/stop behavior.
pub struct ScriptedListener {
    serve: ServeScript,
    stop: StopScript,
    stopped: CancellationToken,
    finished: CancellationToken,
    pub stop_calls: AtomicUsize,
    pub events: Mutex<Vec<String>>,
}

impl ScriptedListener {
    pub fn new(serve: ServeScript, stop: StopScript) -> Arc<Self> {
        Arc::new(Self {
            serve,
            stop,
            stopped: CancellationToken::new(),
            finished: CancellationToken::new(),
            stop_calls: AtomicUsize::new(0),
            events: Mutex::new(Vec::new()),
        })
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn record(&self, event: &str) {
        self.events.lock().unwrap().push(event.to_string());
    }
}

fn failure(msg: &'static str) -> ServeError {
    ServeError::Other(msg.into())
}

#[async_trait]
impl Listener for ScriptedListener {
    async fn serve(&self, base: CancellationToken) -> Result<(), ServeError> {
        self.record("serve");
        let result = match &self.serve {
            ServeScript::UntilStopped => {
                self.stopped.cancelled().await;
                Ok(())
            }
            ServeScript::FailImmediately(msg) => Err(failure(*msg)),
            ServeScript::FailOnCancel(msg) => {
                base.cancelled().await;
                Err(failure(*msg))
            }
        };
        self.finished.cancel();
        result
    }
}

#[async_trait]
impl Stoppable for ScriptedListener {
    async fn stop(&self, ctx: &StopContext) -> Result<(), StopError> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.record("stop");
        if let StopScript::Fail(msg) = &self.stop {
            return Err(StopError::Failed((*msg).into()));
        }
        if self.finished.is_cancelled() {
            return Err(StopError::Closed);
        }

        match &self.stop {
            StopScript::After(delay) => {
                tokio::time::sleep(*delay).await;
                self.stopped.cancel();
                Ok(())
            }
            StopScript::Hang => Err(ctx.done().await.into()),
            StopScript::Fail(_) => unreachable!(),
        }
    }
}

/// A telemetry request captured by [`Collector`].
#[derive(Debug, Clone)]
pub struct Captured {
    pub path: String,
    pub headers: HeaderMap,
    pub body: Value,
}

/// Mock collector accepting `POST /v1/<signal>`.
#[derive(Clone, Default)]
pub struct Collector {
    received: Arc<Mutex<Vec<Captured>>>,
}

impl Collector {
    /// Start on an ephemeral port; returns the collector and its base URL.
    pub async fn start() -> (Self, String) {
        let collector = Self::default();
        let app = Router::new()
            .route("/v1/{signal}", post(capture))
            .with_state(collector.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (collector, format!("http://{}", addr))
    }

    pub fn received(&self) -> Vec<Captured> {
        self.received.lock().unwrap().clone()
    }

    pub fn for_signal(&self, signal: &str) -> Vec<Captured> {
        let path = format!("/v1/{}", signal);
        self.received().into_iter().filter(|c| c.path == path).collect()
    }
}

async fn capture(
    State(collector): State<Collector>,
    Path(signal): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> &'static str {
    let body = serde_json::from_slice(&body).unwrap_or(Value::Null);
    collector.received.lock().unwrap().push(Captured {
        path: format!("/v1/{}", signal),
        headers,
        body,
    });
    "ok"
}
