//! Exporters deliver batches of telemetry records to their destination.
//!
//! # Responsibilities
//! - Pick stdout or HTTP delivery from resolved [`ExporterSettings`]
//! - Serialize every batch as one JSON document
//! - Apply configured headers and timeout to remote delivery

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::telemetry::resource::Resource;
use crate::telemetry::settings::{ExporterSettings, Signal};

#[derive(Debug, Error)]
pub enum ExporterError {
    #[error("unsupported {signal} exporter protocol: {protocol}")]
    UnsupportedProtocol { signal: Signal, protocol: String },

    #[error("invalid {signal} exporter endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint {
        signal: Signal,
        endpoint: String,
        reason: String,
    },

    #[error("invalid exporter header {0:?}")]
    InvalidHeader(String),

    #[error("HTTP export failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One delivery: records of a single signal plus the resource that produced them.
#[derive(Debug, Serialize)]
pub struct ExportBatch<'a> {
    pub signal: &'static str,
    pub resource: &'a Resource,
    pub records: &'a [Value],
}

#[async_trait]
pub trait Exporter: Send + Sync {
    async fn export(&self, batch: &ExportBatch<'_>) -> Result<(), ExporterError>;

    /// Release resources. Called once, after the final export.
    async fn shutdown(&self) -> Result<(), ExporterError> {
        Ok(())
    }
}

/// Writes each batch as a JSON line to stdout.
#[derive(Debug, Default)]
pub struct StdoutExporter;

#[async_trait]
impl Exporter for StdoutExporter {
    async fn export(&self, batch: &ExportBatch<'_>) -> Result<(), ExporterError> {
        let mut line = serde_json::to_vec(batch)?;
        line.push(b'\n');

        let mut stdout = tokio::io::stdout();
        stdout.write_all(&line).await?;
        stdout.flush().await?;
        Ok(())
    }
}

/// POSTs each batch as JSON to a collector endpoint.
#[derive(Debug)]
pub struct HttpExporter {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpExporter {
    pub fn new(settings: &ExporterSettings) -> Result<Self, ExporterError> {
        let endpoint = signal_url(settings.signal, &settings.endpoint)?;

        let mut headers = HeaderMap::new();
        for (name, value) in &settings.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| ExporterError::InvalidHeader(name.clone()))?;
            let value =
                HeaderValue::from_str(value).map_err(|_| ExporterError::InvalidHeader(name.to_string()))?;
            headers.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl Exporter for HttpExporter {
    async fn export(&self, batch: &ExportBatch<'_>) -> Result<(), ExporterError> {
        self.client
            .post(self.endpoint.clone())
            .json(batch)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// A bare collector address gets the conventional `/v1/<signal>` path.
fn signal_url(signal: Signal, endpoint: &str) -> Result<Url, ExporterError> {
    let invalid = |reason: String| ExporterError::InvalidEndpoint {
        signal,
        endpoint: endpoint.to_string(),
        reason,
    };

    let mut url = Url::parse(endpoint).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme {}", url.scheme())));
    }
    if url.path().is_empty() || url.path() == "/" {
        url.set_path(&format!("/v1/{}", signal.name()));
    }
    Ok(url)
}

/// Keeps every batch in memory. Handy for tests and local inspection.
#[derive(Debug, Clone, Default)]
pub struct InMemoryExporter {
    batches: Arc<Mutex<Vec<Value>>>,
}

impl InMemoryExporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every exported batch, oldest first, as JSON.
    pub fn batches(&self) -> Vec<Value> {
        self.batches.lock().map(|b| b.clone()).unwrap_or_default()
    }

    /// Every record across all batches.
    pub fn records(&self) -> Vec<Value> {
        self.batches()
            .into_iter()
            .filter_map(|batch| match batch.get("records") {
                Some(Value::Array(records)) => Some(records.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }
}

#[async_trait]
impl Exporter for InMemoryExporter {
    async fn export(&self, batch: &ExportBatch<'_>) -> Result<(), ExporterError> {
        let value = serde_json::to_value(batch)?;
        if let Ok(mut batches) = self.batches.lock() {
            batches.push(value);
        }
        Ok(())
    }
}

/// Choose the exporter for one signal.
///
/// Without a remote endpoint (or with the exporter switched off) records go to
/// stdout. Remote delivery supports the HTTP protocols only.
pub fn build_exporter(settings: &ExporterSettings) -> Result<Arc<dyn Exporter>, ExporterError> {
    if !settings.is_remote() {
        if settings.enabled {
            tracing::warn!(
                signal = %settings.signal,
                "Exporter enabled without an endpoint; writing to stdout"
            );
        }
        return Ok(Arc::new(StdoutExporter));
    }

    match settings.protocol.as_str() {
        "http" | "http/json" | "http/protobuf" => {
            let exporter = HttpExporter::new(settings)?;
            tracing::info!(
                signal = %settings.signal,
                endpoint = %exporter.endpoint(),
                protocol = %settings.protocol,
                timeout = ?settings.timeout,
                "HTTP exporter configured"
            );
            Ok(Arc::new(exporter))
        }
        other => Err(ExporterError::UnsupportedProtocol {
            signal: settings.signal,
            protocol: other.to_string(),
        }),
    }
}
