//! Metrics collection and periodic export.
//!
//! # Metrics
//! - `http_server_requests_total` (counter): requests by method, route, status
//! - `http_server_request_duration_seconds` (histogram): latency distribution
//!
//! # Design Decisions
//! - The recorder is owned by the [`Meter`], never installed globally
//! - Export sends the rendered Prometheus exposition on every tick and once
//!   more on shutdown

use std::sync::Arc;
use std::time::Duration;

use metrics::{Counter, Histogram, Label};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle, PrometheusRecorder};
use serde_json::json;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::BoxError;
use crate::telemetry::exporter::{ExportBatch, Exporter, ExporterError};
use crate::telemetry::resource::Resource;
use crate::telemetry::settings::Signal;

pub const REQUESTS_TOTAL: &str = "http_server_requests_total";
pub const REQUEST_DURATION: &str = "http_server_request_duration_seconds";

pub const DEFAULT_READ_INTERVAL: Duration = Duration::from_secs(3);

/// Handle for recording metrics into a private recorder.
#[derive(Clone)]
pub struct Meter {
    recorder: Arc<PrometheusRecorder>,
    handle: PrometheusHandle,
}

impl std::fmt::Debug for Meter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Meter").finish_non_exhaustive()
    }
}

impl Default for Meter {
    fn default() -> Self {
        Self::new()
    }
}

impl Meter {
    pub fn new() -> Self {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        Self {
            recorder: Arc::new(recorder),
            handle,
        }
    }

    pub fn counter(&self, name: &'static str, labels: Vec<Label>) -> Counter {
        metrics::with_local_recorder(self.recorder.as_ref(), || metrics::counter!(name, labels))
    }

    pub fn histogram(&self, name: &'static str, labels: Vec<Label>) -> Histogram {
        metrics::with_local_recorder(self.recorder.as_ref(), || metrics::histogram!(name, labels))
    }

    /// Record one served HTTP request.
    pub fn record_request(&self, method: &str, route: &str, status: u16, elapsed: Duration) {
        let labels = vec![
            Label::new("method", method.to_string()),
            Label::new("route", route.to_string()),
            Label::new("status", status.to_string()),
        ];
        self.counter(REQUESTS_TOTAL, labels.clone()).increment(1);
        self.histogram(REQUEST_DURATION, labels).record(elapsed.as_secs_f64());
    }

    /// Current state in Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.run_upkeep();
        self.handle.render()
    }
}

/// Periodically exports the meter's state.
#[derive(Debug)]
pub struct PeriodicReader {
    closer: CancellationToken,
    task: JoinHandle<Result<(), ExporterError>>,
}

impl PeriodicReader {
    pub fn spawn(
        meter: Meter,
        resource: Arc<Resource>,
        exporter: Arc<dyn Exporter>,
        interval: Duration,
    ) -> Self {
        let closer = CancellationToken::new();
        let stop = closer.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; nothing has been recorded yet.
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = collect(&meter, &resource, exporter.as_ref()).await {
                            tracing::warn!(error = %e, "Metrics export failed");
                        }
                    }
                }
            }

            let result = collect(&meter, &resource, exporter.as_ref()).await;
            result.and(exporter.shutdown().await)
        });

        Self { closer, task }
    }

    /// Export a final collection and stop, giving up when `token` is cancelled.
    pub async fn shutdown(self, token: CancellationToken) -> Result<(), BoxError> {
        self.closer.cancel();
        let mut task = self.task;

        tokio::select! {
            joined = &mut task => match joined {
                Ok(result) => result.map_err(Into::into),
                Err(e) => Err(e.into()),
            },
            _ = token.cancelled() => {
                task.abort();
                Err("metrics reader shutdown cancelled".into())
            }
        }
    }
}

async fn collect(meter: &Meter, resource: &Resource, exporter: &dyn Exporter) -> Result<(), ExporterError> {
    let records = [json!({
        "format": "prometheus",
        "exposition": meter.render(),
    })];
    exporter
        .export(&ExportBatch {
            signal: Signal::Metrics.name(),
            resource,
            records: &records,
        })
        .await
}
