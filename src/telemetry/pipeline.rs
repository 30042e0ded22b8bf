//! Batching export pipeline shared by spans and log records.
//!
//! # Design Decisions
//! - Producers never block: records are offered with `try_send` and dropped
//!   when the queue is full
//! - A batch is exported when it is full or when the flush interval elapses
//! - Export errors while running are logged; only the final flush reports them

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::BoxError;
use crate::telemetry::exporter::{ExportBatch, Exporter, ExporterError};
use crate::telemetry::resource::Resource;
use crate::telemetry::settings::Signal;

/// Batching limits.
#[derive(Debug, Clone, Copy)]
pub struct BatchConfig {
    pub max_batch: usize,
    pub interval: Duration,
    pub queue_capacity: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch: 512,
            interval: Duration::from_secs(1),
            queue_capacity: 2048,
        }
    }
}

/// Producer side of a pipeline.
#[derive(Debug, Clone)]
pub struct RecordSender {
    signal: Signal,
    tx: mpsc::Sender<Value>,
}

impl RecordSender {
    /// Queue a record. Returns `false` if it was dropped.
    pub fn offer(&self, record: Value) -> bool {
        match self.tx.try_send(record) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::debug!(signal = %self.signal, "Telemetry queue full; record dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Owner side of a running pipeline.
#[derive(Debug)]
pub struct BatchPipeline {
    signal: Signal,
    closer: CancellationToken,
    task: JoinHandle<Result<(), ExporterError>>,
}

impl BatchPipeline {
    pub fn spawn(
        signal: Signal,
        resource: Arc<Resource>,
        exporter: Arc<dyn Exporter>,
        config: BatchConfig,
    ) -> (RecordSender, Self) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let closer = CancellationToken::new();

        let task = tokio::spawn(run_worker(
            signal,
            resource,
            exporter,
            config,
            rx,
            closer.clone(),
        ));

        (RecordSender { signal, tx }, Self { signal, closer, task })
    }

    /// Flush what is queued, shut the exporter down and wait for the worker,
    /// giving up when `token` is cancelled.
    pub async fn shutdown(self, token: CancellationToken) -> Result<(), BoxError> {
        self.closer.cancel();
        let signal = self.signal;
        let mut task = self.task;

        tokio::select! {
            joined = &mut task => match joined {
                Ok(result) => result.map_err(Into::into),
                Err(e) => Err(e.into()),
            },
            _ = token.cancelled() => {
                task.abort();
                Err(format!("{} pipeline shutdown cancelled", signal).into())
            }
        }
    }
}

async fn run_worker(
    signal: Signal,
    resource: Arc<Resource>,
    exporter: Arc<dyn Exporter>,
    config: BatchConfig,
    mut rx: mpsc::Receiver<Value>,
    closer: CancellationToken,
) -> Result<(), ExporterError> {
    let max_batch = config.max_batch.max(1);
    let mut buffer: Vec<Value> = Vec::with_capacity(max_batch);
    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = closer.cancelled() => break,
            received = rx.recv() => match received {
                Some(record) => {
                    buffer.push(record);
                    if buffer.len() >= max_batch {
                        export_logged(signal, &resource, exporter.as_ref(), &mut buffer).await;
                    }
                }
                None => break,
            },
            _ = ticker.tick() => {
                if !buffer.is_empty() {
                    export_logged(signal, &resource, exporter.as_ref(), &mut buffer).await;
                }
            }
        }
    }

    // Drain whatever producers managed to queue before the close.
    rx.close();
    while let Ok(record) = rx.try_recv() {
        buffer.push(record);
    }

    let mut result = Ok(());
    for chunk in buffer.chunks(max_batch) {
        if let Err(e) = export(signal, &resource, exporter.as_ref(), chunk).await {
            result = Err(e);
        }
    }
    let shutdown = exporter.shutdown().await;
    tracing::debug!(signal = %signal, "Telemetry pipeline closed");
    result.and(shutdown)
}

async fn export(
    signal: Signal,
    resource: &Resource,
    exporter: &dyn Exporter,
    records: &[Value],
) -> Result<(), ExporterError> {
    exporter
        .export(&ExportBatch {
            signal: signal.name(),
            resource,
            records,
        })
        .await
}

async fn export_logged(signal: Signal, resource: &Resource, exporter: &dyn Exporter, buffer: &mut Vec<Value>) {
    if let Err(e) = export(signal, resource, exporter, buffer).await {
        tracing::warn!(signal = %signal, records = buffer.len(), error = %e, "Telemetry export failed");
    }
    buffer.clear();
}
