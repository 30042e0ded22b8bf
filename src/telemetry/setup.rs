//! Telemetry startup.
//!
//! # Data Flow
//! ```text
//! telemetry.enabled = false → no-op teardown, empty handles
//! telemetry.enabled = true
//!     → require per-signal switches
//!     → Resource (service name, version, host, pid)
//!     → SubsystemSequencer: traces → metrics → logs
//!         each: resolve exporter settings → build exporter → spawn pipeline
//!     → Telemetry { handles, teardown }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::keys::*;
use crate::config::{Config, ConfigError};
use crate::error::{BoxError, MultiError};
use crate::lifecycle::sequencer::{teardown_fn, CompositeTeardown, Subsystem, SubsystemSequencer, TeardownFn};
use crate::telemetry::exporter::build_exporter;
use crate::telemetry::logs::LogBridge;
use crate::telemetry::metrics::{Meter, PeriodicReader, DEFAULT_READ_INTERVAL};
use crate::telemetry::pipeline::{BatchConfig, BatchPipeline};
use crate::telemetry::resource::Resource;
use crate::telemetry::settings::{ExporterSettings, Signal};
use crate::telemetry::traces::Tracer;
use crate::telemetry::TelemetryHandles;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("telemetry configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("telemetry initialization failed: {0}")]
    Init(#[from] MultiError),
}

/// Running telemetry: handles for instrumentation and the teardown that
/// flushes and closes every pipeline.
#[derive(Debug)]
pub struct Telemetry {
    pub handles: TelemetryHandles,
    pub teardown: CompositeTeardown,
}

impl Telemetry {
    pub fn disabled() -> Self {
        Self {
            handles: TelemetryHandles::default(),
            teardown: CompositeTeardown::noop(),
        }
    }
}

/// Shared state for the signal subsystems.
pub struct TelemetryContext {
    pub config: Config,
    pub resource: Arc<Resource>,
    pub bridge: LogBridge,
    pub batch: BatchConfig,
    pub handles: TelemetryHandles,
}

struct SignalSubsystem {
    signal: Signal,
}

#[async_trait]
impl Subsystem<TelemetryContext> for SignalSubsystem {
    fn name(&self) -> &str {
        self.signal.name()
    }

    async fn init(self: Box<Self>, ctx: &mut TelemetryContext) -> Result<Option<TeardownFn>, BoxError> {
        let signal = self.signal;
        if !ctx.config.get(&signal.switch())? {
            tracing::info!(signal = %signal, "Telemetry signal disabled");
            return Ok(None);
        }

        let settings = ExporterSettings::resolve(&ctx.config, signal)?;
        let exporter = build_exporter(&settings)?;

        let teardown = match signal {
            Signal::Traces => {
                let (sender, pipeline) =
                    BatchPipeline::spawn(signal, ctx.resource.clone(), exporter, ctx.batch);
                ctx.handles.tracer = Some(Tracer::new(sender));
                teardown_fn(move |token| pipeline.shutdown(token))
            }
            Signal::Metrics => {
                let meter = Meter::new();
                let reader = PeriodicReader::spawn(
                    meter.clone(),
                    ctx.resource.clone(),
                    exporter,
                    DEFAULT_READ_INTERVAL,
                );
                ctx.handles.meter = Some(meter);
                teardown_fn(move |token| reader.shutdown(token))
            }
            Signal::Logs => {
                let (sender, pipeline) =
                    BatchPipeline::spawn(signal, ctx.resource.clone(), exporter, ctx.batch);
                ctx.bridge.attach(sender);
                ctx.handles.logs = Some(ctx.bridge.clone());
                let bridge = ctx.bridge.clone();
                teardown_fn(move |token| async move {
                    bridge.detach();
                    pipeline.shutdown(token).await
                })
            }
        };

        Ok(Some(teardown))
    }
}

/// Start telemetry as configured. `ctx` is handed to teardowns run while
/// unwinding a failed startup.
pub async fn setup(ctx: &CancellationToken, config: &Config, bridge: LogBridge) -> Result<Telemetry, TelemetryError> {
    setup_with_batch(ctx, config, bridge, BatchConfig::default()).await
}

/// [`setup`] with explicit batching limits for spans and log records.
pub async fn setup_with_batch(
    ctx: &CancellationToken,
    config: &Config,
    bridge: LogBridge,
    batch: BatchConfig,
) -> Result<Telemetry, TelemetryError> {
    let enabled = config.get(&TELEMETRY_ENABLED)?;
    if !enabled {
        tracing::info!("Telemetry disabled");
        return Ok(Telemetry::disabled());
    }

    let switches = Signal::ALL.map(|signal| signal.switch());
    config.require(&[&switches[0], &switches[1], &switches[2]])?;

    let resource = Resource::from_config(config)?;
    tracing::info!(
        service = resource.get("service.name").unwrap_or_default(),
        "Starting telemetry"
    );

    let mut context = TelemetryContext {
        config: config.clone(),
        resource: Arc::new(resource),
        bridge,
        batch,
        handles: TelemetryHandles::default(),
    };

    let teardown = Signal::ALL
        .into_iter()
        .fold(SubsystemSequencer::new("telemetry"), |sequencer, signal| {
            sequencer.with(SignalSubsystem { signal })
        })
        .start(&mut context, ctx.clone())
        .await?;

    Ok(Telemetry {
        handles: context.handles,
        teardown,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled(extra: &[(&'static str, &'static str)]) -> Config {
        let mut pairs = vec![
            ("telemetry.enabled", "true"),
            ("telemetry.traces.enabled", "true"),
            ("telemetry.metrics.enabled", "true"),
            ("telemetry.logs.enabled", "true"),
        ];
        pairs.extend_from_slice(extra);
        Config::from_pairs(pairs)
    }

    #[tokio::test]
    async fn test_disabled_short_circuit() {
        let config = Config::from_pairs([("telemetry.enabled", "false")]);
        let telemetry = setup(&CancellationToken::new(), &config, LogBridge::new()).await.unwrap();
        assert!(telemetry.teardown.is_empty());
        assert!(telemetry.handles.tracer.is_none());
    }

    #[tokio::test]
    async fn test_missing_master_switch() {
        let err = setup(&CancellationToken::new(), &Config::new(), LogBridge::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TelemetryError::Config(ConfigError::MissingKey(ref k)) if k == "telemetry.enabled"));
    }

    #[tokio::test]
    async fn test_missing_signal_switches() {
        let config = Config::from_pairs([("telemetry.enabled", "true"), ("telemetry.traces.enabled", "true")]);
        let err = setup(&CancellationToken::new(), &config, LogBridge::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TelemetryError::Config(ConfigError::MissingKeys(ref keys)) if keys.len() == 2));
    }

    #[tokio::test]
    async fn test_all_signals_started_and_torn_down() {
        let bridge = LogBridge::new();
        let mut telemetry = setup(&CancellationToken::new(), &enabled(&[]), bridge.clone())
            .await
            .unwrap();

        assert_eq!(telemetry.teardown.pending(), vec!["traces", "metrics", "logs"]);
        assert!(telemetry.handles.tracer.is_some());
        assert!(telemetry.handles.meter.is_some());
        assert!(bridge.is_attached());

        telemetry.teardown.run(CancellationToken::new()).await.unwrap();
        assert!(!bridge.is_attached());
        // Second run has nothing left to do.
        telemetry.teardown.run(CancellationToken::new()).await.unwrap();
    }

    #[tokio::test]
    async fn test_signal_switch_off_skips_subsystem() {
        let config = enabled(&[("telemetry.metrics.enabled", "false")]);
        let mut telemetry = setup(&CancellationToken::new(), &config, LogBridge::new()).await.unwrap();
        assert_eq!(telemetry.teardown.pending(), vec!["traces", "logs"]);
        assert!(telemetry.handles.meter.is_none());
        telemetry.teardown.run(CancellationToken::new()).await.unwrap();
    }

    #[tokio::test]
    async fn test_bad_protocol_unwinds_started_signals() {
        let bridge = LogBridge::new();
        let config = enabled(&[
            ("telemetry.exporter.enabled", "true"),
            ("telemetry.exporter.endpoint", "http://127.0.0.1:4318"),
            ("telemetry.metrics.protocol", "grpc"),
        ]);

        let err = setup(&CancellationToken::new(), &config, bridge.clone())
            .await
            .unwrap_err();
        match err {
            TelemetryError::Init(errors) => {
                assert_eq!(errors.len(), 1);
                assert!(errors.to_string().contains("grpc"));
            }
            other => panic!("unexpected: {:?}", other),
        }
        // Logs never started, so nothing was attached.
        assert!(!bridge.is_attached());
    }
}
