//! Telemetry subsystem.
//!
//! # Data Flow
//! ```text
//! Instrumented code:
//!     → Tracer (spans)           → traces pipeline  ┐
//!     → Meter (counters, hists)  → periodic reader  ├→ exporter (stdout | HTTP)
//!     → tracing events → LogBridge → logs pipeline  ┘
//! ```
//!
//! # Design Decisions
//! - No global providers: [`setup`] returns explicit handles that callers pass on
//! - Signals start in a fixed order and tear down in reverse
//! - Exporter settings resolve per signal, then globally, then from defaults

pub mod exporter;
pub mod logs;
pub mod metrics;
pub mod pipeline;
pub mod resource;
pub mod settings;
pub mod setup;
pub mod traces;

pub use self::exporter::{build_exporter, Exporter, ExporterError, InMemoryExporter};
pub use self::logs::LogBridge;
pub use self::metrics::Meter;
pub use self::resource::Resource;
pub use self::settings::{ExporterSettings, Signal};
pub use self::setup::{setup, setup_with_batch, Telemetry, TelemetryError};
pub use self::traces::{Span, SpanContext, Tracer};

/// Handles produced by telemetry setup. Absent handles mean the signal is off.
#[derive(Debug, Clone, Default)]
pub struct TelemetryHandles {
    pub tracer: Option<Tracer>,
    pub meter: Option<Meter>,
    pub logs: Option<LogBridge>,
}

impl TelemetryHandles {
    pub fn is_empty(&self) -> bool {
        self.tracer.is_none() && self.meter.is_none() && self.logs.is_none()
    }
}
