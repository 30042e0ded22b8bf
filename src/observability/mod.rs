//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events (structured fields)
//!         → logging.rs: env filter → text | JSON on stdout
//!         → telemetry::LogBridge → logs pipeline (when enabled)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Request ID and client IP recorded on every request span
//! - Spans and metrics live in `telemetry` and are optional

pub mod logging;

pub use logging::{init_logging, LogFormat, LoggingError};
