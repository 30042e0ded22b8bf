//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the global `tracing` subscriber once at startup
//! - Choose level and output format from configuration
//! - Install the telemetry log bridge so events can reach the logs pipeline
//!
//! # Design Decisions
//! - `RUST_LOG` wins over `server.log_level` when set
//! - JSON format for production, text format for development
//! - An unknown level falls back to `info` with a warning instead of failing

use thiserror::Error;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::EnvFilter;

use crate::config::keys::{SERVER_LOG_FORMAT, SERVER_LOG_LEVEL};
use crate::config::{Config, ConfigError};
use crate::telemetry::LogBridge;

pub const DEFAULT_LEVEL: &str = "info";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("unknown log format: {0}")]
    UnknownFormat(String),

    #[error("logging already initialized: {0}")]
    Init(#[from] TryInitError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "text" => Some(LogFormat::Text),
            "json" => Some(LogFormat::Json),
            _ => None,
        }
    }
}

/// Parse a level name (`trace` .. `error`).
pub fn parse_level(raw: &str) -> Option<LevelFilter> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "trace" => Some(LevelFilter::TRACE),
        "debug" => Some(LevelFilter::DEBUG),
        "info" => Some(LevelFilter::INFO),
        "warn" => Some(LevelFilter::WARN),
        "error" => Some(LevelFilter::ERROR),
        _ => None,
    }
}

/// Install the global subscriber.
pub fn init_logging(config: &Config, bridge: LogBridge) -> Result<(), LoggingError> {
    let raw_level = config.get_or(&SERVER_LOG_LEVEL, DEFAULT_LEVEL.to_string())?;
    let level = parse_level(&raw_level);

    let raw_format = config.get_or(&SERVER_LOG_FORMAT, String::new())?;
    let format = LogFormat::parse(&raw_format).ok_or(LoggingError::UnknownFormat(raw_format))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::builder()
            .with_default_directive(level.unwrap_or(LevelFilter::INFO).into())
            .parse_lossy("")
    });

    let (text, json) = match format {
        LogFormat::Text => (Some(tracing_subscriber::fmt::layer()), None),
        LogFormat::Json => (None, Some(tracing_subscriber::fmt::layer().json())),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(text)
        .with(json)
        .with(bridge)
        .try_init()?;

    if level.is_none() {
        tracing::warn!(level = %raw_level, "Unknown log level; using info");
    }
    tracing::debug!(format = ?format, "Logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("DEBUG"), Some(LevelFilter::DEBUG));
        assert_eq!(parse_level(" warn "), Some(LevelFilter::WARN));
        assert_eq!(parse_level("verbose"), None);
    }

    #[test]
    fn test_parse_format() {
        assert_eq!(LogFormat::parse(""), Some(LogFormat::Text));
        assert_eq!(LogFormat::parse("JSON"), Some(LogFormat::Json));
        assert_eq!(LogFormat::parse("xml"), None);
    }

    #[test]
    fn test_unknown_format_rejected_before_install() {
        let config = Config::from_pairs([("server.log_format", "xml")]);
        assert!(matches!(
            init_logging(&config, LogBridge::new()),
            Err(LoggingError::UnknownFormat(ref f)) if f == "xml"
        ));
    }
}
