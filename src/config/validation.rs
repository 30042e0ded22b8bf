//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (the store handles presence and types)
//! - Validate value ranges (timeouts within a day, ports valid)
//! - Reject unknown log levels, log formats and exporter protocols
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Only checks keys that are present; presence is enforced where each key is consumed

use thiserror::Error;

use crate::config::keys::*;
use crate::config::store::{Config, ConfigError, Variable};

pub const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
pub const LOG_FORMATS: &[&str] = &["text", "json"];
pub const PROTOCOLS: &[&str] = &["http", "http/json", "http/protobuf", "grpc"];

/// Largest accepted timeout, in seconds.
pub const MAX_TIMEOUT_SECS: i64 = 86_400;

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{key} must be between 1 and 65535 (got {value})")]
    PortOutOfRange { key: String, value: i64 },

    #[error("{key} must not be negative (got {value})")]
    NegativeTimeout { key: String, value: i64 },

    #[error("{key} must be at most {max} seconds (got {value})")]
    TimeoutTooLarge { key: String, value: i64, max: i64 },

    #[error("{key} has unsupported value {value:?}")]
    Unsupported { key: String, value: String },

    #[error("{0}")]
    Unreadable(String),
}

/// Validate every present key, collecting all problems.
pub fn validate_config(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    // Zero reads as empty through `lookup`, so the port goes through `get`.
    match config.get(&SERVER_PORT) {
        Ok(port) if !(1..=65535).contains(&port) => errors.push(ValidationError::PortOutOfRange {
            key: SERVER_PORT.key().to_string(),
            value: port,
        }),
        Ok(_) | Err(ConfigError::MissingKey(_)) => {}
        Err(e) => errors.push(unreadable(e)),
    }

    for var in [
        SERVER_READ_TIMEOUT,
        SERVER_WRITE_TIMEOUT,
        SERVER_REQUEST_TIMEOUT,
        SERVER_SHUTDOWN_TIMEOUT,
    ] {
        match config.lookup(&var) {
            Ok(Some(value)) if value < 0 => errors.push(ValidationError::NegativeTimeout {
                key: var.key().to_string(),
                value,
            }),
            Ok(Some(value)) if value > MAX_TIMEOUT_SECS => errors.push(ValidationError::TimeoutTooLarge {
                key: var.key().to_string(),
                value,
                max: MAX_TIMEOUT_SECS,
            }),
            Ok(_) => {}
            Err(e) => errors.push(unreadable(e)),
        }
    }

    check_one_of(config, &SERVER_LOG_LEVEL, LOG_LEVELS, &mut errors);
    check_one_of(config, &SERVER_LOG_FORMAT, LOG_FORMATS, &mut errors);
    for var in [EXPORTER_PROTOCOL, TRACES_PROTOCOL, METRICS_PROTOCOL, LOGS_PROTOCOL] {
        check_one_of(config, &var, PROTOCOLS, &mut errors);
    }

    for var in [
        TELEMETRY_ENABLED,
        TELEMETRY_TRACES_ENABLED,
        TELEMETRY_METRICS_ENABLED,
        TELEMETRY_LOGS_ENABLED,
        EXPORTER_ENABLED,
    ] {
        if let Err(e) = config.lookup(&var) {
            errors.push(unreadable(e));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_one_of(
    config: &Config,
    var: &Variable<String>,
    allowed: &[&str],
    errors: &mut Vec<ValidationError>,
) {
    match config.lookup(var) {
        Ok(Some(value)) if !allowed.contains(&value.trim().to_ascii_lowercase().as_str()) => {
            errors.push(ValidationError::Unsupported {
                key: var.key().to_string(),
                value,
            });
        }
        Ok(_) => {}
        Err(e) => errors.push(unreadable(e)),
    }
}

fn unreadable(err: ConfigError) -> ValidationError {
    ValidationError::Unreadable(err.to_string())
}
