//! Per-signal exporter settings.
//!
//! Every setting resolves through three tiers: the signal's own key, then the
//! shared `telemetry.exporter.*` key, then a built-in default. An empty value
//! counts as unset.

use std::fmt;
use std::time::Duration;

use crate::config::keys::*;
use crate::config::{fallback, Config, ConfigError, Variable};

pub const DEFAULT_PROTOCOL: &str = "http/json";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// A telemetry signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    Traces,
    Metrics,
    Logs,
}

struct SignalKeys {
    enabled: Variable<bool>,
    endpoint: Variable<String>,
    protocol: Variable<String>,
    headers: Variable<String>,
    timeout: Variable<String>,
}

impl Signal {
    pub const ALL: [Signal; 3] = [Signal::Traces, Signal::Metrics, Signal::Logs];

    pub fn name(&self) -> &'static str {
        match self {
            Signal::Traces => "traces",
            Signal::Metrics => "metrics",
            Signal::Logs => "logs",
        }
    }

    /// The on/off switch for this signal.
    pub fn switch(&self) -> Variable<bool> {
        self.keys().enabled
    }

    fn keys(&self) -> SignalKeys {
        match self {
            Signal::Traces => SignalKeys {
                enabled: TELEMETRY_TRACES_ENABLED,
                endpoint: TRACES_ENDPOINT,
                protocol: TRACES_PROTOCOL,
                headers: TRACES_HEADERS,
                timeout: TRACES_TIMEOUT,
            },
            Signal::Metrics => SignalKeys {
                enabled: TELEMETRY_METRICS_ENABLED,
                endpoint: METRICS_ENDPOINT,
                protocol: METRICS_PROTOCOL,
                headers: METRICS_HEADERS,
                timeout: METRICS_TIMEOUT,
            },
            Signal::Logs => SignalKeys {
                enabled: TELEMETRY_LOGS_ENABLED,
                endpoint: LOGS_ENDPOINT,
                protocol: LOGS_PROTOCOL,
                headers: LOGS_HEADERS,
                timeout: LOGS_TIMEOUT,
            },
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Resolved exporter settings for one signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExporterSettings {
    pub signal: Signal,
    /// Whether a remote exporter should be used at all.
    pub enabled: bool,
    /// Empty means "write to stdout".
    pub endpoint: String,
    pub protocol: String,
    pub headers: Vec<(String, String)>,
    pub timeout: Duration,
}

impl ExporterSettings {
    pub fn resolve(config: &Config, signal: Signal) -> Result<Self, ConfigError> {
        let keys = signal.keys();

        let enabled = config.get_or(&EXPORTER_ENABLED, false)?;
        let endpoint = fallback(config, &[keys.endpoint, EXPORTER_ENDPOINT], String::new())?;
        let protocol = fallback(
            config,
            &[keys.protocol, EXPORTER_PROTOCOL],
            DEFAULT_PROTOCOL.to_string(),
        )?;
        let headers = fallback(config, &[keys.headers, EXPORTER_HEADERS], String::new())?;
        let timeout = fallback(config, &[keys.timeout, EXPORTER_TIMEOUT], String::new())?;

        let timeout = if timeout.trim().is_empty() {
            DEFAULT_TIMEOUT
        } else {
            parse_duration(&timeout).unwrap_or_else(|| {
                tracing::warn!(
                    signal = %signal,
                    value = %timeout,
                    default = ?DEFAULT_TIMEOUT,
                    "Unparsable exporter timeout; using default"
                );
                DEFAULT_TIMEOUT
            })
        };

        Ok(Self {
            signal,
            enabled,
            endpoint: endpoint.trim().to_string(),
            protocol: protocol.trim().to_ascii_lowercase(),
            headers: parse_headers(&headers),
            timeout,
        })
    }

    /// Whether data goes to a remote endpoint rather than stdout.
    pub fn is_remote(&self) -> bool {
        self.enabled && !self.endpoint.is_empty()
    }
}

/// Parse `k1=v1,k2=v2`. Pairs without `=` or with an empty key are skipped.
pub fn parse_headers(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Parse `500ms`, `5s`, `2m`, `1h` or a bare number of seconds.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(raw.len());
    let (digits, unit) = raw.split_at(split);
    let n: u64 = digits.parse().ok()?;

    match unit.trim() {
        "" | "s" => Some(Duration::from_secs(n)),
        "ms" => Some(Duration::from_millis(n)),
        "m" => Some(Duration::from_secs(n.checked_mul(60)?)),
        "h" => Some(Duration::from_secs(n.checked_mul(3600)?)),
        _ => None,
    }
}
