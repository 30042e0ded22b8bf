//! Well-known configuration keys.

use crate::config::store::Variable;

// Server
pub const SERVER_PORT: Variable<i64> = Variable::new("server.port");
pub const SERVER_READ_TIMEOUT: Variable<i64> = Variable::new("server.read_timeout");
pub const SERVER_WRITE_TIMEOUT: Variable<i64> = Variable::new("server.write_timeout");
pub const SERVER_REQUEST_TIMEOUT: Variable<i64> = Variable::new("server.request_timeout");
pub const SERVER_SHUTDOWN_TIMEOUT: Variable<i64> = Variable::new("server.shutdown_timeout");
pub const SERVER_LOG_LEVEL: Variable<String> = Variable::new("server.log_level");
pub const SERVER_LOG_FORMAT: Variable<String> = Variable::new("server.log_format");

// HTTP
pub const HTTP_REAL_IP_HEADERS: Variable<String> = Variable::new("http.real_ip_headers");

// Feature flags
pub const FEATURES_PROVIDER: Variable<String> = Variable::new("features.provider");
pub const FEATURES_PROVIDER_URL: Variable<String> = Variable::new("features.provider_url");

// Telemetry switches
pub const TELEMETRY_ENABLED: Variable<bool> = Variable::new("telemetry.enabled");
pub const TELEMETRY_SERVICE_NAME: Variable<String> = Variable::new("telemetry.service_name");
pub const TELEMETRY_TRACES_ENABLED: Variable<bool> = Variable::new("telemetry.traces.enabled");
pub const TELEMETRY_METRICS_ENABLED: Variable<bool> = Variable::new("telemetry.metrics.enabled");
pub const TELEMETRY_LOGS_ENABLED: Variable<bool> = Variable::new("telemetry.logs.enabled");

// Exporter, global tier
pub const EXPORTER_ENABLED: Variable<bool> = Variable::new("telemetry.exporter.enabled");
pub const EXPORTER_ENDPOINT: Variable<String> = Variable::new("telemetry.exporter.endpoint");
pub const EXPORTER_PROTOCOL: Variable<String> = Variable::new("telemetry.exporter.protocol");
pub const EXPORTER_HEADERS: Variable<String> = Variable::new("telemetry.exporter.headers");
pub const EXPORTER_TIMEOUT: Variable<String> = Variable::new("telemetry.exporter.timeout");

// Exporter, per-signal tier
pub const TRACES_ENDPOINT: Variable<String> = Variable::new("telemetry.traces.endpoint");
pub const TRACES_PROTOCOL: Variable<String> = Variable::new("telemetry.traces.protocol");
pub const TRACES_HEADERS: Variable<String> = Variable::new("telemetry.traces.headers");
pub const TRACES_TIMEOUT: Variable<String> = Variable::new("telemetry.traces.timeout");

pub const METRICS_ENDPOINT: Variable<String> = Variable::new("telemetry.metrics.endpoint");
pub const METRICS_PROTOCOL: Variable<String> = Variable::new("telemetry.metrics.protocol");
pub const METRICS_HEADERS: Variable<String> = Variable::new("telemetry.metrics.headers");
pub const METRICS_TIMEOUT: Variable<String> = Variable::new("telemetry.metrics.timeout");

pub const LOGS_ENDPOINT: Variable<String> = Variable::new("telemetry.logs.endpoint");
pub const LOGS_PROTOCOL: Variable<String> = Variable::new("telemetry.logs.protocol");
pub const LOGS_HEADERS: Variable<String> = Variable::new("telemetry.logs.headers");
pub const LOGS_TIMEOUT: Variable<String> = Variable::new("telemetry.logs.timeout");
