//! runway: lifecycle runner for HTTP services.
//!
//! Loads typed configuration, starts telemetry subsystems in order with
//! last-in first-out unwind, serves HTTP until a termination signal or a
//! listener failure, and shuts everything down within bounded deadlines.

pub mod config;
pub mod error;
pub mod features;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod telemetry;

pub use config::{Config, ConfigError};
pub use error::{BoxError, MultiError};
pub use http::{HttpServer, RouteRegistry};
pub use lifecycle::{Runner, RunError};
