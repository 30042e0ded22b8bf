//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → environment layer (RUNWAY_SERVER__PORT → server.port), merged by figment
//!     → loader.rs (flatten into dotted keys)
//!     → validation.rs (semantic checks)
//!     → Config (typed key/value store, immutable once loaded)
//!     → shared by reference with the lifecycle, HTTP and telemetry layers
//! ```
//!
//! # Design Decisions
//! - Typed keys (`Variable<T>`) instead of a fixed schema; consumers declare what they need
//! - Missing key is an error distinct from an empty value
//! - Tiered settings resolve through `fallback` (specific → global → default)

pub mod keys;
pub mod loader;
pub mod store;
pub mod validation;

pub use loader::{load_config, parse_config, DEFAULT_ENV_PREFIX};
pub use store::{fallback, Config, ConfigError, FromValue, Key, Variable};
pub use validation::{validate_config, ValidationError};
