//! Configuration loading from disk and environment.
//!
//! Sources are layered with `figment`: the TOML file first, then variables
//! under the environment prefix, where `__` separates nesting levels
//! (`RUNWAY_SERVER__SHUTDOWN_TIMEOUT` sets `server.shutdown_timeout`).

use std::fs;
use std::path::Path;

use figment::providers::{Data, Env, Toml};
use figment::Figment;

use crate::config::store::{Config, ConfigError};
use crate::config::validation::validate_config;

/// Default prefix for environment overrides.
pub const DEFAULT_ENV_PREFIX: &str = "RUNWAY";

/// Parse a TOML document into a configuration store.
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    into_config(Figment::from(Data::<Toml>::string(content)))
}

/// Load configuration from an optional TOML file, overlay the process
/// environment under `env_prefix`, and validate the result.
pub fn load_config(path: Option<&Path>, env_prefix: &str) -> Result<Config, ConfigError> {
    let mut figment = Figment::new();
    if let Some(path) = path {
        // Read up front: a missing file is an error, not an empty layer.
        let content = fs::read_to_string(path)?;
        figment = figment.merge(Data::<Toml>::string(&content));
        tracing::debug!(path = %path.display(), "Configuration file read");
    }
    figment = figment.merge(environment(env_prefix));

    let config = into_config(figment)?;
    tracing::debug!(keys = config.len(), prefix = %env_prefix, "Configuration loaded");

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

fn environment(prefix: &str) -> Env {
    let prefix = if prefix.ends_with('_') {
        prefix.to_string()
    } else {
        format!("{}_", prefix)
    };
    Env::prefixed(&prefix).split("__")
}

fn into_config(figment: Figment) -> Result<Config, ConfigError> {
    let doc: toml::Table = figment.extract()?;
    Ok(Config::from_toml(doc))
}
