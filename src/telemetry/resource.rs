//! Descriptive attributes attached to every exported batch.

use std::collections::BTreeMap;

use serde::Serialize;
use uuid::Uuid;

use crate::config::keys::TELEMETRY_SERVICE_NAME;
use crate::config::{Config, ConfigError};

pub const DEFAULT_SERVICE_NAME: &str = "runway";

/// Attributes describing the process producing telemetry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Resource {
    attributes: BTreeMap<String, String>,
}

impl Resource {
    pub fn new() -> Self {
        Self::default()
    }

    /// `service.name` from configuration plus version, host, process id and a
    /// per-process instance id.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let service_name = config.get_or(&TELEMETRY_SERVICE_NAME, DEFAULT_SERVICE_NAME.to_string())?;

        let mut resource = Self::new()
            .with("service.name", service_name)
            .with("service.version", env!("CARGO_PKG_VERSION"))
            .with("service.instance.id", Uuid::new_v4().to_string())
            .with("process.pid", std::process::id().to_string());

        if let Some(host) = host_name() {
            resource = resource.with("host.name", host);
        }
        Ok(resource)
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

fn host_name() -> Option<String> {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
}
