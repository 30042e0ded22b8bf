//! Feature flag evaluation.
//!
//! # Responsibilities
//! - Pick a provider from configuration before the service starts
//! - Evaluate flags for a request context, falling back to caller defaults
//!
//! # Design Decisions
//! - Evaluation never fails the request: errors are logged and the default wins
//! - The provider is passed explicitly to route registration, never global

pub mod relay;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::config::keys::{FEATURES_PROVIDER, FEATURES_PROVIDER_URL};
use crate::config::{Config, ConfigError};

pub use relay::RelayProvider;

#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("feature provider url not set")]
    UrlNotSet,

    #[error("invalid feature provider url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("unsupported feature provider: {0}")]
    Unsupported(String),

    #[error("flag {flag} evaluation failed: {reason}")]
    Evaluation { flag: String, reason: String },

    #[error("feature provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Who a flag is being evaluated for.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EvaluationContext {
    pub targeting_key: String,
    pub attributes: BTreeMap<String, Value>,
}

impl EvaluationContext {
    pub fn new(targeting_key: impl Into<String>) -> Self {
        Self {
            targeting_key: targeting_key.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

#[async_trait]
pub trait FeatureProvider: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Raw evaluation. `Ok(None)` means the provider has no opinion.
    async fn evaluate(
        &self,
        flag: &str,
        default: &Value,
        ctx: &EvaluationContext,
    ) -> Result<Option<Value>, FeatureError>;

    async fn bool_value(&self, flag: &str, default: bool, ctx: &EvaluationContext) -> bool {
        match self.evaluate(flag, &Value::Bool(default), ctx).await {
            Ok(Some(Value::Bool(b))) => b,
            Ok(_) => default,
            Err(e) => {
                tracing::warn!(flag = %flag, error = %e, "Flag evaluation failed; using default");
                default
            }
        }
    }

    async fn string_value(&self, flag: &str, default: &str, ctx: &EvaluationContext) -> String {
        match self.evaluate(flag, &Value::from(default), ctx).await {
            Ok(Some(Value::String(s))) => s,
            Ok(_) => default.to_string(),
            Err(e) => {
                tracing::warn!(flag = %flag, error = %e, "Flag evaluation failed; using default");
                default.to_string()
            }
        }
    }
}

/// Always answers with the caller's default.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProvider;

#[async_trait]
impl FeatureProvider for NoopProvider {
    fn name(&self) -> &str {
        "noop"
    }

    async fn evaluate(
        &self,
        _flag: &str,
        _default: &Value,
        _ctx: &EvaluationContext,
    ) -> Result<Option<Value>, FeatureError> {
        Ok(None)
    }
}

/// Choose the provider named by `features.provider`.
///
/// Empty or `noop` selects [`NoopProvider`]. Any other name needs a valid
/// absolute http(s) `features.provider_url`.
pub fn select_provider(config: &Config) -> Result<Arc<dyn FeatureProvider>, FeatureError> {
    let name = config.get_or(&FEATURES_PROVIDER, String::new())?;
    let name = name.trim();
    if name.is_empty() || name.eq_ignore_ascii_case("noop") || name == "NoopProvider" {
        tracing::debug!("Using no-op feature provider");
        return Ok(Arc::new(NoopProvider));
    }

    let raw = config.get_or(&FEATURES_PROVIDER_URL, String::new())?;
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(FeatureError::UrlNotSet);
    }
    let url = parse_provider_url(raw)?;

    match name {
        "go-feature-flag" => {
            let provider = RelayProvider::new(url)?;
            tracing::info!(provider = %name, url = %raw, "Feature provider configured");
            Ok(Arc::new(provider))
        }
        other => Err(FeatureError::Unsupported(other.to_string())),
    }
}

fn parse_provider_url(raw: &str) -> Result<Url, FeatureError> {
    let invalid = |reason: String| FeatureError::InvalidUrl {
        url: raw.to_string(),
        reason,
    };
    let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") || !url.has_host() {
        return Err(invalid("expected an absolute http(s) url".to_string()));
    }
    Ok(url)
}
