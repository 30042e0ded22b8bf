//! Typed key/value configuration store.
//!
//! Keys are dotted paths (`server.port`). Values keep whatever type their source
//! gave them (a TOML file, the environment or string pairs in tests); typed
//! accessors convert any of these into the requested type.

use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::time::Duration;

use thiserror::Error;
use toml::Value;

/// Errors produced by configuration access and loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required key is not present at all.
    #[error("missing configuration key: {0}")]
    MissingKey(String),

    /// Several required keys are not present.
    #[error("missing configuration keys: {}", .0.join(", "))]
    MissingKeys(Vec<String>),

    /// The key is present but its value can't be read as the requested type.
    #[error("invalid value for {key}: expected {expected}, got {found}")]
    Invalid {
        key: String,
        expected: &'static str,
        found: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A source could not be parsed or merged.
    #[error("Parse error: {0}")]
    Parse(#[from] figment::Error),

    #[error("Validation failed: {}", join_validation(.0))]
    Validation(Vec<crate::config::validation::ValidationError>),
}

fn join_validation(errors: &[crate::config::validation::ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl ConfigError {
    /// Whether this error (or the keys it lists) concerns a missing key.
    pub fn is_missing(&self) -> bool {
        matches!(self, ConfigError::MissingKey(_) | ConfigError::MissingKeys(_))
    }
}

/// Conversion from a stored value into a typed configuration value.
pub trait FromValue: Sized {
    /// Human readable type name used in error messages.
    const EXPECTED: &'static str;

    fn from_value(value: &Value) -> Option<Self>;

    /// Whether the value counts as "not set" for fallback purposes.
    fn is_empty(&self) -> bool;
}

impl FromValue for String {
    const EXPECTED: &'static str = "string";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(s.clone()),
            Value::Integer(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Boolean(b) => Some(b.to_string()),
            _ => None,
        }
    }

    fn is_empty(&self) -> bool {
        self.trim().is_empty()
    }
}

impl FromValue for i64 {
    const EXPECTED: &'static str = "integer";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Integer(i) => Some(*i),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn is_empty(&self) -> bool {
        *self == 0
    }
}

impl FromValue for u16 {
    const EXPECTED: &'static str = "port number";

    fn from_value(value: &Value) -> Option<Self> {
        i64::from_value(value).and_then(|i| u16::try_from(i).ok())
    }

    fn is_empty(&self) -> bool {
        *self == 0
    }
}

impl FromValue for bool {
    const EXPECTED: &'static str = "boolean";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Boolean(b) => Some(*b),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Some(true),
                "false" | "0" | "no" | "off" => Some(false),
                _ => None,
            },
            Value::Integer(i) => Some(*i != 0),
            _ => None,
        }
    }

    // An explicit `false` is a real answer, never a gap to fall through.
    fn is_empty(&self) -> bool {
        false
    }
}

/// A typed configuration key.
pub struct Variable<T> {
    key: &'static str,
    _type: PhantomData<fn() -> T>,
}

impl<T> Variable<T> {
    pub const fn new(key: &'static str) -> Self {
        Self {
            key,
            _type: PhantomData,
        }
    }

    pub const fn key(&self) -> &'static str {
        self.key
    }
}

impl<T> Clone for Variable<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Variable<T> {}

impl<T> fmt::Debug for Variable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Variable").field(&self.key).finish()
    }
}

impl<T> fmt::Display for Variable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key)
    }
}

/// Anything that names a configuration key, used for bulk presence checks.
pub trait Key {
    fn key(&self) -> &'static str;
}

impl<T> Key for Variable<T> {
    fn key(&self) -> &'static str {
        self.key
    }
}

/// Pre-populated configuration store.
#[derive(Debug, Clone, Default)]
pub struct Config {
    values: BTreeMap<String, Value>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a nested document, flattening tables into dotted keys.
    pub fn from_toml(doc: toml::Table) -> Self {
        let mut config = Self::new();
        flatten("", Value::Table(doc), &mut config.values);
        config
    }

    /// Build a store from string pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut config = Self::new();
        for (k, v) in pairs {
            config.set(k, Value::String(v.into()));
        }
        config
    }

    /// Set (or replace) a key.
    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.values.insert(key.into(), value.into());
    }

    /// Whether a key is present (an empty value still counts as present).
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Typed read. A missing key is [`ConfigError::MissingKey`]; a present key
    /// with an unreadable value is [`ConfigError::Invalid`].
    pub fn get<T: FromValue>(&self, var: &Variable<T>) -> Result<T, ConfigError> {
        let value = self
            .values
            .get(var.key())
            .ok_or_else(|| ConfigError::MissingKey(var.key().to_string()))?;
        T::from_value(value).ok_or_else(|| ConfigError::Invalid {
            key: var.key().to_string(),
            expected: T::EXPECTED,
            found: value.to_string(),
        })
    }

    /// Typed read that treats a missing key or an empty value as `default`.
    /// An unreadable value is still an error.
    pub fn get_or<T: FromValue>(&self, var: &Variable<T>, default: T) -> Result<T, ConfigError> {
        match self.lookup(var)? {
            Some(v) => Ok(v),
            None => Ok(default),
        }
    }

    /// Typed read returning `None` for a missing key or an empty value.
    pub fn lookup<T: FromValue>(&self, var: &Variable<T>) -> Result<Option<T>, ConfigError> {
        match self.get(var) {
            Ok(v) if v.is_empty() => Ok(None),
            Ok(v) => Ok(Some(v)),
            Err(ConfigError::MissingKey(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Read a whole-seconds duration. Negative values are [`ConfigError::Invalid`].
    pub fn duration_secs(&self, var: &Variable<i64>) -> Result<Duration, ConfigError> {
        let secs = self.get(var)?;
        u64::try_from(secs)
            .map(Duration::from_secs)
            .map_err(|_| ConfigError::Invalid {
                key: var.key().to_string(),
                expected: "non-negative seconds",
                found: secs.to_string(),
            })
    }

    /// Ensure every listed key is present, reporting all that are missing.
    pub fn require(&self, keys: &[&dyn Key]) -> Result<(), ConfigError> {
        let missing: Vec<String> = keys
            .iter()
            .map(|k| k.key())
            .filter(|k| !self.contains(k))
            .map(str::to_string)
            .collect();

        match missing.len() {
            0 => Ok(()),
            1 => Err(ConfigError::MissingKey(missing.into_iter().next().unwrap_or_default())),
            _ => Err(ConfigError::MissingKeys(missing)),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn flatten(prefix: &str, value: Value, out: &mut BTreeMap<String, Value>) {
    match value {
        Value::Table(table) => {
            for (k, v) in table {
                let key = if prefix.is_empty() {
                    k
                } else {
                    format!("{}.{}", prefix, k)
                };
                flatten(&key, v, out);
            }
        }
        other => {
            out.insert(prefix.to_string(), other);
        }
    }
}

/// Resolve a tiered setting: the first tier holding a non-empty value wins,
/// otherwise `default`.
pub fn fallback<T: FromValue>(
    config: &Config,
    tiers: &[Variable<T>],
    default: T,
) -> Result<T, ConfigError> {
    for var in tiers {
        if let Some(v) = config.lookup(var)? {
            return Ok(v);
        }
    }
    Ok(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PORT: Variable<i64> = Variable::new("server.port");
    const NAME: Variable<String> = Variable::new("service.name");
    const FLAG: Variable<bool> = Variable::new("feature.on");

    #[test]
    fn test_flatten_toml() {
        let doc: toml::Table = toml::from_str(
            r#"
            [server]
            port = 8080
            [service]
            name = "svc"
            "#,
        )
        .unwrap();
        let config = Config::from_toml(doc);
        assert_eq!(config.get(&PORT).unwrap(), 8080);
        assert_eq!(config.get(&NAME).unwrap(), "svc");
    }

    #[test]
    fn test_missing_distinct_from_empty() {
        let config = Config::from_pairs([("service.name", "")]);
        assert_eq!(config.get(&NAME).unwrap(), "");
        assert!(matches!(config.get(&PORT), Err(ConfigError::MissingKey(k)) if k == "server.port"));
    }

    #[test]
    fn test_invalid_value() {
        let config = Config::from_pairs([("server.port", "eighty")]);
        let err = config.get(&PORT).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
        assert!(!err.is_missing());
    }

    #[test]
    fn test_strings_parse_into_types() {
        let config = Config::from_pairs([("server.port", " 9000 "), ("feature.on", "TRUE")]);
        assert_eq!(config.get(&PORT).unwrap(), 9000);
        assert!(config.get(&FLAG).unwrap());
    }

    #[test]
    fn test_require_reports_all_missing() {
        let config = Config::from_pairs([("server.port", "1")]);
        assert!(config.require(&[&PORT]).is_ok());
        match config.require(&[&PORT, &NAME, &FLAG]) {
            Err(ConfigError::MissingKeys(keys)) => {
                assert_eq!(keys, vec!["service.name".to_string(), "feature.on".to_string()]);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_fallback_tiers() {
        const SPECIFIC: Variable<String> = Variable::new("a.specific");
        const GLOBAL: Variable<String> = Variable::new("a.global");

        let both = Config::from_pairs([("a.specific", "s"), ("a.global", "g")]);
        assert_eq!(fallback(&both, &[SPECIFIC, GLOBAL], "d".into()).unwrap(), "s");

        let global_only = Config::from_pairs([("a.specific", ""), ("a.global", "g")]);
        assert_eq!(fallback(&global_only, &[SPECIFIC, GLOBAL], "d".into()).unwrap(), "g");

        let none = Config::new();
        assert_eq!(fallback(&none, &[SPECIFIC, GLOBAL], "d".into()).unwrap(), "d");
    }

    #[test]
    fn test_duration_secs_rejects_negative() {
        const GRACE: Variable<i64> = Variable::new("server.shutdown_timeout");

        let config = Config::from_pairs([("server.shutdown_timeout", "-5")]);
        match config.duration_secs(&GRACE) {
            Err(ConfigError::Invalid { key, found, .. }) => {
                assert_eq!(key, "server.shutdown_timeout");
                assert_eq!(found, "-5");
            }
            other => panic!("unexpected: {:?}", other),
        }

        let config = Config::from_pairs([("server.shutdown_timeout", "0")]);
        assert_eq!(config.duration_secs(&GRACE).unwrap(), Duration::ZERO);
    }
}
