//! Typed configuration lookups.
//!
//! # Responsibilities
//! - Abstract over where settings come from (TOML file, in-memory map)
//! - Provide string/int/boolean lookups with default fallback
//! - Report unconvertible values instead of silently using the default
//!
//! # Design Decisions
//! - Keys are flat dotted strings (`orders.http.port`)
//! - A missing key yields the default; a present but malformed key is an error
//! - Sources are read-only once handed to the registry

use std::collections::HashMap;

use thiserror::Error;

/// Errors raised while loading or reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("cannot read configuration file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Configuration file is not valid TOML.
    #[error("cannot parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// A key is present but its value has the wrong type or range.
    #[error("invalid value {value:?} for key {key}: expected {expected}")]
    Invalid {
        key: String,
        value: String,
        expected: &'static str,
    },
}

/// A source of named settings.
///
/// Implementors only provide raw string lookup; the typed accessors are
/// derived from it.
pub trait ConfigSource: Send + Sync {
    /// Raw value of `key`, if present.
    fn get_string(&self, key: &str) -> Option<String>;

    /// String value of `key`, or `default` when absent.
    fn get_str_or(&self, key: &str, default: &str) -> String {
        self.get_string(key).unwrap_or_else(|| default.to_string())
    }

    /// Integer value of `key`, or `default` when absent.
    fn get_i64_or(&self, key: &str, default: i64) -> Result<i64, ConfigError> {
        match self.get_string(key) {
            None => Ok(default),
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
                key: key.to_string(),
                value: raw,
                expected: "an integer",
            }),
        }
    }

    /// Boolean value of `key`, or `default` when absent.
    ///
    /// Accepts `true/false`, `yes/no`, `on/off` in any case.
    fn get_bool_or(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        match self.get_string(key) {
            None => Ok(default),
            Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" => Ok(true),
                "false" | "no" | "off" => Ok(false),
                _ => Err(ConfigError::Invalid {
                    key: key.to_string(),
                    value: raw,
                    expected: "a boolean",
                }),
            },
        }
    }
}

/// In-memory configuration, mostly for programmatic setups and tests.
#[derive(Debug, Clone, Default)]
pub struct MapConfig {
    values: HashMap<String, String>,
}

impl MapConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` to `value`, builder style.
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.set(key, value);
        self
    }

    /// Set `key` to `value`.
    pub fn set(&mut self, key: impl Into<String>, value: impl ToString) {
        self.values.insert(key.into(), value.to_string());
    }
}

impl ConfigSource for MapConfig {
    fn get_string(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

impl<K, V> FromIterator<(K, V)> for MapConfig
where
    K: Into<String>,
    V: ToString,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut config = MapConfig::new();
        for (key, value) in iter {
            config.set(key, value);
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_missing() {
        let config = MapConfig::new();
        assert_eq!(config.get_str_or("svc.http.host", "0.0.0.0"), "0.0.0.0");
        assert_eq!(config.get_i64_or("svc.http.port", 8080).unwrap(), 8080);
        assert!(!config.get_bool_or("svc.https.useHttpsOnly", false).unwrap());
    }

    #[test]
    fn test_typed_values() {
        let config = MapConfig::new()
            .with("svc.http.port", 9000)
            .with("svc.http.isBlockingChannelConnector", "TRUE")
            .with("svc.https.useHttpsOnly", " off ");

        assert_eq!(config.get_i64_or("svc.http.port", 8080).unwrap(), 9000);
        assert!(config.get_bool_or("svc.http.isBlockingChannelConnector", false).unwrap());
        assert!(!config.get_bool_or("svc.https.useHttpsOnly", true).unwrap());
    }

    #[test]
    fn test_malformed_values_are_errors() {
        let config: MapConfig = [("svc.http.port", "eighty"), ("svc.https.useHttpsOnly", "maybe")]
            .into_iter()
            .collect();

        let err = config.get_i64_or("svc.http.port", 8080).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "svc.http.port"));
        assert!(config.get_bool_or("svc.https.useHttpsOnly", false).is_err());
    }
}
