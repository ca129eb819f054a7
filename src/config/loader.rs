//! Configuration loading from disk.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::config::source::{ConfigError, ConfigSource};

/// Configuration backed by a TOML document.
///
/// Nested tables are flattened into dotted keys, so both
///
/// ```toml
/// [orders.http]
/// port = 9000
/// ```
///
/// and `"orders.http.port" = 9000` answer the lookup `orders.http.port`.
#[derive(Debug, Clone, Default)]
pub struct TomlConfig {
    values: HashMap<String, String>,
}

impl TomlConfig {
    /// Parse a TOML document.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let table: toml::Table = toml::from_str(content)?;
        let mut values = HashMap::new();
        flatten("", &table, &mut values);
        Ok(Self { values })
    }

    /// Number of leaf settings.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Load configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<TomlConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let config = TomlConfig::parse(&content)?;

    tracing::debug!(path = %path.display(), settings = config.len(), "Configuration loaded");
    Ok(config)
}

fn flatten(prefix: &str, table: &toml::Table, out: &mut HashMap<String, String>) {
    for (key, value) in table {
        let full_key = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };

        match value {
            toml::Value::Table(nested) => flatten(&full_key, nested, out),
            toml::Value::String(s) => {
                out.insert(full_key, s.clone());
            }
            toml::Value::Array(items) => {
                // Lists are exposed comma separated.
                let joined = items
                    .iter()
                    .map(|item| match item {
                        toml::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(",");
                out.insert(full_key, joined);
            }
            other => {
                out.insert(full_key, other.to_string());
            }
        }
    }
}

impl ConfigSource for TomlConfig {
    fn get_string(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}
