//! Raw workspace configuration
//!
//! The raw form is a flat map of dotted keys to string values. TOML tables
//! flatten into dotted keys and arrays into comma-separated lists, so
//!
//! ```toml
//! [lifecycle.feature]
//! retention_days = 14
//!
//! [protected]
//! branches = ["main", "develop"]
//! ```
//!
//! becomes `lifecycle.feature.retention_days = "14"` and
//! `protected.branches = "main,develop"`.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Loaded configuration plus its content fingerprint.
///
/// Immutable after loading; a changed file means a new value with a new
/// fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceConfiguration {
    values: BTreeMap<String, String>,
    fingerprint: String,
}

impl WorkspaceConfiguration {
    /// Build from explicit key/value pairs.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let values: BTreeMap<String, String> = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let fingerprint = fingerprint_of(&values);
        Self {
            values,
            fingerprint,
        }
    }

    /// Parse TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Self::parse(content, Path::new("<inline>"))
    }

    /// Load the configuration file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::ConfigNotFound {
                    path: path.to_path_buf(),
                });
            }
            Err(e) => return Err(gitstate_fs::Error::io(path, e).into()),
        };
        let config = Self::parse(&content, path)?;
        tracing::debug!(
            path = %path.display(),
            keys = config.values.len(),
            fingerprint = %config.fingerprint,
            "Loaded workspace configuration"
        );
        Ok(config)
    }

    fn parse(content: &str, path: &Path) -> Result<Self> {
        let table: toml::Table = toml::from_str(content).map_err(|e| Error::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let mut pairs = BTreeMap::new();
        flatten_table("", &table, &mut pairs);
        Ok(Self::from_pairs(pairs))
    }

    /// `sha256:<hex>` over the canonical `key=value` listing.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn values(&self) -> &BTreeMap<String, String> {
        &self.values
    }
}

fn fingerprint_of(values: &BTreeMap<String, String>) -> String {
    let mut canonical = String::new();
    for (key, value) in values {
        canonical.push_str(key);
        canonical.push('=');
        canonical.push_str(value);
        canonical.push('\n');
    }
    gitstate_fs::content_digest(canonical.as_bytes())
}

fn flatten_table(prefix: &str, table: &toml::Table, out: &mut BTreeMap<String, String>) {
    for (key, value) in table {
        let full_key = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            toml::Value::Table(nested) => flatten_table(&full_key, nested, out),
            toml::Value::Array(items) => {
                let rendered: Vec<String> = items.iter().filter_map(scalar_to_string).collect();
                if rendered.len() != items.len() {
                    tracing::warn!(key = %full_key, "Ignoring non-scalar array entries");
                }
                out.insert(full_key, rendered.join(","));
            }
            scalar => {
                if let Some(s) = scalar_to_string(scalar) {
                    out.insert(full_key, s);
                }
            }
        }
    }
}

fn scalar_to_string(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Integer(i) => Some(i.to_string()),
        toml::Value::Float(f) => Some(f.to_string()),
        toml::Value::Boolean(b) => Some(b.to_string()),
        toml::Value::Datetime(d) => Some(d.to_string()),
        toml::Value::Array(_) | toml::Value::Table(_) => None,
    }
}
