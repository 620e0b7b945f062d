//! Static configuration lookup.
//!
//! String key/value properties with defaults, an environment-variable
//! overlay and an optional JSON file source, mirroring the
//! `getProperty(name, default)` contract the hosted apps rely on.

use std::collections::HashMap;
use std::path::Path as FsPath;

/// Errors loading a property source.
#[derive(Debug, thiserror::Error)]
pub enum PropertyError {
    #[error("failed to read property file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed property file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("property file must be a JSON object of scalars")]
    NotAnObject,
}

/// Immutable-after-setup configuration map.
#[derive(Debug, Clone, Default)]
pub struct Properties {
    values: HashMap<String, String>,
}

impl Properties {
    pub fn new() -> Self {
        Properties::default()
    }

    /// Load from a JSON object file. Scalar values are stringified.
    pub fn from_json_file(path: impl AsRef<FsPath>) -> Result<Self, PropertyError> {
        let text = std::fs::read_to_string(path)?;
        let value: serde_json::Value = serde_json::from_str(&text)?;
        let object = value.as_object().ok_or(PropertyError::NotAnObject)?;

        let mut values = HashMap::new();
        for (key, entry) in object {
            let rendered = match entry {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Bool(b) => b.to_string(),
                _ => return Err(PropertyError::NotAnObject),
            };
            values.insert(key.clone(), rendered);
        }
        Ok(Properties { values })
    }

    /// Overlay every environment variable starting with `prefix`, with the
    /// prefix stripped and the rest lowercased. Overlaid values win.
    pub fn with_env_prefix(self, prefix: &str) -> Self {
        self.with_var_overlay(prefix, std::env::vars())
    }

    /// Overlay `prefix`-keyed entries from an explicit variable source.
    /// Same stripping and lowercasing rules as [`Properties::with_env_prefix`].
    pub fn with_var_overlay(
        mut self,
        prefix: &str,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        for (key, value) in vars {
            if let Some(stripped) = key.strip_prefix(prefix) {
                self.values.insert(stripped.to_lowercase(), value);
            }
        }
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Look up `name`, falling back to `default`.
    pub fn get_or(&self, name: &str, default: &str) -> String {
        self.values
            .get(name)
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
