//! Configuration for Trellis applications.
//!
//! A [`ConfigManager`] is filled once at startup from environment variables,
//! `.env` files and JSON or TOML files, then handed to the container as an
//! ordinary provider. Providers that need settings inject the manager, or a
//! typed configuration struct bound with [`ConfigManager::typed_provider`],
//! instead of reading the process environment themselves.
//!
//! ```
//! use trellis_config::ConfigManager;
//! use trellis_core::{Container, Token};
//!
//! let config = ConfigManager::new();
//! config.set("server.port", 8080).unwrap();
//!
//! let container = Container::new();
//! container.register(config.provider()).unwrap();
//!
//! let injected = container.resolve::<ConfigManager>().unwrap();
//! assert_eq!(injected.get::<u16>("server.port").unwrap(), 8080);
//! ```
//!
//! Keys are dotted paths into nested objects. Later sources override earlier
//! ones key by key.

mod env;
mod error;
mod loader;
mod validation;

pub use env::EnvSource;
pub use error::{ConfigError, Result};
pub use loader::{FileFormat, load_file};
pub use validation::{ConfigValidator, Validate};

use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;
use trellis_core::{ProviderDescriptor, Token};

/// Layered configuration values
#[derive(Clone, Default)]
pub struct ConfigManager {
    values: Arc<RwLock<Map<String, Value>>>,
    env: EnvSource,
}

impl ConfigManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only environment variables named `PREFIX_*` are read
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            values: Arc::default(),
            env: EnvSource::new(Some(prefix.into())),
        }
    }

    /// Read the process environment
    pub fn load_env(&self) -> &Self {
        let pairs = self.env.load();
        debug!(count = pairs.len(), prefix = ?self.env.prefix(), "Loaded environment variables");
        self.apply_strings(pairs);
        self
    }

    /// Read a `.env` file. The process environment is left untouched.
    pub fn load_dotenv(&self, path: impl AsRef<Path>) -> Result<&Self> {
        let pairs = self.env.load_dotenv(path.as_ref())?;
        debug!(count = pairs.len(), path = %path.as_ref().display(), "Loaded .env file");
        self.apply_strings(pairs);
        Ok(self)
    }

    /// Merge a JSON or TOML file, detected by extension
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<&Self> {
        let value = load_file(path.as_ref())?;
        debug!(path = %path.as_ref().display(), "Loaded configuration file");
        self.merge_value(value);
        Ok(self)
    }

    /// Merge configuration text in the given format
    pub fn load_str(&self, content: &str, format: FileFormat) -> Result<&Self> {
        self.merge_value(format.parse(content)?);
        Ok(self)
    }

    fn apply_strings(&self, pairs: Vec<(String, String)>) {
        let mut values = self.values.write();
        for (key, value) in pairs {
            insert_path(&mut values, &key, Value::String(value));
        }
    }

    fn merge_value(&self, value: Value) {
        if let Value::Object(object) = value {
            let mut values = self.values.write();
            merge_objects(&mut values, object);
        }
    }

    /// Set `key`, creating intermediate objects as needed
    pub fn set<T: Serialize>(&self, key: &str, value: T) -> Result<()> {
        let value = serde_json::to_value(value).map_err(|e| ConfigError::Type {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        insert_path(&mut self.values.write(), key, value);
        Ok(())
    }

    /// Read `key` as `T`.
    ///
    /// Values loaded from the environment are strings; when a string does not
    /// fit `T` directly it is parsed as JSON, so `"8080"` reads as a number.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let value = self
            .raw(key)
            .ok_or_else(|| ConfigError::KeyNotFound(key.to_string()))?;

        match serde_json::from_value::<T>(value.clone()) {
            Ok(typed) => Ok(typed),
            Err(first) => {
                let fallback = match &value {
                    Value::String(raw) => serde_json::from_str::<T>(raw).ok(),
                    _ => None,
                };
                fallback.ok_or_else(|| ConfigError::Type {
                    key: key.to_string(),
                    message: first.to_string(),
                })
            }
        }
    }

    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.get(key).unwrap_or(default)
    }

    /// The stored JSON value at `key`
    pub fn raw(&self, key: &str) -> Option<Value> {
        lookup_path(&self.values.read(), key).cloned()
    }

    pub fn has(&self, key: &str) -> bool {
        lookup_path(&self.values.read(), key).is_some()
    }

    /// Top-level keys
    pub fn keys(&self) -> Vec<String> {
        self.values.read().keys().cloned().collect()
    }

    /// Copy every value of `other` over this manager's values
    pub fn merge(&self, other: &ConfigManager) {
        let theirs = other.values.read().clone();
        merge_objects(&mut self.values.write(), theirs);
    }

    /// Everything as one JSON object
    pub fn snapshot(&self) -> Value {
        Value::Object(self.values.read().clone())
    }

    /// Deserialize everything into `T` and run its checks
    pub fn load_validated<T: DeserializeOwned + Validate>(&self) -> Result<T> {
        let config: T = serde_json::from_value(coerce_strings(self.snapshot()))
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Bind this manager as a singleton value provider
    pub fn provider(&self) -> ProviderDescriptor {
        ProviderDescriptor::value(Token::of::<ConfigManager>(), self.clone())
    }

    /// Load and validate `T`, then bind it as a singleton value provider
    pub fn typed_provider<T>(&self) -> Result<ProviderDescriptor>
    where
        T: DeserializeOwned + Validate + Send + Sync + 'static,
    {
        let config: T = self.load_validated()?;
        Ok(ProviderDescriptor::value(Token::of::<T>(), config))
    }
}

impl std::fmt::Debug for ConfigManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigManager")
            .field("keys", &self.keys())
            .field("prefix", &self.env.prefix())
            .finish()
    }
}

fn lookup_path<'a>(root: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    let mut segments = key.split('.');
    let mut current = root.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn insert_path(root: &mut Map<String, Value>, key: &str, value: Value) {
    let mut segments: Vec<&str> = key.split('.').collect();
    let Some(last) = segments.pop() else {
        return;
    };

    let mut current = root;
    for segment in segments {
        let slot = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        let Value::Object(next) = slot else {
            return;
        };
        current = next;
    }
    current.insert(last.to_string(), value);
}

fn merge_objects(target: &mut Map<String, Value>, source: Map<String, Value>) {
    for (key, value) in source {
        match (target.get_mut(&key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                merge_objects(existing, incoming)
            }
            (_, value) => {
                target.insert(key, value);
            }
        }
    }
}

/// Parse strings that hold JSON scalars, so environment values can fill
/// numeric and boolean fields of a typed configuration
fn coerce_strings(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            Value::Object(map.into_iter().map(|(k, v)| (k, coerce_strings(v))).collect())
        }
        Value::String(raw) => match serde_json::from_str::<Value>(&raw) {
            Ok(parsed @ (Value::Number(_) | Value::Bool(_))) => parsed,
            _ => Value::String(raw),
        },
        other => other,
    }
}
