// Environment variable sources

use crate::{ConfigError, Result};
use std::path::Path;

/// Turns environment-style `KEY=value` pairs into configuration keys.
///
/// With a prefix only variables starting with `PREFIX_` are kept, and the
/// prefix is stripped. Keys are lower-cased and a double underscore becomes
/// a `.`, so `APP_DATABASE__URL` is read as `database.url`.
#[derive(Debug, Clone, Default)]
pub struct EnvSource {
    prefix: Option<String>,
}

impl EnvSource {
    pub fn new(prefix: Option<String>) -> Self {
        Self { prefix }
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// The configuration key for variable `name`, if it belongs to this source
    pub fn key_for(&self, name: &str) -> Option<String> {
        let rest = match &self.prefix {
            Some(prefix) => name.strip_prefix(prefix.as_str())?.strip_prefix('_')?,
            None => name,
        };
        if rest.is_empty() {
            return None;
        }
        Some(rest.to_lowercase().replace("__", "."))
    }

    /// Select and rename the pairs that belong to this source
    pub fn collect<I>(&self, vars: I) -> Vec<(String, String)>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        vars.into_iter()
            .filter_map(|(name, value)| self.key_for(&name).map(|key| (key, value)))
            .collect()
    }

    /// Read the process environment
    pub fn load(&self) -> Vec<(String, String)> {
        self.collect(std::env::vars())
    }

    /// Read a `.env` file without touching the process environment
    pub fn load_dotenv(&self, path: impl AsRef<Path>) -> Result<Vec<(String, String)>> {
        let path = path.as_ref();
        let pairs = dotenvy::from_path_iter(path)
            .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| ConfigError::Parse(format!("{}: {}", path.display(), e)))?;
        Ok(self.collect(pairs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_prefix_is_required_and_stripped() {
        let source = EnvSource::new(Some("APP".to_string()));
        let loaded = source.collect(vars(&[
            ("APP_PORT", "8080"),
            ("APPLICATION", "x"),
            ("APP_", "empty"),
            ("PATH", "/bin"),
        ]));
        assert_eq!(loaded, vec![("port".to_string(), "8080".to_string())]);
    }

    #[test]
    fn test_double_underscore_nests() {
        let source = EnvSource::new(Some("APP".to_string()));
        assert_eq!(source.key_for("APP_DATABASE__URL").as_deref(), Some("database.url"));
        assert_eq!(source.key_for("APP_LOG_LEVEL").as_deref(), Some("log_level"));
    }

    #[test]
    fn test_without_prefix_everything_is_kept() {
        let source = EnvSource::default();
        assert_eq!(source.key_for("HOME").as_deref(), Some("home"));
    }

    #[test]
    fn test_missing_dotenv_file() {
        let source = EnvSource::default();
        assert!(matches!(
            source.load_dotenv("/definitely/not/here/.env"),
            Err(ConfigError::Load(_))
        ));
    }
}
