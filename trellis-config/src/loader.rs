// Configuration file parsing

use crate::{ConfigError, Result};
use serde_json::Value;
use std::path::Path;

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Json,
    Toml,
}

impl FileFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "json" => Some(FileFormat::Json),
            "toml" => Some(FileFormat::Toml),
            _ => None,
        }
    }

    /// Detect the format of `path` from its extension
    pub fn detect(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .ok_or_else(|| ConfigError::Load(format!("{} has no file extension", path.display())))?;

        Self::from_extension(ext)
            .ok_or_else(|| ConfigError::Load(format!("unsupported configuration format: {}", ext)))
    }

    /// Parse `content` into a JSON object
    pub fn parse(self, content: &str) -> Result<Value> {
        let value = match self {
            FileFormat::Json => serde_json::from_str::<Value>(content)
                .map_err(|e| ConfigError::Parse(format!("JSON: {}", e)))?,
            FileFormat::Toml => {
                let table: toml::Table = toml::from_str(content)
                    .map_err(|e| ConfigError::Parse(format!("TOML: {}", e)))?;
                serde_json::to_value(table).map_err(|e| ConfigError::Parse(format!("TOML: {}", e)))?
            }
        };

        if !value.is_object() {
            return Err(ConfigError::Parse(
                "configuration root must be an object".to_string(),
            ));
        }
        Ok(value)
    }
}

/// Read and parse the file at `path`, detecting its format
pub fn load_file(path: impl AsRef<Path>) -> Result<Value> {
    let path = path.as_ref();
    let format = FileFormat::detect(path)?;
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    format.parse(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_json() {
        let value = FileFormat::Json
            .parse(r#"{"port": 8080, "database": {"url": "postgres://db"}}"#)
            .unwrap();
        assert_eq!(value["database"]["url"], "postgres://db");
    }

    #[test]
    fn test_parse_toml_tables() {
        let value = FileFormat::Toml
            .parse(
                r#"
                port = 8080

                [database]
                url = "postgres://db"
                pool = 4
                "#,
            )
            .unwrap();
        assert_eq!(value, json!({ "port": 8080, "database": { "url": "postgres://db", "pool": 4 } }));
    }

    #[test]
    fn test_root_must_be_an_object() {
        assert!(matches!(FileFormat::Json.parse("[1, 2]"), Err(ConfigError::Parse(_))));
        assert!(matches!(FileFormat::Toml.parse("= nope"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(FileFormat::detect(Path::new("app.JSON")).unwrap(), FileFormat::Json);
        assert_eq!(FileFormat::detect(Path::new("conf/app.toml")).unwrap(), FileFormat::Toml);
        assert!(FileFormat::detect(Path::new("app.yaml")).is_err());
        assert!(FileFormat::detect(Path::new("Makefile")).is_err());
    }
}
