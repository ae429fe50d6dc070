// Error types for configuration loading

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration key not found: {0}")]
    KeyNotFound(String),

    #[error("Failed to load configuration: {0}")]
    Load(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Configuration value for {key} has the wrong type: {message}")]
    Type { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

// Any configuration problem is fatal at startup
impl From<ConfigError> for trellis_core::Error {
    fn from(error: ConfigError) -> Self {
        trellis_core::Error::Configuration(error.to_string())
    }
}
