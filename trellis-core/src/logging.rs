//! Logging setup for Trellis applications.
//!
//! The framework itself only emits `tracing` events. Applications install a
//! subscriber once at startup:
//!
//! ```no_run
//! use trellis_core::logging::*;
//!
//! let _guard = LogConfig::new()
//!     .level(LogLevel::Debug)
//!     .format(LogFormat::Pretty)
//!     .init()
//!     .ok();
//!
//! info!("Application started");
//! ```
//!
//! Keep the returned [`WorkerGuard`] alive for as long as logs should be
//! flushed; dropping it stops the background writer.

use crate::Error;
use std::io;
use tracing::Level;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub use tracing::{debug, error, info, trace, warn};

/// Minimum level of events that are recorded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn to_tracing_level(&self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Event format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Machine-readable, one JSON object per line
    #[default]
    Json,
    Plain,
    Pretty,
    Compact,
}

/// Where events are written
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    /// Append to a single file
    File(String),
}

/// Subscriber configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    pub output: LogOutput,
    pub timestamps: bool,
    pub targets: bool,
    pub thread_ids: bool,
    pub colors: bool,
    /// Directive string such as `trellis_core=debug,hyper=info`. Takes
    /// precedence over `level` and `RUST_LOG`.
    pub env_filter: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Json,
            output: LogOutput::Stdout,
            timestamps: true,
            targets: true,
            thread_ids: false,
            colors: false,
            env_filter: None,
        }
    }
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    pub fn with_timestamps(mut self, enable: bool) -> Self {
        self.timestamps = enable;
        self
    }

    pub fn with_targets(mut self, enable: bool) -> Self {
        self.targets = enable;
        self
    }

    pub fn with_thread_ids(mut self, enable: bool) -> Self {
        self.thread_ids = enable;
        self
    }

    pub fn with_colors(mut self, enable: bool) -> Self {
        self.colors = enable;
        self
    }

    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    fn filter(&self) -> EnvFilter {
        match &self.env_filter {
            Some(directives) => {
                EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new(self.level.as_str()))
            }
            None => EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(self.level.as_str())),
        }
    }

    fn writer(&self) -> Result<(NonBlocking, WorkerGuard), Error> {
        Ok(match &self.output {
            LogOutput::Stdout => tracing_appender::non_blocking(io::stdout()),
            LogOutput::Stderr => tracing_appender::non_blocking(io::stderr()),
            LogOutput::File(path) => {
                let file = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)?;
                tracing_appender::non_blocking(file)
            }
        })
    }

    /// Install the global subscriber.
    ///
    /// Fails if the log file cannot be opened or a global subscriber is
    /// already installed.
    pub fn init(self) -> Result<WorkerGuard, Error> {
        let (writer, guard) = self.writer()?;
        let registry = tracing_subscriber::registry().with(self.filter());
        let base = fmt::layer()
            .with_writer(writer)
            .with_target(self.targets)
            .with_thread_ids(self.thread_ids);

        // The four formats produce distinct layer types, hence the repetition.
        let installed = match (self.format, self.timestamps) {
            (LogFormat::Json, true) => registry.with(base.json()).try_init(),
            (LogFormat::Json, false) => registry.with(base.json().without_time()).try_init(),
            (LogFormat::Plain, true) => registry.with(base.with_ansi(self.colors)).try_init(),
            (LogFormat::Plain, false) => registry
                .with(base.with_ansi(self.colors).without_time())
                .try_init(),
            (LogFormat::Pretty, true) => registry
                .with(base.pretty().with_ansi(self.colors))
                .try_init(),
            (LogFormat::Pretty, false) => registry
                .with(base.pretty().with_ansi(self.colors).without_time())
                .try_init(),
            (LogFormat::Compact, true) => registry
                .with(base.compact().with_ansi(self.colors))
                .try_init(),
            (LogFormat::Compact, false) => registry
                .with(base.compact().with_ansi(self.colors).without_time())
                .try_init(),
        };

        installed.map_err(|e| Error::Configuration(format!("logging: {}", e)))?;
        Ok(guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(LogLevel::Trace.to_tracing_level(), Level::TRACE);
        assert_eq!(LogLevel::Warn.to_tracing_level(), Level::WARN);
        assert_eq!(LogLevel::Error.as_str(), "error");
    }

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert_eq!(config.level, LogLevel::Info);
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.output, LogOutput::Stdout);
        assert!(config.env_filter.is_none());
    }

    #[test]
    fn test_config_builder() {
        let config = LogConfig::new()
            .level(LogLevel::Debug)
            .format(LogFormat::Compact)
            .output(LogOutput::Stderr)
            .with_colors(true)
            .with_env_filter("trellis_core=trace");

        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.format, LogFormat::Compact);
        assert_eq!(config.output, LogOutput::Stderr);
        assert!(config.colors);
        assert_eq!(config.env_filter.as_deref(), Some("trellis_core=trace"));
    }

    #[test]
    fn test_unwritable_file_is_an_error() {
        let config = LogConfig::new().output(LogOutput::File(
            "/nonexistent-dir/trellis/app.log".to_string(),
        ));
        assert!(matches!(config.init(), Err(Error::Io(_))));
    }
}
