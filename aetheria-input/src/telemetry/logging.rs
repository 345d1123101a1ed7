//! Logging configuration and initialization
//!
//! Structured logging with tracing: a compact or JSON console layer on
//! stderr, plus an optional plain-text log file written through
//! tracing-appender.

use std::fs::OpenOptions;
use std::path::PathBuf;

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*, util::TryInitError};

/// Filter directives are read from this variable first
pub const LOG_ENV: &str = "AETHERIA_LOG";
/// Set to `json` to switch the console to JSON lines
pub const LOG_FORMAT_ENV: &str = "AETHERIA_LOG_FORMAT";

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Enable console output (default: true)
    pub console_enabled: bool,
    /// Append to a log file (default: none)
    pub file_path: Option<PathBuf>,
    /// Use JSON format on the console (default: false)
    pub json_format: bool,
    /// Default log level filter (default: "info")
    pub default_level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            console_enabled: true,
            file_path: None,
            json_format: false,
            default_level: "info".to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Failed to open log file {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Logging already initialized: {0}")]
    Init(#[from] TryInitError),
}

/// Filter from `AETHERIA_LOG`, then `RUST_LOG`, then `default_level`
fn build_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Whether a `AETHERIA_LOG_FORMAT` value asks for JSON
fn is_json_format(value: Option<&str>, fallback: bool) -> bool {
    match value {
        Some(v) => v.trim().eq_ignore_ascii_case("json"),
        None => fallback,
    }
}

/// Initialize the global subscriber.
///
/// Returns the file writer guard when file output is enabled; keep it alive
/// until exit so buffered lines are flushed.
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>, LoggingError> {
    let env_filter = build_filter(&config.default_level);
    let format_var = std::env::var(LOG_FORMAT_ENV).ok();
    let use_json = is_json_format(format_var.as_deref(), config.json_format);

    let console_layer = match (config.console_enabled, use_json) {
        (false, _) => None,
        (true, true) => Some(
            fmt::layer()
                .with_writer(std::io::stderr)
                .json()
                .with_target(true)
                .with_thread_names(true)
                .with_file(true)
                .with_line_number(true)
                .boxed(),
        ),
        (true, false) => Some(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_names(true)
                .compact()
                .boxed(),
        ),
    };

    let mut file_guard = None;
    let file_layer = match config.file_path.as_ref() {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| LoggingError::File {
                    path: path.clone(),
                    source,
                })?;
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            file_guard = Some(guard);
            Some(
                fmt::layer()
                    .with_writer(non_blocking)
                    .with_target(true)
                    .with_thread_names(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_ansi(false),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        json_format = use_json,
        log_file = ?config.file_path,
        "Logging initialized"
    );

    Ok(file_guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_default() {
        let config = LogConfig::default();
        assert!(config.console_enabled);
        assert!(config.file_path.is_none());
        assert!(!config.json_format);
        assert_eq!(config.default_level, "info");
    }

    #[test]
    fn test_json_format_selection() {
        assert!(is_json_format(Some("json"), false));
        assert!(is_json_format(Some(" JSON "), false));
        assert!(!is_json_format(Some("pretty"), true));
        assert!(is_json_format(None, true));
        assert!(!is_json_format(None, false));
    }

    #[test]
    fn test_unwritable_log_file_is_reported() {
        let config = LogConfig {
            console_enabled: false,
            file_path: Some(PathBuf::from("/nonexistent-dir/aetheria/sensors.log")),
            ..Default::default()
        };
        assert!(matches!(init_logging(&config), Err(LoggingError::File { .. })));
    }
}
