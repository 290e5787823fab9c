//! Logging configuration and initialization
//!
//! Console output goes to stderr so it never mixes with the progress bar's
//! redraws on a pipe. File output is written through a non-blocking appender.

use std::path::PathBuf;

use thiserror::Error;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

// Re-export WorkerGuard so callers can store it
pub use tracing_appender::non_blocking::WorkerGuard as LogGuard;

/// Environment variable holding the filter directive.
pub const LOG_ENV: &str = "WEBM_CONVERTER_LOG";
/// Environment variable selecting the output format (`json` or anything else).
pub const LOG_FORMAT_ENV: &str = "WEBM_CONVERTER_LOG_FORMAT";

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Failed to create log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("A global logger is already installed: {0}")]
    AlreadyInitialized(String),
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Enable console output (default: true)
    pub console_enabled: bool,
    /// Write logs to this file as well (default: none)
    pub file_path: Option<PathBuf>,
    /// Use JSON format on the console (default: false)
    pub json_format: bool,
    /// Default log level filter (default: "warn")
    pub default_level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            console_enabled: true,
            file_path: None,
            json_format: false,
            default_level: "warn".to_string(),
        }
    }
}

impl LogConfig {
    /// Raise the default level by `verbosity` steps (`-v` = info, `-vv` = debug, more = trace).
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.default_level = match verbosity {
            0 => self.default_level,
            1 => "info".to_string(),
            2 => "debug".to_string(),
            _ => "trace".to_string(),
        };
        self
    }
}

/// Whether JSON output is selected, the environment taking precedence.
fn json_requested(env_value: Option<&str>, configured: bool) -> bool {
    env_value.map_or(configured, |v| v.eq_ignore_ascii_case("json"))
}

/// Initialize the global subscriber.
///
/// The filter comes from `WEBM_CONVERTER_LOG`, then `RUST_LOG`, then the
/// configured default. The returned guard must be kept alive for the duration
/// of the program so file output is flushed.
pub fn init_logging(config: &LogConfig) -> Result<Option<LogGuard>, LoggingError> {
    let env_filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_env("RUST_LOG"))
        .unwrap_or_else(|_| EnvFilter::new(&config.default_level));

    let format_env = std::env::var(LOG_FORMAT_ENV).ok();
    let use_json = json_requested(format_env.as_deref(), config.json_format);

    let (file_layer, file_guard) = match &config.file_path {
        Some(path) => {
            let file = std::fs::File::create(path).map_err(|source| LoggingError::LogFile {
                path: path.clone(),
                source,
            })?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_thread_names(true)
                .with_file(true)
                .with_line_number(true)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let json_layer = (config.console_enabled && use_json).then(|| {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
    });

    let console_layer = (config.console_enabled && !use_json).then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_file(false)
            .with_line_number(false)
            .compact()
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(json_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        json_format = use_json,
        file = ?config.file_path,
        "Logging initialized"
    );

    Ok(file_guard)
}
