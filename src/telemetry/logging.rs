//! Subscriber setup: an `EnvFilter` plus a JSON or pretty formatter
//! writing to stderr or a file.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::fmt::{self, writer::BoxMakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON structured logging.
    Json,
    /// Human-readable pretty printing (default for the CLI).
    #[default]
    Pretty,
}

impl LogFormat {
    /// Parse `"json"` or `"pretty"`, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "pretty" => Some(Self::Pretty),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Pretty => "pretty",
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub format: LogFormat,
    /// Filter directive (e.g., "info", "gg_session=trace").
    pub level: String,
    /// Log file; stderr when `None`.
    pub output_path: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            level: "info".to_string(),
            output_path: None,
        }
    }
}

/// Errors that can occur during logging initialization.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("Invalid log filter: {0}")]
    InvalidFilter(String),
    #[error("Failed to open log file: {0}")]
    FileOpen(String),
    #[error("Subscriber already initialized")]
    AlreadyInitialized,
}

/// Install the global subscriber for `config`.
///
/// Call once at startup; later calls fail with `AlreadyInitialized`.
pub fn init_logging(config: &LogConfig) -> Result<(), LogError> {
    let filter = EnvFilter::try_new(&config.level)
        .map_err(|e| LogError::InvalidFilter(e.to_string()))?;
    let (writer, ansi) = match &config.output_path {
        Some(path) => (BoxMakeWriter::new(open_log_file(path)?), false),
        None => (BoxMakeWriter::new(std::io::stderr), true),
    };

    // Exactly one of the two layers is present.
    let (json, pretty) = match config.format {
        LogFormat::Json => (Some(fmt::layer().json().with_writer(writer)), None),
        LogFormat::Pretty => (None, Some(fmt::layer().pretty().with_ansi(ansi).with_writer(writer))),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(pretty)
        .try_init()
        .map_err(|_| LogError::AlreadyInitialized)
}

fn open_log_file(path: &Path) -> Result<Mutex<File>, LogError> {
    let file = File::create(path)
        .map_err(|e| LogError::FileOpen(format!("{}: {e}", path.display())))?;
    Ok(Mutex::new(file))
}
