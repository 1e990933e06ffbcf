//! Tracing subscriber setup: terminal output plus an optional log file.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Mutex;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::error::{io_err, DaemonError};
use crate::log_rotation::{rotate_if_needed, MAX_LOG_BYTES, MAX_ROTATED_FILES};

/// Line format of the log file. The terminal always gets plain text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}' (expected text or json)")),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogFormat::Text => "text",
            LogFormat::Json => "json",
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    /// Append log lines to this file in addition to the terminal.
    pub file: Option<PathBuf>,
    /// Suppress terminal output.
    pub quiet: bool,
    pub format: LogFormat,
}

/// Install the global subscriber.
///
/// The filter comes from `RUST_LOG`, defaulting to `info`. The log file is
/// rotated before it is opened. Returns `false` when a global subscriber was
/// already installed; that one stays in place.
pub fn init(options: &LogOptions) -> Result<bool, DaemonError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let terminal = (!options.quiet).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
    });

    let file_layer = match &options.file {
        Some(path) => {
            let file = open_log_file(path)?;
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_target(false);
            Some(match options.format {
                LogFormat::Text => layer.with_writer(Mutex::new(file)).boxed(),
                LogFormat::Json => layer.json().with_writer(Mutex::new(file)).boxed(),
            })
        }
        None => None,
    };

    match tracing_subscriber::registry()
        .with(filter)
        .with(terminal)
        .with(file_layer)
        .try_init()
    {
        Ok(()) => Ok(true),
        Err(err) => {
            tracing::debug!(error = %err, "global subscriber already installed, keeping it");
            Ok(false)
        }
    }
}

fn open_log_file(path: &std::path::Path) -> Result<fs::File, DaemonError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    match rotate_if_needed(path, MAX_LOG_BYTES, MAX_ROTATED_FILES) {
        Ok(true) => eprintln!("rotated log file {}", path.display()),
        Ok(false) => {}
        Err(err) => eprintln!("log rotation failed for {}: {err}", path.display()),
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| io_err(path, e))
}
