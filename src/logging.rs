//! Logging setup.
//!
//! Builds a `tracing` dispatcher from [`LoggingConfig`] and hands it back as a
//! value. The binary scopes the run to that dispatcher instead of installing a
//! process-wide default, so tests and embedders can keep their own.

use std::path::Path;

use tracing::Dispatch;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{self, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::{LogRotation, LoggingConfig};
use crate::error::ConfigError;

/// A configured dispatcher plus the guard that flushes the file writer.
///
/// Dropping this flushes and closes the log file.
pub struct Logging {
    dispatch: Dispatch,
    _file_guard: Option<WorkerGuard>,
}

impl std::fmt::Debug for Logging {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logging")
            .field("file", &self._file_guard.is_some())
            .finish()
    }
}

impl Logging {
    pub fn init(config: &LoggingConfig) -> Result<Self, ConfigError> {
        let filter = EnvFilter::try_new(&config.level).map_err(|e| ConfigError::InvalidValue {
            key: "LOG_LEVEL".into(),
            message: format!("'{}': {e}", config.level),
        })?;

        let console = config
            .console
            .then(|| fmt::layer().with_writer(std::io::stderr).with_target(true));

        let (file_layer, file_guard) = match &config.file {
            Some(path) => {
                let (writer, guard) = rolling_writer(path, config)?;
                let layer = fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(true);
                (Some(layer), Some(guard))
            }
            None => (None, None),
        };

        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(console)
            .with(file_layer);

        let logging = Self {
            dispatch: Dispatch::new(subscriber),
            _file_guard: file_guard,
        };

        tracing::dispatcher::with_default(&logging.dispatch, || {
            tracing::info!(level = %config.level, "Logging initialized");
            if let Some(path) = &config.file {
                tracing::info!(file = %path.display(), rotation = ?config.rotation, "Log file");
            }
        });

        Ok(logging)
    }

    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }
}

fn rolling_writer(
    path: &Path,
    config: &LoggingConfig,
) -> Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard), ConfigError> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let prefix = path
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ConfigError::InvalidValue {
            key: "LOG_FILE".into(),
            message: format!("'{}' has no file name", path.display()),
        })?;

    let mut builder = rolling::Builder::new()
        .rotation(rotation(config.rotation))
        .filename_prefix(prefix);
    if let Some(ext) = path.extension().and_then(|s| s.to_str()) {
        builder = builder.filename_suffix(ext);
    }
    if config.max_files > 0 {
        builder = builder.max_log_files(config.max_files);
    }

    let appender = builder.build(dir).map_err(|e| ConfigError::InvalidValue {
        key: "LOG_FILE".into(),
        message: e.to_string(),
    })?;

    Ok(tracing_appender::non_blocking(appender))
}

fn rotation(rotation: LogRotation) -> Rotation {
    match rotation {
        LogRotation::Minutely => Rotation::MINUTELY,
        LogRotation::Hourly => Rotation::HOURLY,
        LogRotation::Daily => Rotation::DAILY,
        LogRotation::Never => Rotation::NEVER,
    }
}
