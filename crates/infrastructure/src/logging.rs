use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{ConfigError, LogConfig, LogFormat, LogLevel};
use crate::constants::FALLBACK_LOG_PATH;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Owns the log file. Dropping it flushes the file to disk, so it must
/// outlive every task that logs.
#[must_use = "dropping the guard closes the log file"]
pub struct LogGuard {
    file: Option<Arc<File>>,
    path: Option<PathBuf>,
}

impl LogGuard {
    /// Path actually written to, after any fallback.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn flush(&self) {
        if let Some(file) = &self.file {
            let _ = file.sync_all();
        }
    }
}

impl Drop for LogGuard {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Initialize structured logging.
///
/// - stdout: `LogFormat::Json` is flattened JSON, `LogFormat::Text` is
///   human-readable colored output.
/// - file: JSON lines appended to `config.path` when set. If its directory
///   cannot be created, `./nat.log` is used instead.
///
/// Uses `RUST_LOG` env var if set, otherwise falls back to the given `level`.
/// Must be called exactly once at startup.
pub fn init_logging(
    config: &LogConfig,
    level: LogLevel,
    format: LogFormat,
) -> Result<LogGuard, ConfigError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let mut layers: Vec<BoxedLayer> = vec![stdout_layer(format)];

    let mut fell_back_from = None;
    let mut guard = LogGuard {
        file: None,
        path: None,
    };
    if let Some(requested) = config.file_path() {
        let path = if ensure_parent_dir(requested) {
            requested.to_path_buf()
        } else {
            fell_back_from = Some(requested.to_path_buf());
            PathBuf::from(FALLBACK_LOG_PATH)
        };
        let file = Arc::new(open_log_file(&path)?);
        layers.push(file_layer(Arc::clone(&file)));
        guard.file = Some(file);
        guard.path = Some(path);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init()
        .map_err(|e| ConfigError::Validation {
            field: "log".to_string(),
            message: format!("logging already initialized: {e}"),
        })?;

    if let Some(requested) = fell_back_from {
        tracing::warn!(
            requested = %requested.display(),
            fallback = FALLBACK_LOG_PATH,
            "cannot create log directory, using fallback log file"
        );
    }
    if config.has_rotation_settings() {
        tracing::warn!("log rotation settings are ignored; rotate the log file externally");
    }

    Ok(guard)
}

fn stdout_layer(format: LogFormat) -> BoxedLayer {
    match format {
        LogFormat::Json => fmt::layer()
            .json()
            .flatten_event(true)
            .with_target(true)
            .with_thread_ids(false)
            .with_ansi(false)
            .boxed(),
        LogFormat::Text => fmt::layer().pretty().with_target(true).with_ansi(true).boxed(),
    }
}

fn file_layer(file: Arc<File>) -> BoxedLayer {
    fmt::layer()
        .json()
        .flatten_event(true)
        .with_target(false)
        .with_ansi(false)
        .with_writer(file)
        .boxed()
}

fn ensure_parent_dir(path: &Path) -> bool {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => std::fs::create_dir_all(dir).is_ok(),
        _ => true,
    }
}

fn open_log_file(path: &Path) -> Result<File, ConfigError> {
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}
