//! Dual output logging (console + rotating files)

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self, time::ChronoUtc},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

pub const LOG_FILE_PREFIX: &str = "market_collector";
pub const DEFAULT_LEVEL_FILTER: &str = "info,market_collector=info";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Log directory error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to initialize logging: {0}")]
    Init(String),
}

/// Logging configuration options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub log_dir: String,
    /// EnvFilter directives, e.g. "info,market_collector=debug"; RUST_LOG wins when set
    pub level_filter: String,
    pub rotation: LogRotation,
    pub console_timestamps: bool,
    /// Structured JSON lines in the log files
    pub file_json_format: bool,
    /// Rotated files kept by the appender
    pub max_log_files: usize,
    /// Files older than this are removed at startup
    pub cleanup_days: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogRotation {
    Daily,
    Hourly,
    /// Requested size limit in MB; files still roll daily
    SizeBased(u64),
}

impl LogRotation {
    /// "daily", "hourly" or "size:<MB>"; anything else means daily
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "hourly" => LogRotation::Hourly,
            s if s.starts_with("size:") => {
                let size_mb = s.trim_start_matches("size:").parse().unwrap_or(10);
                LogRotation::SizeBased(size_mb)
            }
            _ => LogRotation::Daily,
        }
    }

    fn appender_rotation(&self) -> Rotation {
        match self {
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Daily | LogRotation::SizeBased(_) => Rotation::DAILY,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: "logs".to_string(),
            level_filter: DEFAULT_LEVEL_FILTER.to_string(),
            rotation: LogRotation::Daily,
            console_timestamps: true,
            file_json_format: true,
            max_log_files: 5,
            cleanup_days: 30,
        }
    }
}

fn env_filter(directives: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives))
}

/// Install the console + file subscriber.
///
/// Files are named `market_collector.<date>.log` under `log_dir`. The
/// returned guard flushes the background writer and must outlive the
/// process's logging.
pub fn init_dual_logging(config: &LoggingConfig) -> Result<WorkerGuard, LoggingError> {
    std::fs::create_dir_all(&config.log_dir)?;

    let file_appender = RollingFileAppender::builder()
        .rotation(config.rotation.appender_rotation())
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix("log")
        .max_log_files(config.max_log_files.max(1))
        .build(&config.log_dir)
        .map_err(|e| LoggingError::Init(e.to_string()))?;
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let console_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_ansi(true)
        .with_target(true)
        .with_timer(if config.console_timestamps {
            ChronoUtc::new("%Y-%m-%d %H:%M:%S%.3f UTC".to_string())
        } else {
            ChronoUtc::new(String::new())
        })
        .with_filter(env_filter(&config.level_filter));

    let file_layer = if config.file_json_format {
        fmt::layer()
            .json()
            .with_writer(file_writer)
            .with_ansi(false)
            .with_target(true)
            .with_thread_names(true)
            .with_timer(ChronoUtc::new("%Y-%m-%dT%H:%M:%S%.3fZ".to_string()))
            .with_filter(env_filter(&config.level_filter))
            .boxed()
    } else {
        fmt::layer()
            .with_writer(file_writer)
            .with_ansi(false)
            .with_target(true)
            .with_thread_names(true)
            .with_timer(ChronoUtc::new("%Y-%m-%d %H:%M:%S%.3f UTC".to_string()))
            .with_filter(env_filter(&config.level_filter))
            .boxed()
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| LoggingError::Init(e.to_string()))?;

    tracing::info!(
        log_dir = %config.log_dir,
        rotation = ?config.rotation,
        json_format = config.file_json_format,
        "📁 Dual logging initialized - console + rotating files"
    );

    Ok(guard)
}

/// Console-only fallback when file logging cannot be set up
pub fn init_simple_logging(level_filter: &str) -> Result<(), LoggingError> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(level_filter))
        .try_init()
        .map_err(|e| LoggingError::Init(e.to_string()))?;

    tracing::info!("🖥️ Simple console logging initialized");
    Ok(())
}

fn is_collector_log(path: &Path) -> bool {
    path.is_file()
        && path.extension().map(|ext| ext == "log").unwrap_or(false)
        && path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.starts_with(LOG_FILE_PREFIX))
            .unwrap_or(false)
}

/// Collector log files in `log_dir`, sorted by name
pub fn get_current_log_files(log_dir: &str) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(log_dir)
        .map(|entries| {
            entries
                .flatten()
                .map(|entry| entry.path())
                .filter(|path| is_collector_log(path))
                .collect()
        })
        .unwrap_or_default();

    files.sort();
    files
}

/// Remove collector log files last modified more than `keep_days` ago
pub fn cleanup_old_logs(log_dir: &str, keep_days: u32) -> Result<usize, std::io::Error> {
    let cutoff = SystemTime::now()
        .checked_sub(Duration::from_secs(keep_days as u64 * 24 * 3600))
        .unwrap_or(SystemTime::UNIX_EPOCH);
    remove_logs_modified_before(log_dir, cutoff)
}

fn remove_logs_modified_before(log_dir: &str, cutoff: SystemTime) -> Result<usize, std::io::Error> {
    let mut removed_count = 0;

    for path in get_current_log_files(log_dir) {
        let modified = path.metadata().and_then(|m| m.modified());
        if matches!(modified, Ok(at) if at < cutoff) && std::fs::remove_file(&path).is_ok() {
            removed_count += 1;
            tracing::debug!("🗑️ Removed old log file: {:?}", path);
        }
    }

    if removed_count > 0 {
        tracing::info!("🧹 Cleaned up {} old log files", removed_count);
    }

    Ok(removed_count)
}

/// Log build and platform information at startup
pub fn log_system_info() {
    tracing::info!(
        package_version = env!("CARGO_PKG_VERSION"),
        target_arch = std::env::consts::ARCH,
        target_os = std::env::consts::OS,
        "📊 Environment information logged"
    );
}
