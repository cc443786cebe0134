//! ## Sets up logging by reading configuration from environment variables.
//!
//! Environment variables used:
//! - LOG_MODE: "stdout" (default) or "file"
//! - LOG_LEVEL: log level ("trace", "debug", "info", "warn", "error"); default is "info"
//! - LOG_DATA_DIR: directory for file mode (default "./logs")
//! - LOG_MAX_SIZE: size in bytes past which a new file index is started (default 1 GiB)
//!
//! Also home of the one-line job lifecycle event format shared by the
//! retry engine and the delivery handler.
use chrono::Utc;
use log::info;
use simplelog::{Config, LevelFilter, SimpleLogger, WriteLogger};
use std::{
    env,
    fs::{create_dir_all, metadata, OpenOptions},
    io,
    path::Path,
};
use strum::Display;
use thiserror::Error;

const LOG_FILE_NAME: &str = "queue-worker.log";
const DEFAULT_LOG_DIR: &str = "./logs";
const DEFAULT_LOG_MAX_SIZE: u64 = 1_073_741_824;

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Unable to prepare log file: {0}")]
    Io(#[from] io::Error),
    #[error("Logger already initialized: {0}")]
    Init(#[from] log::SetLoggerError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogMode {
    Stdout,
    File { dir: String, max_size: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub mode: LogMode,
    pub level: LevelFilter,
}

impl LoggingConfig {
    pub fn from_env() -> Self {
        let level = match env::var("LOG_LEVEL")
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "trace" => LevelFilter::Trace,
            "debug" => LevelFilter::Debug,
            "warn" => LevelFilter::Warn,
            "error" => LevelFilter::Error,
            _ => LevelFilter::Info,
        };

        let file_mode = env::var("LOG_MODE")
            .map(|mode| mode.eq_ignore_ascii_case("file"))
            .unwrap_or(false);

        let mode = if file_mode {
            LogMode::File {
                dir: env::var("LOG_DATA_DIR").unwrap_or_else(|_| DEFAULT_LOG_DIR.to_string()),
                max_size: env::var("LOG_MAX_SIZE")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_LOG_MAX_SIZE),
            }
        } else {
            LogMode::Stdout
        };

        Self { mode, level }
    }
}

/// `logs/queue-worker.log` + `2024-05-01` + 2 -> `logs/queue-worker-2024-05-01.2.log`
pub fn compute_rolled_file_path(base_file_path: &str, date_str: &str, index: u32) -> String {
    let stem = base_file_path
        .strip_suffix(".log")
        .unwrap_or(base_file_path);
    format!("{}-{}.{}.log", stem, date_str, index)
}

/// First rolled file for `date_str` that is absent or not larger than `max_size`.
pub fn resolve_log_file_path(base_file_path: &str, date_str: &str, max_size: u64) -> String {
    let mut index = 1;
    loop {
        let candidate = compute_rolled_file_path(base_file_path, date_str, index);
        match metadata(&candidate) {
            Ok(meta) if meta.len() > max_size => index += 1,
            _ => return candidate,
        }
    }
}

/// Installs the global logger. Fails if one is already installed.
pub fn setup_logging() -> Result<(), LoggingError> {
    init_logger(&LoggingConfig::from_env())
}

pub fn init_logger(config: &LoggingConfig) -> Result<(), LoggingError> {
    match &config.mode {
        LogMode::Stdout => {
            SimpleLogger::init(config.level, Config::default())?;
            info!("Logging is successfully configured (mode: stdout)");
        }
        LogMode::File { dir, max_size } => {
            let path = prepare_log_file(dir, &Utc::now().format("%Y-%m-%d").to_string(), *max_size)?;
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            WriteLogger::init(config.level, Config::default(), file)?;
            info!("Logging is successfully configured (mode: file, path: {})", path);
        }
    }
    Ok(())
}

/// Creates `dir` if needed and picks the file to append to for `date_str`.
pub fn prepare_log_file(dir: &str, date_str: &str, max_size: u64) -> Result<String, LoggingError> {
    create_dir_all(dir)?;
    let base = Path::new(dir).join(LOG_FILE_NAME);
    Ok(resolve_log_file_path(
        &base.to_string_lossy(),
        date_str,
        max_size,
    ))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum JobEvent {
    Started,
    Completed,
    Retry,
    Failed,
}

pub fn format_job_event(job_id: &str, job_type: &str, event: JobEvent, detail: &str) -> String {
    format!("[Job {}] [{}] {} - {}", job_id, job_type, event, detail)
}

pub fn log_job_event(job_id: &str, job_type: &str, event: JobEvent, detail: &str) {
    let line = format_job_event(job_id, job_type, event, detail);
    match event {
        JobEvent::Failed => log::error!("{}", line),
        JobEvent::Retry => log::warn!("{}", line),
        _ => info!("{}", line),
    }
}
