use crate::config::{ensure_logs_dir, ensure_private_dir};
use crate::error::AppError;
use crate::upload_error::UploadError;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, Mutex};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{
    fmt::{self},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

pub const UPLOAD_LOG_FILE: &str = "uploads.log";
const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024; // 10MB
const MAX_BACKUPS: u32 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub level: String,
    pub component: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl LogEntry {
    pub fn new(
        component: &str,
        level: &str,
        message: &str,
        details: Option<serde_json::Value>,
    ) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            level: level.to_uppercase(),
            component: component.to_string(),
            message: message.to_string(),
            details,
        }
    }
}

static LOGGER_INITIALIZED: std::sync::Once = std::sync::Once::new();

// Keep the guard alive for the lifetime of the program
static FILE_APPENDER_GUARD: LazyLock<Mutex<Option<tracing_appender::non_blocking::WorkerGuard>>> =
    LazyLock::new(|| Mutex::new(None));

// Serialises appends and rotation of the upload log within this process
static UPLOAD_LOG_LOCK: Mutex<()> = Mutex::new(());

pub fn init_logging() -> Result<(), AppError> {
    let logs_dir = ensure_logs_dir()?;
    init_logging_in(&logs_dir)
}

/// Installs the console and `app.log` layers. Only the first call has any effect.
pub fn init_logging_in(logs_dir: &Path) -> Result<(), AppError> {
    ensure_private_dir(logs_dir)?;

    LOGGER_INITIALIZED.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        // Console logging for development - compact format
        let console_layer = fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_filter(env_filter.clone());

        let file_appender = tracing_appender::rolling::never(logs_dir, "app.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if let Ok(mut guard_mutex) = FILE_APPENDER_GUARD.lock() {
            *guard_mutex = Some(guard);
        }

        let file_layer = fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .with_filter(env_filter);

        // A host may already have installed a global subscriber
        let _ = tracing_subscriber::registry()
            .with(console_layer)
            .with(file_layer)
            .try_init();
    });

    Ok(())
}

pub fn upload_log_path() -> Result<PathBuf, AppError> {
    Ok(ensure_logs_dir()?.join(UPLOAD_LOG_FILE))
}

/// Mirrors the event through `tracing` and appends it to `uploads.log`.
pub fn log_upload_event(
    component: &str,
    level: &str,
    message: &str,
    details: Option<serde_json::Value>,
) -> Result<(), AppError> {
    let entry = LogEntry::new(component, level, message, details);
    trace_entry(&entry);
    write_log_entry(&upload_log_path()?, &entry)
}

/// Appends `entry` to the log at `path` without mirroring it.
pub fn log_upload_event_to(path: &Path, entry: &LogEntry) -> Result<(), AppError> {
    write_log_entry(path, entry)
}

fn trace_entry(entry: &LogEntry) {
    let component = entry.component.as_str();
    match entry.level.as_str() {
        "ERROR" => error!(component = component, "{}", entry.message),
        "WARN" => warn!(component = component, "{}", entry.message),
        "DEBUG" => debug!(component = component, "{}", entry.message),
        _ => info!(component = component, "{}", entry.message),
    }
}

fn write_log_entry(path: &Path, entry: &LogEntry) -> Result<(), AppError> {
    let _lock = UPLOAD_LOG_LOCK.lock().unwrap_or_else(|e| e.into_inner());

    if should_rotate_log(path)? {
        rotate_log_file(path)?;
    }

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;

    let json_line = serde_json::to_string(entry)?;
    writeln!(file, "{}", json_line)?;
    file.flush()?;

    Ok(())
}

fn should_rotate_log(log_file_path: &Path) -> Result<bool, AppError> {
    if !log_file_path.exists() {
        return Ok(false);
    }

    let metadata = std::fs::metadata(log_file_path)?;
    Ok(metadata.len() > MAX_LOG_SIZE)
}

fn rotate_log_file(log_file_path: &Path) -> Result<(), AppError> {
    // Shift backups up one slot; the oldest is overwritten
    for i in (1..MAX_BACKUPS).rev() {
        let current_backup = log_file_path.with_extension(format!("log.{}", i));
        let next_backup = log_file_path.with_extension(format!("log.{}", i + 1));

        if current_backup.exists() {
            std::fs::rename(&current_backup, &next_backup)?;
        }
    }

    if log_file_path.exists() {
        let first_backup = log_file_path.with_extension("log.1");
        std::fs::rename(log_file_path, first_backup)?;
    }

    Ok(())
}

pub fn read_upload_log(max_lines: Option<usize>) -> Result<Vec<LogEntry>, AppError> {
    read_log_entries(&upload_log_path()?, max_lines)
}

/// Reads JSON-line entries newest-first, skipping lines that do not parse.
pub fn read_log_entries(path: &Path, max_lines: Option<usize>) -> Result<Vec<LogEntry>, AppError> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut entries = Vec::new();

    for line in reader.lines() {
        match line {
            Ok(line_content) => match serde_json::from_str::<LogEntry>(&line_content) {
                Ok(entry) => entries.push(entry),
                Err(e) => debug!(error = %e, "Skipping malformed log line"),
            },
            Err(e) => warn!(error = %e, "Error reading log line"),
        }
    }

    entries.reverse();

    if let Some(max) = max_lines {
        entries.truncate(max);
    }

    Ok(entries)
}

/// Technical detail of a failure: kind, message, cause chain and snapshots.
pub fn failure_details(err: &UploadError) -> serde_json::Value {
    let mut causes = Vec::new();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        causes.push(cause.to_string());
        source = cause.source();
    }

    json!({
        "kind": err.kind(),
        "message": err.message(),
        "timestamp": err.timestamp().to_rfc3339(),
        "causes": causes,
        "network": err.network_snapshot(),
        "auth": err.auth_snapshot(),
    })
}

/// Sends the full technical record of `err` to the log sinks.
///
/// This is the only place snapshots and cause chains are written out; the
/// user only ever sees [`UploadError::user_message`].
pub fn log_upload_failure(err: &UploadError) {
    let details = failure_details(err);
    error!(
        kind = %err.kind(),
        details = %details,
        "Upload failed: {}",
        err.message()
    );
}

// Convenience functions for different log levels
pub fn log_info(component: &str, message: &str) -> Result<(), AppError> {
    log_upload_event(component, "INFO", message, None)
}

pub fn log_warn(component: &str, message: &str) -> Result<(), AppError> {
    log_upload_event(component, "WARN", message, None)
}

pub fn log_error(component: &str, message: &str) -> Result<(), AppError> {
    log_upload_event(component, "ERROR", message, None)
}
