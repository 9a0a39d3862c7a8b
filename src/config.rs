use crate::error::{AppError, ErrorContext};
use crate::retry::RetryOptions;
use crate::upload::{CompressionOptions, DegradationPolicy, OutputFormat};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UploadConfig {
    /// Exact MIME types, or `type/*` wildcards
    pub accepted_mime_types: Vec<String>,
    pub max_file_size_bytes: u64,
    /// Above this the original cannot be sent when compression fails.
    pub max_uncompressed_upload_bytes: u64,
    pub upload_timeout_ms: u64,
    pub network_wait_timeout_ms: u64,
    pub probe_timeout_ms: u64,
    pub slow_probe_threshold_ms: u64,
    pub monitor_interval_ms: u64,
    pub retry: RetrySettings,
    pub compression: CompressionOptions,
    pub degradation: DegradationPolicy,
    pub thumbnail: ThumbnailSettings,
    pub storage: Option<StorageEndpoint>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            accepted_mime_types: vec![
                "image/jpeg".to_string(),
                "image/png".to_string(),
                "image/gif".to_string(),
                "image/webp".to_string(),
            ],
            max_file_size_bytes: 10 * 1024 * 1024,
            max_uncompressed_upload_bytes: 5 * 1024 * 1024,
            upload_timeout_ms: 60_000,
            network_wait_timeout_ms: 30_000,
            probe_timeout_ms: 5_000,
            slow_probe_threshold_ms: 3_000,
            monitor_interval_ms: 5_000,
            retry: RetrySettings::default(),
            compression: CompressionOptions::default(),
            degradation: DegradationPolicy::default(),
            thumbnail: ThumbnailSettings::default(),
            storage: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_factor: f64,
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 2_000,
            max_delay_ms: 30_000,
            backoff_factor: 2.0,
            jitter: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ThumbnailSettings {
    pub enabled: bool,
    pub width: u32,
    pub height: u32,
    pub format: OutputFormat,
    pub quality: f32,
}

impl Default for ThumbnailSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            width: 200,
            height: 150,
            format: OutputFormat::Jpeg,
            quality: 0.7,
        }
    }
}

/// Where [`crate::upload::HttpStorageBackend`] sends objects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageEndpoint {
    pub base_url: String,
}

impl UploadConfig {
    pub fn accepts_mime(&self, mime_type: &str) -> bool {
        let mime_type = mime_type.trim().to_ascii_lowercase();
        self.accepted_mime_types.iter().any(|accepted| {
            let accepted = accepted.trim().to_ascii_lowercase();
            match accepted.strip_suffix("/*") {
                Some(prefix) => mime_type
                    .split_once('/')
                    .map(|(top, _)| top == prefix)
                    .unwrap_or(false),
                None => accepted == mime_type,
            }
        })
    }

    /// Retry options for the main upload, using the default retry predicate.
    pub fn retry_options(&self) -> RetryOptions {
        RetryOptions {
            max_attempts: self.retry.max_attempts,
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
            backoff_factor: self.retry.backoff_factor,
            jitter: self.retry.jitter,
            ..RetryOptions::default()
        }
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_millis(self.upload_timeout_ms)
    }

    pub fn network_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.network_wait_timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn slow_probe_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_probe_threshold_ms)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.retry.max_attempts == 0 {
            return Err(AppError::Config("retry.maxAttempts must be at least 1".into()));
        }
        if self.retry.backoff_factor.is_nan() || self.retry.backoff_factor < 1.0 {
            return Err(AppError::Config("retry.backoffFactor must be >= 1".into()));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(AppError::Config(
                "retry.baseDelayMs must not exceed retry.maxDelayMs".into(),
            ));
        }
        if self.upload_timeout_ms == 0 || self.monitor_interval_ms == 0 {
            return Err(AppError::Config(
                "uploadTimeoutMs and monitorIntervalMs must be positive".into(),
            ));
        }
        if self.accepted_mime_types.is_empty() {
            return Err(AppError::Config("acceptedMimeTypes must not be empty".into()));
        }
        if !(0.0..=1.0).contains(&self.compression.quality)
            || !(0.0..=1.0).contains(&self.thumbnail.quality)
        {
            return Err(AppError::Config("quality values must be within 0.0 - 1.0".into()));
        }
        if self.thumbnail.enabled && (self.thumbnail.width == 0 || self.thumbnail.height == 0) {
            return Err(AppError::Config("thumbnail dimensions must be positive".into()));
        }
        Ok(())
    }
}

pub fn get_config_dir() -> Result<PathBuf, AppError> {
    if let Some(home_dir) = dirs::home_dir() {
        Ok(home_dir.join(".hotspot-uploader"))
    } else {
        Err(AppError::Config("Could not find home directory".into()))
    }
}

pub fn get_config_file_path() -> Result<PathBuf, AppError> {
    Ok(get_config_dir()?.join("upload.json"))
}

pub fn get_logs_dir() -> Result<PathBuf, AppError> {
    Ok(get_config_dir()?.join("logs"))
}

/// Creates `dir` with owner-only permissions if it is missing.
pub fn ensure_private_dir(dir: &Path) -> Result<(), AppError> {
    if !dir.exists() {
        fs::create_dir_all(dir).context("Failed to create directory")?;

        // Set permissions to 700 (read/write/execute for owner only) on Unix systems
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let metadata = fs::metadata(dir)?;
            let mut permissions = metadata.permissions();
            permissions.set_mode(0o700);
            fs::set_permissions(dir, permissions)?;
        }
    }
    Ok(())
}

pub fn ensure_logs_dir() -> Result<PathBuf, AppError> {
    let logs_dir = get_logs_dir()?;
    ensure_private_dir(&logs_dir)?;
    Ok(logs_dir)
}

pub fn load_config() -> Result<UploadConfig, AppError> {
    load_config_from(&get_config_file_path()?)
}

/// Missing files yield the defaults; present files are validated.
pub fn load_config_from(path: &Path) -> Result<UploadConfig, AppError> {
    if !path.exists() {
        return Ok(UploadConfig::default());
    }

    let content = fs::read_to_string(path).context("Failed to read upload config")?;
    let config: UploadConfig =
        serde_json::from_str(&content).context("Failed to parse upload config")?;
    config.validate()?;
    Ok(config)
}

pub fn save_config(config: &UploadConfig) -> Result<(), AppError> {
    save_config_to(config, &get_config_file_path()?)
}

pub fn save_config_to(config: &UploadConfig, path: &Path) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        ensure_private_dir(parent)?;
    }

    let content = serde_json::to_string_pretty(config)?;
    fs::write(path, content).context("Failed to write upload config")?;

    // Set permissions to 600 (read/write for owner only) on Unix systems
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let metadata = fs::metadata(path)?;
        let mut permissions = metadata.permissions();
        permissions.set_mode(0o600);
        fs::set_permissions(path, permissions)?;
    }

    Ok(())
}
