//! The upload state machine.
//!
//! `Idle -> CheckingConnectivity -> [WaitingForNetwork] -> ValidatingAuth ->
//! ValidatingFile -> Compressing -> [GeneratingThumbnail -> UploadingThumbnail]
//! -> UploadingMain -> Completed`, with `Failed` reachable from every stage.
//!
//! Pure file checks also run as a pre-flight in `Idle`, so a file that can
//! never be accepted fails before any network traffic.

use super::backend::{ImageCompressor, StorageBackend, ThumbnailRenderer};
use super::callbacks::UploadCallbacks;
use super::classify::upload_error_from_backend;
use super::compression::options_for_attempt;
use super::probe::{probe_connectivity, ProbeOutcome, ProbeSettings};
use super::types::{MediaFile, UploadResult, UploadStage};
use super::validation::validate_file;
use crate::auth::{AuthGuard, AuthProvider};
use crate::config::UploadConfig;
use crate::logging::log_upload_failure;
use crate::network::{ListenerHandle, MonitorLease, NetworkMonitor};
use crate::retry::{retry_with_backoff, RetryContext, RetryOptions};
use crate::upload_error::{ErrorKind, UploadError};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Runs uploads against one set of collaborators.
///
/// Cheap to clone; clones share the monitor and backends, so overlapping
/// uploads can run from separate tasks.
#[derive(Clone)]
pub struct Uploader {
    config: Arc<UploadConfig>,
    monitor: NetworkMonitor,
    auth: AuthGuard,
    storage: Arc<dyn StorageBackend>,
    compressor: Arc<dyn ImageCompressor>,
    thumbnails: Option<Arc<dyn ThumbnailRenderer>>,
    retry_options: RetryOptions,
}

impl std::fmt::Debug for Uploader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Uploader")
            .field("config", &self.config)
            .field("monitor", &self.monitor)
            .field("thumbnails", &self.thumbnails.is_some())
            .field("retry_options", &self.retry_options)
            .finish()
    }
}

/// Keeps the monitor running and the run's listener attached until dropped.
struct NetworkWatch {
    _listener: ListenerHandle,
    _lease: MonitorLease,
}

/// Current stage plus the callbacks that observe it.
struct StageReporter<'a> {
    callbacks: &'a UploadCallbacks,
    current: Mutex<UploadStage>,
}

impl<'a> StageReporter<'a> {
    fn new(callbacks: &'a UploadCallbacks) -> Self {
        Self {
            callbacks,
            current: Mutex::new(UploadStage::Idle),
        }
    }

    fn enter(&self, stage: UploadStage, status: &str) {
        if let Ok(mut current) = self.current.lock() {
            *current = stage;
        }
        debug!(%stage, status, "Upload stage");
        self.callbacks.progress(stage, status);
    }

    fn current(&self) -> UploadStage {
        self.current
            .lock()
            .map(|stage| *stage)
            .unwrap_or(UploadStage::Idle)
    }
}

impl Uploader {
    pub fn new(
        config: UploadConfig,
        monitor: NetworkMonitor,
        auth: Arc<dyn AuthProvider>,
        storage: Arc<dyn StorageBackend>,
        compressor: Arc<dyn ImageCompressor>,
    ) -> Self {
        let retry_options = config.retry_options();
        Self {
            config: Arc::new(config),
            monitor,
            auth: AuthGuard::new(auth),
            storage,
            compressor,
            thumbnails: None,
            retry_options,
        }
    }

    /// Enables thumbnails (when also enabled in the config).
    pub fn with_thumbnail_renderer(mut self, renderer: Arc<dyn ThumbnailRenderer>) -> Self {
        self.thumbnails = Some(renderer);
        self
    }

    /// Overrides the retry options derived from the config, e.g. to install
    /// a custom retry predicate.
    pub fn with_retry_options(mut self, options: RetryOptions) -> Self {
        self.retry_options = options;
        self
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    pub fn monitor(&self) -> &NetworkMonitor {
        &self.monitor
    }

    /// Runs one upload to completion. Never panics on backend failures; every
    /// outcome is reported through the returned [`UploadResult`] and the
    /// matching callback.
    pub async fn run_upload(
        &self,
        file: MediaFile,
        destination_id: &str,
        callbacks: &UploadCallbacks,
    ) -> UploadResult {
        let upload_id = Uuid::new_v4();
        let span = info_span!("upload", %upload_id, destination_id);

        async move {
            info!(file = %file.name, bytes = file.len(), "Upload started");
            callbacks.started();

            // Dropped on every exit path, including unwinding and cancellation
            let _watch = callbacks.network_listener().map(|listener| {
                let lease = self.monitor.acquire(self.config.monitor_interval());
                let handle = self.monitor.add_listener(move |state| listener(state));
                NetworkWatch {
                    _listener: handle,
                    _lease: lease,
                }
            });

            let reporter = StageReporter::new(callbacks);
            match self.execute(&file, destination_id, &reporter).await {
                Ok((image_url, thumbnail_url)) => {
                    reporter.enter(UploadStage::Completed, "Upload complete");
                    info!(%image_url, thumbnail = thumbnail_url.is_some(), "Upload complete");
                    callbacks.completed(&image_url, thumbnail_url.as_deref());
                    UploadResult::completed(image_url, thumbnail_url)
                }
                Err(err) => {
                    let failed_in = reporter.current();
                    warn!(stage = %failed_in, kind = %err.kind(), "Upload failed");
                    log_upload_failure(&err);
                    reporter.enter(UploadStage::Failed, "Upload failed");
                    callbacks.failed(err.user_message(), err.kind());
                    UploadResult::failed(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        file: &MediaFile,
        destination_id: &str,
        reporter: &StageReporter<'_>,
    ) -> Result<(String, Option<String>), UploadError> {
        validate_file(file, &self.config)?;

        reporter.enter(UploadStage::CheckingConnectivity, "Checking connection...");
        let probe = probe_connectivity(
            &self.monitor,
            self.auth.provider().as_ref(),
            ProbeSettings {
                timeout: self.config.probe_timeout(),
                slow_threshold: self.config.slow_probe_threshold(),
            },
        )
        .await;
        info!(%probe, "Connectivity probe");

        if probe == ProbeOutcome::Offline {
            reporter.enter(
                UploadStage::WaitingForNetwork,
                "Waiting for network connection...",
            );
            self.monitor
                .wait_for_network(self.config.network_wait_timeout())
                .await?;
        }

        reporter.enter(UploadStage::ValidatingAuth, "Verifying sign-in...");
        self.validate_auth().await?;

        reporter.enter(UploadStage::ValidatingFile, "Validating file...");
        let size = validate_file(file, &self.config)?;
        debug!(bytes = size, mime_type = %file.mime_type, "File accepted");

        reporter.enter(UploadStage::Compressing, "Compressing image...");
        let baseline = self.compress_baseline(file).await?;

        let thumbnail_url = self.thumbnail(file, destination_id, reporter).await;

        let max_attempts = self.retry_options.max_attempts.max(1);
        let baseline = &baseline;
        let image_url = retry_with_backoff(
            move |ctx| {
                self.attempt_upload(ctx, max_attempts, file, baseline, destination_id, reporter)
            },
            &self.retry_options,
        )
        .await?;

        Ok((image_url, thumbnail_url))
    }

    async fn validate_auth(&self) -> Result<(), UploadError> {
        let snapshot = self.auth.get_auth_snapshot().await;

        if !snapshot.user_present || !snapshot.token_valid {
            let message = if snapshot.user_present {
                "Auth token could not be read or is invalid"
            } else {
                "No signed-in user"
            };
            return Err(UploadError::new(ErrorKind::Auth, message)
                .with_auth(snapshot)
                .with_network(self.monitor.snapshot()));
        }

        if self.auth.refresh_if_needed().await {
            debug!("Token refreshed before upload");
        }
        Ok(())
    }

    /// Baseline compression. Falls back to the original unless it is too
    /// large to send uncompressed.
    async fn compress_baseline(&self, file: &MediaFile) -> Result<MediaFile, UploadError> {
        match self.compressor.compress(file, &self.config.compression).await {
            Ok(compressed) => {
                info!(
                    original_bytes = file.len(),
                    compressed_bytes = compressed.len(),
                    "Compressed image"
                );
                Ok(compressed)
            }
            Err(e) if file.len() > self.config.max_uncompressed_upload_bytes => {
                Err(UploadError::new(
                    ErrorKind::Compression,
                    format!(
                        "Compression failed and the original ({} bytes) exceeds the {} byte limit for uncompressed uploads",
                        file.len(),
                        self.config.max_uncompressed_upload_bytes
                    ),
                )
                .with_cause(e))
            }
            Err(e) => {
                warn!(error = %e, "Compression failed, uploading original file");
                Ok(file.clone())
            }
        }
    }

    /// Best-effort: any failure is logged and yields `None`.
    async fn thumbnail(
        &self,
        file: &MediaFile,
        destination_id: &str,
        reporter: &StageReporter<'_>,
    ) -> Option<String> {
        let renderer = self.thumbnails.as_ref()?;
        let settings = &self.config.thumbnail;
        if !settings.enabled {
            return None;
        }

        reporter.enter(UploadStage::GeneratingThumbnail, "Generating thumbnail...");
        let bytes = match renderer
            .make_thumbnail(
                file,
                settings.width,
                settings.height,
                settings.format,
                settings.quality,
            )
            .await
        {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "Thumbnail generation failed, continuing without it");
                return None;
            }
        };

        reporter.enter(UploadStage::UploadingThumbnail, "Uploading thumbnail...");
        let thumbnail = MediaFile::new(
            format!("thumb_{}", file.renamed_with_extension(settings.format.extension())),
            settings.format.mime_type(),
            bytes,
        );

        let storage = Arc::clone(&self.storage);
        let destination = destination_id.to_string();
        let task =
            tokio::spawn(async move { storage.upload_thumbnail(&thumbnail, &destination).await });

        match tokio::time::timeout(self.config.upload_timeout(), task).await {
            Ok(Ok(Ok(url))) => Some(url),
            Ok(Ok(Err(failure))) => {
                warn!(error = %failure, "Thumbnail upload failed, continuing without it");
                None
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Thumbnail upload task failed");
                None
            }
            Err(_) => {
                warn!("Thumbnail upload timed out, continuing without it");
                None
            }
        }
    }

    async fn attempt_upload(
        &self,
        ctx: RetryContext,
        max_attempts: u32,
        original: &MediaFile,
        baseline: &MediaFile,
        destination_id: &str,
        reporter: &StageReporter<'_>,
    ) -> Result<String, UploadError> {
        reporter.enter(
            UploadStage::UploadingMain,
            &format!(
                "Uploading image (attempt {} of {})...",
                ctx.attempt, max_attempts
            ),
        );

        let payload = if ctx.attempt > 1 {
            if let Some(previous) = &ctx.last_error {
                debug!(attempt = ctx.attempt, previous = %previous, "Retrying upload");
            }
            self.auth.refresh_if_needed().await;
            self.degraded(original, baseline, ctx.attempt).await
        } else {
            baseline.clone()
        };

        self.upload_with_timeout(payload, destination_id, ctx.attempt)
            .await
    }

    /// Re-compresses the original more aggressively for `attempt`.
    async fn degraded(
        &self,
        original: &MediaFile,
        baseline: &MediaFile,
        attempt: u32,
    ) -> MediaFile {
        let options =
            options_for_attempt(&self.config.compression, &self.config.degradation, attempt);
        match self.compressor.compress(original, &options).await {
            Ok(file) => {
                debug!(
                    attempt,
                    max_dimension_px = options.max_dimension_px,
                    quality = options.quality,
                    max_size_mb = options.max_size_mb,
                    bytes = file.len(),
                    "Re-compressed for retry"
                );
                file
            }
            Err(e) => {
                warn!(attempt, error = %e, "Re-compression failed, reusing baseline");
                baseline.clone()
            }
        }
    }

    /// Races the backend call against the per-attempt timeout.
    ///
    /// The call runs on its own task. On timeout the task is detached rather
    /// than aborted: the backend cannot cancel a started upload, so the
    /// timeout only stops waiting for it.
    async fn upload_with_timeout(
        &self,
        payload: MediaFile,
        destination_id: &str,
        attempt: u32,
    ) -> Result<String, UploadError> {
        let timeout: Duration = self.config.upload_timeout();
        let storage = Arc::clone(&self.storage);
        let destination = destination_id.to_string();
        let bytes = payload.len();

        let task = tokio::spawn(async move { storage.upload_bytes(&payload, &destination).await });

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(Ok(url))) => {
                debug!(attempt, bytes, "Upload attempt succeeded");
                Ok(url)
            }
            Ok(Ok(Err(failure))) => {
                Err(upload_error_from_backend(failure).with_network(self.monitor.snapshot()))
            }
            Ok(Err(e)) => Err(UploadError::new(
                ErrorKind::Unknown,
                format!("Upload task failed: {}", e),
            )
            .with_cause(e)),
            Err(_) => Err(UploadError::new(
                ErrorKind::Timeout,
                format!(
                    "Upload attempt {} timed out after {}ms",
                    attempt,
                    timeout.as_millis()
                ),
            )
            .with_network(self.monitor.snapshot())),
        }
    }
}
