//! In-memory collaborators shared by the pipeline integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hotspot_media_upload::network::StaticConnectivity;
use hotspot_media_upload::upload::{
    BackendFailure, CodecError, CompressionOptions, ImageCompressor, OutputFormat,
    StorageBackend, ThumbnailRenderer,
};
use hotspot_media_upload::{
    AuthProvider, ErrorKind, MediaFile, NetworkMonitor, NetworkSnapshot, NetworkState,
    TokenInfo, UploadCallbacks, UploadConfig, UploadStage, Uploader,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn test_config() -> UploadConfig {
    let mut config = UploadConfig::default();
    config.retry.base_delay_ms = 100;
    config.retry.max_delay_ms = 1_000;
    config.retry.jitter = false;
    config.upload_timeout_ms = 5_000;
    config.network_wait_timeout_ms = 10_000;
    config.monitor_interval_ms = 1_000;
    config
}

pub fn jpeg(len: usize) -> MediaFile {
    MediaFile::new("slide.jpg", "image/jpeg", vec![42; len])
}

#[derive(Default)]
pub struct FakeStorage {
    script: Mutex<VecDeque<Result<String, BackendFailure>>>,
    delay: Mutex<Duration>,
    thumbnail_failure: Mutex<Option<BackendFailure>>,
    always_fail: Mutex<Option<BackendFailure>>,
    pub upload_calls: AtomicU32,
    pub thumbnail_calls: AtomicU32,
    pub payload_sizes: Mutex<Vec<usize>>,
}

impl FakeStorage {
    /// Responses for the next main uploads, in order; afterwards uploads succeed.
    pub fn script(&self, responses: Vec<Result<String, BackendFailure>>) {
        *self.script.lock().unwrap() = responses.into();
    }

    pub fn fail_always(&self, failure: BackendFailure) {
        *self.always_fail.lock().unwrap() = Some(failure);
    }

    pub fn fail_thumbnails(&self, failure: BackendFailure) {
        *self.thumbnail_failure.lock().unwrap() = Some(failure);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn uploads(&self) -> u32 {
        self.upload_calls.load(Ordering::SeqCst)
    }

    pub fn thumbnails(&self) -> u32 {
        self.thumbnail_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StorageBackend for FakeStorage {
    async fn upload_bytes(
        &self,
        file: &MediaFile,
        destination_id: &str,
    ) -> Result<String, BackendFailure> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        self.payload_sizes.lock().unwrap().push(file.data.len());

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if let Some(failure) = self.always_fail.lock().unwrap().clone() {
            return Err(failure);
        }
        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(format!("https://cdn.test/images/{}", destination_id)))
    }

    async fn upload_thumbnail(
        &self,
        _file: &MediaFile,
        destination_id: &str,
    ) -> Result<String, BackendFailure> {
        self.thumbnail_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(failure) = self.thumbnail_failure.lock().unwrap().clone() {
            return Err(failure);
        }
        Ok(format!("https://cdn.test/thumbnails/{}", destination_id))
    }
}

/// Issues tokens with a settable lifetime and counts forced refreshes.
pub struct FakeAuth {
    pub user_present: AtomicBool,
    pub token_calls: AtomicU32,
    pub forced_refreshes: AtomicU32,
    token_lifetime: Mutex<chrono::Duration>,
    expires_at: Mutex<DateTime<Utc>>,
}

impl Default for FakeAuth {
    fn default() -> Self {
        let lifetime = chrono::Duration::hours(1);
        Self {
            user_present: AtomicBool::new(true),
            token_calls: AtomicU32::new(0),
            forced_refreshes: AtomicU32::new(0),
            token_lifetime: Mutex::new(lifetime),
            expires_at: Mutex::new(Utc::now() + lifetime),
        }
    }
}

impl FakeAuth {
    /// Every token issued from now on, including the current one, lives this long.
    pub fn set_token_lifetime(&self, lifetime: chrono::Duration) {
        *self.token_lifetime.lock().unwrap() = lifetime;
        *self.expires_at.lock().unwrap() = Utc::now() + lifetime;
    }

    pub fn forced(&self) -> u32 {
        self.forced_refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthProvider for FakeAuth {
    async fn get_token(&self, force_refresh: bool) -> Result<TokenInfo, BackendFailure> {
        self.token_calls.fetch_add(1, Ordering::SeqCst);
        let mut expires_at = self.expires_at.lock().unwrap();
        if force_refresh {
            self.forced_refreshes.fetch_add(1, Ordering::SeqCst);
            *expires_at = Utc::now() + *self.token_lifetime.lock().unwrap();
        }
        Ok(TokenInfo {
            token: "token".into(),
            expires_at: *expires_at,
        })
    }

    fn current_user_present(&self) -> bool {
        self.user_present.load(Ordering::SeqCst)
    }
}

/// Output size scales with the requested quality, so degradation is visible.
#[derive(Default)]
pub struct FakeCompressor {
    pub fail: AtomicBool,
    pub requests: Mutex<Vec<CompressionOptions>>,
}

#[async_trait]
impl ImageCompressor for FakeCompressor {
    async fn compress(
        &self,
        file: &MediaFile,
        options: &CompressionOptions,
    ) -> Result<MediaFile, CodecError> {
        self.requests.lock().unwrap().push(options.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(CodecError::Other("codec exploded".into()));
        }
        let len = (file.data.len() as f64 * options.quality as f64) as usize;
        Ok(MediaFile::new(
            file.renamed_with_extension(options.format.extension()),
            options.format.mime_type(),
            vec![1; len],
        ))
    }
}

#[derive(Default)]
pub struct FakeThumbnailer {
    pub fail: AtomicBool,
}

#[async_trait]
impl ThumbnailRenderer for FakeThumbnailer {
    async fn make_thumbnail(
        &self,
        _file: &MediaFile,
        width: u32,
        height: u32,
        _format: OutputFormat,
        _quality: f32,
    ) -> Result<Vec<u8>, CodecError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CodecError::Other("rasterizer crashed".into()));
        }
        Ok(vec![9; (width * height / 100) as usize])
    }
}

pub struct Harness {
    pub connectivity: Arc<StaticConnectivity>,
    pub monitor: NetworkMonitor,
    pub auth: Arc<FakeAuth>,
    pub storage: Arc<FakeStorage>,
    pub compressor: Arc<FakeCompressor>,
    pub thumbnails: Arc<FakeThumbnailer>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_snapshot(NetworkSnapshot::online().with_link(20.0, 40.0))
    }

    pub fn offline() -> Self {
        Self::with_snapshot(NetworkSnapshot::offline())
    }

    fn with_snapshot(snapshot: NetworkSnapshot) -> Self {
        let connectivity = Arc::new(StaticConnectivity::new(snapshot));
        let monitor = NetworkMonitor::new(connectivity.clone());
        Self {
            connectivity,
            monitor,
            auth: Arc::new(FakeAuth::default()),
            storage: Arc::new(FakeStorage::default()),
            compressor: Arc::new(FakeCompressor::default()),
            thumbnails: Arc::new(FakeThumbnailer::default()),
        }
    }

    pub fn uploader(&self, config: UploadConfig) -> Uploader {
        Uploader::new(
            config,
            self.monitor.clone(),
            self.auth.clone(),
            self.storage.clone(),
            self.compressor.clone(),
        )
        .with_thumbnail_renderer(self.thumbnails.clone())
    }

    /// Monitor fully released: no timer, no leases, no listeners.
    pub fn assert_monitor_released(&self) {
        assert!(!self.monitor.is_monitoring(), "monitor still running");
        assert_eq!(self.monitor.active_leases(), 0);
        assert_eq!(self.monitor.listener_count(), 0);
    }
}

/// Collects everything the callbacks report.
#[derive(Clone, Default)]
pub struct Recorder {
    pub starts: Arc<AtomicU32>,
    pub progress: Arc<Mutex<Vec<(UploadStage, String)>>>,
    pub completed: Arc<Mutex<Vec<(String, Option<String>)>>>,
    pub errors: Arc<Mutex<Vec<(String, ErrorKind)>>>,
    pub network: Arc<Mutex<Vec<NetworkState>>>,
}

impl Recorder {
    pub fn callbacks(&self) -> UploadCallbacks {
        let (starts, progress, completed, errors) = (
            self.starts.clone(),
            self.progress.clone(),
            self.completed.clone(),
            self.errors.clone(),
        );
        UploadCallbacks::new()
            .on_start(move || {
                starts.fetch_add(1, Ordering::SeqCst);
            })
            .on_progress(move |stage, status| {
                progress.lock().unwrap().push((stage, status.to_string()))
            })
            .on_complete(move |url, thumb| {
                completed
                    .lock()
                    .unwrap()
                    .push((url.to_string(), thumb.map(str::to_string)))
            })
            .on_error(move |message, kind| errors.lock().unwrap().push((message.to_string(), kind)))
    }

    pub fn callbacks_with_network(&self) -> UploadCallbacks {
        let network = self.network.clone();
        self.callbacks()
            .on_network_change(move |state| network.lock().unwrap().push(state.clone()))
    }

    pub fn stages(&self) -> Vec<UploadStage> {
        self.progress.lock().unwrap().iter().map(|(s, _)| *s).collect()
    }

    pub fn statuses(&self) -> Vec<String> {
        self.progress
            .lock()
            .unwrap()
            .iter()
            .map(|(_, s)| s.clone())
            .collect()
    }
}
