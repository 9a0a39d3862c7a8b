//! Seams to the external collaborators: storage, image codec and thumbnailer.
//!
//! The pipeline only sees these traits. Concrete adapters live in
//! [`crate::codec`] and [`super::http`]; tests use in-memory fakes.

use super::compression::{CompressionOptions, OutputFormat};
use super::types::MediaFile;
use async_trait::async_trait;
use thiserror::Error;

/// Failure reported by the storage or auth backend.
///
/// Adapters that know what went wrong pick a precise variant; adapters that
/// only have a message use [`BackendFailure::Other`], which the classifier
/// inspects by content.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendFailure {
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("status {code}: {message}")]
    Status { code: u16, message: String },

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("{0}")]
    Other(String),
}

/// Failure from the image codec or thumbnail renderer.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("image codec error: {0}")]
    Image(#[from] image::ImageError),

    #[error("unsupported input: {0}")]
    Unsupported(String),

    #[error("codec worker failed: {0}")]
    Worker(String),

    #[error("{0}")]
    Other(String),
}

/// Remote object store.
///
/// Both calls return the public URL of the stored object. Once started, a call
/// cannot be cancelled remotely; callers that stop waiting leave it running.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn upload_bytes(
        &self,
        file: &MediaFile,
        destination_id: &str,
    ) -> Result<String, BackendFailure>;

    async fn upload_thumbnail(
        &self,
        file: &MediaFile,
        destination_id: &str,
    ) -> Result<String, BackendFailure>;
}

#[async_trait]
pub trait ImageCompressor: Send + Sync {
    async fn compress(
        &self,
        file: &MediaFile,
        options: &CompressionOptions,
    ) -> Result<MediaFile, CodecError>;
}

#[async_trait]
pub trait ThumbnailRenderer: Send + Sync {
    /// Returns encoded image bytes of exactly `width` x `height`.
    async fn make_thumbnail(
        &self,
        file: &MediaFile,
        width: u32,
        height: u32,
        format: OutputFormat,
        quality: f32,
    ) -> Result<Vec<u8>, CodecError>;
}
