//! Resilient image uploads for the hotspot presentation editor.
//!
//! [`upload::Uploader::run_upload`] takes a selected image through
//! connectivity and auth checks, validation, compression, an optional
//! thumbnail, and a retried main upload with progressive degradation. The
//! supporting pieces (network monitor, retry engine, auth guard) are usable
//! on their own.

pub mod auth;
pub mod codec;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod network;
pub mod retry;
pub mod upload;
pub mod upload_error;

pub use auth::{AuthGuard, AuthProvider, AuthSnapshot, TokenInfo};
pub use codec::ImageCodec;
pub use config::UploadConfig;
pub use error::AppError;
pub use network::{NetworkMonitor, NetworkSnapshot, NetworkState, Quality};
pub use retry::{retry_with_backoff, RetryContext, RetryOptions};
pub use upload::{MediaFile, UploadCallbacks, UploadResult, UploadStage, Uploader};
pub use upload_error::{user_message, ErrorKind, UploadError};
