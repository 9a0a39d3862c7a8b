//! The upload pipeline and its collaborator seams.

mod backend;
mod callbacks;
pub mod classify;
mod compression;
mod http;
mod pipeline;
mod probe;
mod types;
mod validation;

pub use backend::{BackendFailure, CodecError, ImageCompressor, StorageBackend, ThumbnailRenderer};
pub use callbacks::{
    CompleteFn, ErrorFn, NetworkChangeFn, ProgressFn, StartFn, UploadCallbacks,
};
pub use classify::{classify_backend_failure, classify_failure_message, upload_error_from_backend};
pub use compression::{options_for_attempt, CompressionOptions, DegradationPolicy, OutputFormat};
pub use http::HttpStorageBackend;
pub use pipeline::Uploader;
pub use probe::{probe_connectivity, ProbeOutcome, ProbeSettings};
pub use types::{mime_type_for_path, MediaFile, UploadResult, UploadStage};
pub use validation::validate_file;
