//! File checks that need no I/O.

use super::types::MediaFile;
use crate::config::UploadConfig;
use crate::upload_error::{ErrorKind, UploadError};

/// Validate MIME type, emptiness and size limit
///
/// All failures are [`ErrorKind::Size`]: none of them can be fixed by retrying.
pub fn validate_file(file: &MediaFile, config: &UploadConfig) -> Result<u64, UploadError> {
    if !config.accepts_mime(&file.mime_type) {
        return Err(UploadError::new(
            ErrorKind::Size,
            format!(
                "Unsupported file type '{}' for '{}' (accepted: {})",
                file.mime_type,
                file.name,
                config.accepted_mime_types.join(", ")
            ),
        ));
    }

    if file.is_empty() {
        return Err(UploadError::new(
            ErrorKind::Size,
            format!("File '{}' is empty", file.name),
        ));
    }

    let size = file.len();
    if size > config.max_file_size_bytes {
        return Err(UploadError::new(
            ErrorKind::Size,
            format!(
                "File size ({} bytes) exceeds maximum allowed size ({} bytes): {}",
                size, config.max_file_size_bytes, file.name
            ),
        ));
    }

    Ok(size)
}
