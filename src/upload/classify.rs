//! Maps backend failures onto the [`ErrorKind`] taxonomy.
//!
//! Typed variants are classified structurally. Only the opaque
//! [`BackendFailure::Other`] falls back to message sniffing, and that
//! sniffing lives here and nowhere else.

use super::backend::BackendFailure;
use crate::upload_error::{ErrorKind, UploadError};

pub fn classify_backend_failure(failure: &BackendFailure) -> ErrorKind {
    match failure {
        BackendFailure::Unauthenticated(_) => ErrorKind::Auth,
        BackendFailure::PermissionDenied(_) => ErrorKind::Backend,
        BackendFailure::Status { code, .. } => classify_status(*code),
        BackendFailure::Transport(message) => {
            if is_timeout_message(&message.to_ascii_lowercase()) {
                ErrorKind::Timeout
            } else {
                ErrorKind::Network
            }
        }
        BackendFailure::Other(message) => classify_failure_message(message),
    }
}

fn classify_status(code: u16) -> ErrorKind {
    match code {
        401 => ErrorKind::Auth,
        408 | 504 => ErrorKind::Timeout,
        413 => ErrorKind::Size,
        400..=599 => ErrorKind::Backend,
        _ => ErrorKind::Unknown,
    }
}

fn is_timeout_message(lower: &str) -> bool {
    lower.contains("timeout") || lower.contains("timed out") || lower.contains("deadline")
}

/// Classifies a free-form failure message by content.
pub fn classify_failure_message(message: &str) -> ErrorKind {
    let lower = message.to_ascii_lowercase();

    if lower.contains("unauthenticated")
        || lower.contains("unauthorized")
        || lower.contains("auth/")
        || lower.contains("token expired")
        || lower.contains("invalid token")
    {
        return ErrorKind::Auth;
    }

    if lower.contains("permission")
        || lower.contains("forbidden")
        || lower.contains("access denied")
    {
        return ErrorKind::Backend;
    }

    if is_timeout_message(&lower) {
        return ErrorKind::Timeout;
    }

    if lower.contains("network")
        || lower.contains("connection")
        || lower.contains("offline")
        || lower.contains("dns")
        || lower.contains("econnreset")
        || lower.contains("socket")
    {
        return ErrorKind::Network;
    }

    if lower.contains("quota")
        || lower.contains("server")
        || lower.contains("unavailable")
        || lower.contains("internal")
        || lower.contains("status 5")
        || lower.contains("storage/")
    {
        return ErrorKind::Backend;
    }

    ErrorKind::Unknown
}

/// Wraps a backend failure as an [`UploadError`], keeping it as the cause.
///
/// Permission failures always carry "permission denied" in the message so
/// the default retry predicate refuses them.
pub fn upload_error_from_backend(failure: BackendFailure) -> UploadError {
    let kind = classify_backend_failure(&failure);
    let message = match &failure {
        BackendFailure::Status { code: 403, .. } => {
            format!("Storage rejected the upload: permission denied ({})", failure)
        }
        _ => format!("Storage upload failed: {}", failure),
    };
    UploadError::new(kind, message).with_cause(failure)
}
