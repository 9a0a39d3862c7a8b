//! Failure taxonomy shared by the monitor, retry engine, auth guard and pipeline.
//!
//! Every failure is an [`UploadError`] tagged with an [`ErrorKind`]. The kind
//! drives both retry eligibility and the single non-technical sentence shown
//! to the end user; the technical detail (cause, snapshots) only ever goes to
//! the logging sink.

use crate::auth::AuthSnapshot;
use crate::network::NetworkSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Closed set of failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    #[serde(rename = "AuthError")]
    Auth,
    #[serde(rename = "SizeError")]
    Size,
    #[serde(rename = "NetworkError")]
    Network,
    #[serde(rename = "CompressionError")]
    Compression,
    #[serde(rename = "ConnectivityError")]
    Connectivity,
    #[serde(rename = "TimeoutError")]
    Timeout,
    #[serde(rename = "BackendError")]
    Backend,
    #[serde(rename = "Unknown")]
    Unknown,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 8] = [
        ErrorKind::Auth,
        ErrorKind::Size,
        ErrorKind::Network,
        ErrorKind::Compression,
        ErrorKind::Connectivity,
        ErrorKind::Timeout,
        ErrorKind::Backend,
        ErrorKind::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Auth => "AuthError",
            ErrorKind::Size => "SizeError",
            ErrorKind::Network => "NetworkError",
            ErrorKind::Compression => "CompressionError",
            ErrorKind::Connectivity => "ConnectivityError",
            ErrorKind::Timeout => "TimeoutError",
            ErrorKind::Backend => "BackendError",
            ErrorKind::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The fixed end-user sentence for a failure kind.
pub fn user_message(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Auth => "Authentication failed. Please sign in again.",
        ErrorKind::Size => "This file is too large or is not a supported image type.",
        ErrorKind::Network => "A network error interrupted the upload. Please check your connection and try again.",
        ErrorKind::Compression => "We couldn't process this image. Please try a different file.",
        ErrorKind::Connectivity => "You appear to be offline. Please reconnect and try again.",
        ErrorKind::Timeout => "The upload took too long. Please try again on a faster connection.",
        ErrorKind::Backend => "The storage service could not accept the image. Please try again later.",
        ErrorKind::Unknown => "Something went wrong while uploading. Please try again.",
    }
}

/// An immutable failure record.
///
/// Built once at the point of failure with [`UploadError::new`] and the
/// consuming `with_*` methods, then only read.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct UploadError {
    kind: ErrorKind,
    message: String,
    #[source]
    cause: Option<Arc<dyn std::error::Error + Send + Sync>>,
    timestamp: DateTime<Utc>,
    network: Option<NetworkSnapshot>,
    auth: Option<AuthSnapshot>,
}

impl UploadError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            cause: None,
            timestamp: Utc::now(),
            network: None,
            auth: None,
        }
    }

    pub fn with_cause<E>(mut self, cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.cause = Some(Arc::new(cause));
        self
    }

    pub fn with_network(mut self, snapshot: NetworkSnapshot) -> Self {
        self.network = Some(snapshot);
        self
    }

    pub fn with_auth(mut self, snapshot: AuthSnapshot) -> Self {
        self.auth = Some(snapshot);
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cause(&self) -> Option<&(dyn std::error::Error + Send + Sync)> {
        self.cause.as_deref()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn network_snapshot(&self) -> Option<&NetworkSnapshot> {
        self.network.as_ref()
    }

    pub fn auth_snapshot(&self) -> Option<&AuthSnapshot> {
        self.auth.as_ref()
    }

    pub fn user_message(&self) -> &'static str {
        user_message(self.kind)
    }
}
