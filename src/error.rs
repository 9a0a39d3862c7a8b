use thiserror::Error;

/// Ambient errors outside the upload pipeline (configuration, logging, HTTP client setup).
///
/// Pipeline failures use [`crate::UploadError`] instead.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration file errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Helper trait for adding context to errors
pub trait ErrorContext<T> {
    fn context(self, msg: &str) -> Result<T, AppError>;
}

impl<T, E: Into<AppError>> ErrorContext<T> for Result<T, E> {
    fn context(self, msg: &str) -> Result<T, AppError> {
        self.map_err(|e| match e.into() {
            AppError::Config(s) => AppError::Config(format!("{}: {}", msg, s)),
            AppError::Other(s) => AppError::Other(format!("{}: {}", msg, s)),
            AppError::Io(e) => AppError::Other(format!("{}: {}", msg, e)),
            AppError::Json(e) => AppError::Config(format!("{}: {}", msg, e)),
            AppError::Http(e) => AppError::Http(e),
        })
    }
}
