//! HTTP object-store adapter.
//!
//! `PUT {base}/images/{id}` and `PUT {base}/thumbnails/{id}` with a bearer
//! token; the server replies `{"url": "..."}`.

use super::backend::{BackendFailure, StorageBackend};
use super::types::MediaFile;
use crate::auth::AuthProvider;
use crate::error::AppError;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct StoredObject {
    url: String,
}

#[derive(Clone)]
pub struct HttpStorageBackend {
    client: reqwest::Client,
    base_url: String,
    auth: Arc<dyn AuthProvider>,
}

impl std::fmt::Debug for HttpStorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpStorageBackend")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl HttpStorageBackend {
    pub fn new(base_url: &str, auth: Arc<dyn AuthProvider>) -> Result<Self, AppError> {
        let parsed = Url::parse(base_url)
            .map_err(|e| AppError::Config(format!("Invalid storage URL '{}': {}", base_url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AppError::Config(format!(
                "Storage URL must be http or https: {}",
                base_url
            )));
        }

        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
            auth,
        })
    }

    fn object_url(&self, collection: &str, destination_id: &str) -> String {
        format!(
            "{}/{}/{}",
            self.base_url,
            collection,
            urlencoding::encode(destination_id)
        )
    }

    async fn put_object(
        &self,
        collection: &str,
        file: &MediaFile,
        destination_id: &str,
    ) -> Result<String, BackendFailure> {
        let token = self.auth.get_token(false).await?;
        let url = self.object_url(collection, destination_id);

        let response = self
            .client
            .put(&url)
            .bearer_auth(&token.token)
            .header(CONTENT_TYPE, file.mime_type.as_str())
            .header("X-File-Name", urlencoding::encode(&file.name).into_owned())
            .body(file.data.clone())
            .send()
            .await
            .map_err(transport_failure)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(status_failure(status, error_text));
        }

        let stored: StoredObject = response
            .json()
            .await
            .map_err(|e| BackendFailure::Other(format!("Malformed storage response: {}", e)))?;

        debug!(%url, bytes = file.len(), "Stored object");
        Ok(stored.url)
    }
}

fn transport_failure(e: reqwest::Error) -> BackendFailure {
    if e.is_timeout() {
        BackendFailure::Transport(format!("request timed out: {}", e))
    } else {
        BackendFailure::Transport(e.to_string())
    }
}

fn status_failure(status: StatusCode, message: String) -> BackendFailure {
    match status {
        StatusCode::UNAUTHORIZED => BackendFailure::Unauthenticated(message),
        StatusCode::FORBIDDEN => BackendFailure::PermissionDenied(message),
        _ => BackendFailure::Status {
            code: status.as_u16(),
            message,
        },
    }
}

#[async_trait]
impl StorageBackend for HttpStorageBackend {
    async fn upload_bytes(
        &self,
        file: &MediaFile,
        destination_id: &str,
    ) -> Result<String, BackendFailure> {
        self.put_object("images", file, destination_id).await
    }

    async fn upload_thumbnail(
        &self,
        file: &MediaFile,
        destination_id: &str,
    ) -> Result<String, BackendFailure> {
        self.put_object("thumbnails", file, destination_id).await
    }
}
