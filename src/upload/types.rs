//! Type definitions for the upload pipeline.
//!
//! Defines MediaFile, UploadStage and UploadResult.

use crate::upload_error::UploadError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// A locally selected file held in memory.
#[derive(Clone, PartialEq, Eq)]
pub struct MediaFile {
    pub name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl fmt::Debug for MediaFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaFile")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("data", &format_args!("<{} bytes>", self.data.len()))
            .finish()
    }
}

impl MediaFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            data,
        }
    }

    /// Reads a file from disk, inferring the MIME type from its extension.
    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let data = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();
        let mime_type = mime_type_for_path(path).to_string();
        Ok(Self::new(name, mime_type, data))
    }

    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn size_mb(&self) -> f64 {
        self.data.len() as f64 / (1024.0 * 1024.0)
    }

    /// The name with its extension replaced.
    pub fn renamed_with_extension(&self, extension: &str) -> String {
        let stem = Path::new(&self.name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.name);
        format!("{}.{}", stem, extension)
    }
}

pub fn mime_type_for_path(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match extension.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        _ => "application/octet-stream",
    }
}

/// Pipeline states, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStage {
    Idle,
    CheckingConnectivity,
    WaitingForNetwork,
    ValidatingAuth,
    ValidatingFile,
    Compressing,
    GeneratingThumbnail,
    UploadingThumbnail,
    UploadingMain,
    Completed,
    Failed,
}

impl UploadStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadStage::Completed | UploadStage::Failed)
    }
}

impl fmt::Display for UploadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UploadStage::Idle => "idle",
            UploadStage::CheckingConnectivity => "checking_connectivity",
            UploadStage::WaitingForNetwork => "waiting_for_network",
            UploadStage::ValidatingAuth => "validating_auth",
            UploadStage::ValidatingFile => "validating_file",
            UploadStage::Compressing => "compressing",
            UploadStage::GeneratingThumbnail => "generating_thumbnail",
            UploadStage::UploadingThumbnail => "uploading_thumbnail",
            UploadStage::UploadingMain => "uploading_main",
            UploadStage::Completed => "completed",
            UploadStage::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Terminal value of one pipeline run.
#[derive(Debug, Clone)]
pub struct UploadResult {
    pub success: bool,
    pub image_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub error: Option<UploadError>,
}

impl UploadResult {
    pub fn completed(image_url: String, thumbnail_url: Option<String>) -> Self {
        Self {
            success: true,
            image_url: Some(image_url),
            thumbnail_url,
            error: None,
        }
    }

    pub fn failed(error: UploadError) -> Self {
        Self {
            success: false,
            image_url: None,
            thumbnail_url: None,
            error: Some(error),
        }
    }

    /// The end-user sentence for a failed run.
    pub fn user_message(&self) -> Option<&'static str> {
        self.error.as_ref().map(|e| e.user_message())
    }
}
