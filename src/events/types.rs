use crate::network::NetworkState;
use crate::upload::UploadStage;
use crate::upload_error::ErrorKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sequence number for ordering events
pub type EventSequence = u64;

/// One progress or terminal event from an upload run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadEvent {
    pub sequence: EventSequence,
    pub timestamp: DateTime<Utc>,
    /// Identifies the run; overlapping uploads share one bus
    pub upload_id: String,
    pub payload: UploadEventPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UploadEventPayload {
    Started,

    Progress {
        stage: UploadStage,
        status: String,
    },

    Completed {
        image_url: String,
        thumbnail_url: Option<String>,
    },

    /// Carries only the end-user sentence; technical detail goes to the log sink
    Failed {
        kind: ErrorKind,
        message: String,
    },

    NetworkChanged {
        state: NetworkState,
    },
}

impl UploadEvent {
    pub fn payload_type(&self) -> &str {
        match &self.payload {
            UploadEventPayload::Started => "started",
            UploadEventPayload::Progress { .. } => "progress",
            UploadEventPayload::Completed { .. } => "completed",
            UploadEventPayload::Failed { .. } => "failed",
            UploadEventPayload::NetworkChanged { .. } => "network_changed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.payload,
            UploadEventPayload::Completed { .. } | UploadEventPayload::Failed { .. }
        )
    }
}
