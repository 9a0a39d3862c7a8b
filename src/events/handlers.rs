use super::{EventBus, UploadEvent, UploadEventPayload};
use crate::error::AppError;
use crate::logging::{log_upload_event_to, LogEntry};
use serde_json::json;
use std::path::{Path, PathBuf};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Handler that appends every upload event to a JSON-lines log file
pub struct UploadLogHandler {
    event_bus: EventBus,
    log_path: PathBuf,
    cancel: CancellationToken,
}

impl UploadLogHandler {
    pub fn new(event_bus: EventBus, log_path: PathBuf, cancel: CancellationToken) -> Self {
        Self {
            event_bus,
            log_path,
            cancel,
        }
    }

    /// Subscribes immediately, so events published after this returns are not missed.
    ///
    /// The task holds only a receiver; it ends once every bus clone is dropped.
    pub fn start(self) -> JoinHandle<()> {
        let UploadLogHandler {
            event_bus,
            log_path,
            cancel,
        } = self;
        let mut rx = event_bus.subscribe();
        drop(event_bus);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = rx.recv() => {
                        match result {
                            Ok(event) => {
                                if let Err(e) = write_event(&log_path, &event) {
                                    warn!(
                                        upload_id = %event.upload_id,
                                        error = %e,
                                        "Upload log handler error"
                                    );
                                }
                            }
                            Err(broadcast::error::RecvError::Closed) => {
                                info!("Upload log handler stopped (event bus closed)");
                                break;
                            }
                            Err(broadcast::error::RecvError::Lagged(n)) => {
                                warn!(skipped = n, "Upload log handler lagged");
                            }
                        }
                    }
                    _ = cancel.cancelled() => {
                        debug!("Upload log handler shutting down");
                        break;
                    }
                }
            }
        })
    }
}

fn write_event(log_path: &Path, event: &UploadEvent) -> Result<(), AppError> {
    let (level, message, details) = describe(event);
    let mut entry = LogEntry::new("upload", level, &message, Some(details));
    entry.timestamp = event.timestamp.to_rfc3339();
    log_upload_event_to(log_path, &entry)
}

fn describe(event: &UploadEvent) -> (&'static str, String, serde_json::Value) {
    let base = json!({ "uploadId": event.upload_id, "sequence": event.sequence });
    let (level, message, extra) = match &event.payload {
        UploadEventPayload::Started => ("INFO", "Upload started".to_string(), json!({})),
        UploadEventPayload::Progress { stage, status } => {
            ("DEBUG", status.clone(), json!({ "stage": stage }))
        }
        UploadEventPayload::Completed {
            image_url,
            thumbnail_url,
        } => (
            "INFO",
            "Upload complete".to_string(),
            json!({ "imageUrl": image_url, "thumbnailUrl": thumbnail_url }),
        ),
        UploadEventPayload::Failed { kind, message } => {
            ("ERROR", message.clone(), json!({ "kind": kind }))
        }
        UploadEventPayload::NetworkChanged { state } => (
            "INFO",
            format!("Network is now {}", state.quality),
            json!({ "online": state.online, "quality": state.quality }),
        ),
    };

    let mut details = base;
    if let (Some(target), Some(source)) = (details.as_object_mut(), extra.as_object()) {
        for (key, value) in source {
            target.insert(key.clone(), value.clone());
        }
    }
    (level, message, details)
}
