//! Progress and terminal notifications for one upload run.

use super::types::UploadStage;
use crate::events::{EventBus, UploadEventPayload};
use crate::network::NetworkState;
use crate::upload_error::ErrorKind;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

pub type StartFn = Arc<dyn Fn() + Send + Sync>;
pub type ProgressFn = Arc<dyn Fn(UploadStage, &str) + Send + Sync>;
pub type CompleteFn = Arc<dyn Fn(&str, Option<&str>) + Send + Sync>;
/// Receives the end-user sentence and the failure kind, never technical detail
pub type ErrorFn = Arc<dyn Fn(&str, ErrorKind) + Send + Sync>;
pub type NetworkChangeFn = Arc<dyn Fn(&NetworkState) + Send + Sync>;

/// Optional observers for a run. Every callback fires on the task running
/// the upload, in pipeline order.
#[derive(Clone, Default)]
pub struct UploadCallbacks {
    on_start: Option<StartFn>,
    on_progress: Option<ProgressFn>,
    on_complete: Option<CompleteFn>,
    on_error: Option<ErrorFn>,
    on_network_change: Option<NetworkChangeFn>,
}

impl fmt::Debug for UploadCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadCallbacks")
            .field("on_start", &self.on_start.is_some())
            .field("on_progress", &self.on_progress.is_some())
            .field("on_complete", &self.on_complete.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_network_change", &self.on_network_change.is_some())
            .finish()
    }
}

impl UploadCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_start<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_start = Some(Arc::new(f));
        self
    }

    pub fn on_progress<F>(mut self, f: F) -> Self
    where
        F: Fn(UploadStage, &str) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(f));
        self
    }

    pub fn on_complete<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, Option<&str>) + Send + Sync + 'static,
    {
        self.on_complete = Some(Arc::new(f));
        self
    }

    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, ErrorKind) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Supplying this makes the run hold the network monitor for its duration.
    pub fn on_network_change<F>(mut self, f: F) -> Self
    where
        F: Fn(&NetworkState) + Send + Sync + 'static,
    {
        self.on_network_change = Some(Arc::new(f));
        self
    }

    /// Publishes every notification onto `bus`, tagged with `upload_id`.
    pub fn from_event_bus(bus: EventBus, upload_id: impl Into<String>) -> Self {
        let sink = Arc::new(BusSink {
            bus,
            upload_id: upload_id.into(),
        });
        let (start, progress, complete, error, network) = (
            Arc::clone(&sink),
            Arc::clone(&sink),
            Arc::clone(&sink),
            Arc::clone(&sink),
            sink,
        );

        Self::new()
            .on_start(move || start.publish(UploadEventPayload::Started))
            .on_progress(move |stage, status| {
                progress.publish(UploadEventPayload::Progress {
                    stage,
                    status: status.to_string(),
                })
            })
            .on_complete(move |image_url, thumbnail_url| {
                complete.publish(UploadEventPayload::Completed {
                    image_url: image_url.to_string(),
                    thumbnail_url: thumbnail_url.map(str::to_string),
                })
            })
            .on_error(move |message, kind| {
                error.publish(UploadEventPayload::Failed {
                    kind,
                    message: message.to_string(),
                })
            })
            .on_network_change(move |state| {
                network.publish(UploadEventPayload::NetworkChanged {
                    state: state.clone(),
                })
            })
    }

    pub fn network_listener(&self) -> Option<NetworkChangeFn> {
        self.on_network_change.clone()
    }

    pub(crate) fn started(&self) {
        if let Some(f) = &self.on_start {
            f();
        }
    }

    pub(crate) fn progress(&self, stage: UploadStage, status: &str) {
        if let Some(f) = &self.on_progress {
            f(stage, status);
        }
    }

    pub(crate) fn completed(&self, image_url: &str, thumbnail_url: Option<&str>) {
        if let Some(f) = &self.on_complete {
            f(image_url, thumbnail_url);
        }
    }

    pub(crate) fn failed(&self, message: &str, kind: ErrorKind) {
        if let Some(f) = &self.on_error {
            f(message, kind);
        }
    }
}

struct BusSink {
    bus: EventBus,
    upload_id: String,
}

impl BusSink {
    fn publish(&self, payload: UploadEventPayload) {
        // No subscribers is not an error for the run
        if let Err(e) = self.bus.publish(&self.upload_id, payload) {
            trace!(error = %e, "Dropped upload event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::UploadEvent;
    use crate::network::{NetworkSnapshot, NetworkState};
    use std::sync::Mutex;

    #[test]
    fn test_empty_callbacks_are_no_ops() {
        let callbacks = UploadCallbacks::new();
        callbacks.started();
        callbacks.progress(UploadStage::Compressing, "Compressing image...");
        callbacks.completed("https://cdn/x.jpg", None);
        callbacks.failed("oops", ErrorKind::Unknown);
        assert!(callbacks.network_listener().is_none());
    }

    #[test]
    fn test_builders_invoke_closures() {
        let seen = Arc::new(Mutex::new(Vec::<String>::new()));
        let (a, b, c) = (seen.clone(), seen.clone(), seen.clone());

        let callbacks = UploadCallbacks::new()
            .on_start(move || a.lock().unwrap().push("start".into()))
            .on_progress(move |stage, status| {
                b.lock().unwrap().push(format!("{}:{}", stage, status))
            })
            .on_complete(move |url, thumb| {
                c.lock().unwrap().push(format!("done:{}:{:?}", url, thumb))
            });

        callbacks.started();
        callbacks.progress(UploadStage::ValidatingFile, "Validating file...");
        callbacks.completed("u", Some("t"));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                "start".to_string(),
                "validating_file:Validating file...".to_string(),
                "done:u:Some(\"t\")".to_string(),
            ]
        );
    }

    #[test]
    fn test_from_event_bus_publishes_in_order() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let callbacks = UploadCallbacks::from_event_bus(bus.clone(), "run-7");

        callbacks.started();
        callbacks.progress(UploadStage::CheckingConnectivity, "Checking connection...");
        if let Some(listener) = callbacks.network_listener() {
            listener(&NetworkState::from_snapshot(&NetworkSnapshot::offline()));
        }
        callbacks.failed("You appear to be offline.", ErrorKind::Connectivity);

        let events: Vec<UploadEvent> = (0..4).map(|_| rx.try_recv().unwrap()).collect();
        let types: Vec<&str> = events.iter().map(|e| e.payload_type()).collect();
        assert_eq!(types, vec!["started", "progress", "network_changed", "failed"]);
        assert!(events.iter().all(|e| e.upload_id == "run-7"));
        assert!(events.windows(2).all(|w| w[0].sequence < w[1].sequence));

        match &events[3].payload {
            UploadEventPayload::Failed { kind, .. } => assert_eq!(*kind, ErrorKind::Connectivity),
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_from_event_bus_without_subscribers() {
        let callbacks = UploadCallbacks::from_event_bus(EventBus::new(4), "run-8");
        callbacks.started();
        callbacks.completed("u", None);
    }
}
