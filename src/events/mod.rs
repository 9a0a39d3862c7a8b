//! Typed upload events fanned out over a broadcast bus.

mod bus;
mod handlers;
mod types;

pub use bus::{EventBus, EventReceiver};
pub use handlers::UploadLogHandler;
pub use types::{EventSequence, UploadEvent, UploadEventPayload};
