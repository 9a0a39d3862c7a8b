//! Connectivity signals, quality classification and the background monitor.

mod monitor;
mod quality;
mod source;

pub use monitor::{ListenerHandle, MonitorLease, NetworkMonitor, WAIT_POLL_INTERVAL};
pub use quality::{classify_quality, EffectiveType, NetworkSnapshot, NetworkState, Quality};
pub use source::{ConnectivitySource, StaticConnectivity};
