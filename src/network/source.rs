use super::quality::NetworkSnapshot;
use std::sync::RwLock;

/// Read-only view of the platform's connectivity signals.
///
/// Implementations must be cheap and non-blocking; the monitor calls
/// `snapshot` on every tick.
pub trait ConnectivitySource: Send + Sync {
    fn snapshot(&self) -> NetworkSnapshot;
}

/// A connectivity source whose value is pushed in by the host.
///
/// Hosts that receive online/offline events call [`StaticConnectivity::set`]
/// and then [`super::NetworkMonitor::refresh`].
#[derive(Debug, Default)]
pub struct StaticConnectivity {
    current: RwLock<NetworkSnapshot>,
}

impl StaticConnectivity {
    pub fn new(initial: NetworkSnapshot) -> Self {
        Self {
            current: RwLock::new(initial),
        }
    }

    pub fn set(&self, snapshot: NetworkSnapshot) {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        *guard = snapshot;
    }

    pub fn set_online(&self, online: bool) {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        guard.online = online;
    }
}

impl ConnectivitySource for StaticConnectivity {
    fn snapshot(&self) -> NetworkSnapshot {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}
