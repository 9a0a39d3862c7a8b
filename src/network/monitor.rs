//! Background network-quality monitor.
//!
//! One explicitly constructed [`NetworkMonitor`] per process (or per test).
//! The monitor exclusively owns the current [`NetworkState`]; everyone else
//! reads snapshots through a `watch` channel, so readers never wait on the
//! timer.
//!
//! Monitoring runs while either a manual [`NetworkMonitor::start_monitoring`]
//! is in effect or at least one [`MonitorLease`] is alive. Uploads take
//! leases, so two overlapping uploads cannot switch monitoring off under
//! each other.

use super::quality::{NetworkSnapshot, NetworkState, Quality};
use super::source::ConnectivitySource;
use crate::upload_error::{ErrorKind, UploadError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

/// Poll interval used while [`NetworkMonitor::wait_for_network`] is blocked.
pub const WAIT_POLL_INTERVAL: Duration = Duration::from_secs(1);

const MIN_INTERVAL: Duration = Duration::from_millis(10);

type Listener = Arc<ListenerSlot>;

/// A registered callback plus the last state version it was handed.
///
/// Delivery happens under the slot's lock, so one listener never sees an
/// older state after a newer one. A callback must not trigger a refresh that
/// would notify itself.
struct ListenerSlot {
    callback: Box<dyn Fn(&NetworkState) + Send + Sync>,
    delivered: Mutex<u64>,
}

impl ListenerSlot {
    fn new(callback: Box<dyn Fn(&NetworkState) + Send + Sync>) -> Self {
        Self {
            callback,
            delivered: Mutex::new(0),
        }
    }

    /// Returns false if `version` was already delivered or superseded.
    fn deliver(&self, version: u64, state: &NetworkState) -> bool {
        let mut delivered = self.delivered.lock().unwrap_or_else(|e| e.into_inner());
        if version <= *delivered {
            return false;
        }
        *delivered = version;
        (self.callback)(state);
        true
    }
}

#[derive(Clone)]
pub struct NetworkMonitor {
    inner: Arc<Inner>,
}

struct Inner {
    source: Arc<dyn ConnectivitySource>,
    state_tx: watch::Sender<Option<NetworkState>>,
    listeners: Mutex<Vec<(u64, Listener)>>,
    next_listener_id: AtomicU64,
    // Bumped inside the watch write lock on every published change.
    version: AtomicU64,
    control: Mutex<Control>,
}

#[derive(Default)]
struct Control {
    manual: bool,
    leases: usize,
    timer: Option<CancellationToken>,
}

impl std::fmt::Debug for NetworkMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let control = self.inner.lock_control();
        f.debug_struct("NetworkMonitor")
            .field("state", &*self.inner.state_tx.borrow())
            .field("manual", &control.manual)
            .field("leases", &control.leases)
            .field("running", &control.timer.is_some())
            .field("listeners", &"<listeners>")
            .finish()
    }
}

impl NetworkMonitor {
    pub fn new(source: Arc<dyn ConnectivitySource>) -> Self {
        let (state_tx, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                source,
                state_tx,
                listeners: Mutex::new(Vec::new()),
                next_listener_id: AtomicU64::new(1),
                version: AtomicU64::new(0),
                control: Mutex::new(Control::default()),
            }),
        }
    }

    /// Starts periodic monitoring. A no-op while the timer is already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_monitoring(&self, interval: Duration) {
        let started = {
            let mut control = self.inner.lock_control();
            control.manual = true;
            Inner::ensure_timer(&self.inner, &mut control, interval)
        };

        if started {
            self.inner.check_for_change();
        }
    }

    /// Cancels a manual start. The timer keeps running while leases are outstanding.
    pub fn stop_monitoring(&self) {
        let mut control = self.inner.lock_control();
        control.manual = false;
        if control.leases == 0 {
            Inner::stop_timer(&mut control);
        }
    }

    /// Reference-counted monitoring for the lifetime of the returned lease.
    ///
    /// `interval` only applies if this call starts the timer.
    pub fn acquire(&self, interval: Duration) -> MonitorLease {
        let started = {
            let mut control = self.inner.lock_control();
            control.leases += 1;
            Inner::ensure_timer(&self.inner, &mut control, interval)
        };

        if started {
            self.inner.check_for_change();
        }

        MonitorLease {
            inner: Arc::clone(&self.inner),
        }
    }

    pub fn is_monitoring(&self) -> bool {
        self.inner.lock_control().timer.is_some()
    }

    pub fn active_leases(&self) -> usize {
        self.inner.lock_control().leases
    }

    /// Registers a listener and immediately hands it the current state, if any.
    pub fn add_listener<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn(&NetworkState) + Send + Sync + 'static,
    {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed);
        let slot: Listener = Arc::new(ListenerSlot::new(Box::new(listener)));
        self.inner.lock_listeners().push((id, Arc::clone(&slot)));

        // Read the version under the watch lock so it matches the state.
        let current = {
            let state = self.inner.state_tx.borrow();
            state
                .clone()
                .map(|state| (self.inner.version.load(Ordering::Relaxed), state))
        };
        if let Some((version, state)) = current {
            slot.deliver(version, &state);
        }

        ListenerHandle {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.lock_listeners().len()
    }

    /// Recomputes the state now, notifying listeners if it changed.
    ///
    /// Hosts call this from their online/offline event handlers.
    pub fn refresh(&self) -> NetworkState {
        self.inner.check_for_change()
    }

    pub fn current_state(&self) -> Option<NetworkState> {
        self.inner.state_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<NetworkState>> {
        self.inner.state_tx.subscribe()
    }

    /// Raw transport reading, bypassing classification.
    pub fn snapshot(&self) -> NetworkSnapshot {
        self.inner.source.snapshot()
    }

    pub fn is_online(&self) -> bool {
        match self.current_state() {
            Some(state) => state.online,
            None => self.inner.source.snapshot().online,
        }
    }

    pub fn get_quality(&self) -> Quality {
        self.current_state()
            .map(|state| state.quality)
            .unwrap_or(Quality::Good)
    }

    /// Blocks until the link reports online, or fails with a
    /// [`ErrorKind::Connectivity`] error after `max_wait`.
    ///
    /// Monitoring is held through a lease for the duration of the wait, so
    /// it never outlives this call unless someone else also requested it.
    /// The wait also polls every [`WAIT_POLL_INTERVAL`] on its own, since a
    /// timer started earlier may run at a much slower interval.
    pub async fn wait_for_network(&self, max_wait: Duration) -> Result<NetworkState, UploadError> {
        let _lease = self.acquire(WAIT_POLL_INTERVAL);
        let mut rx = self.subscribe();

        let state = self.refresh();
        if state.online {
            return Ok(state);
        }

        info!(max_wait_ms = max_wait.as_millis() as u64, "Waiting for network");

        let waited = tokio::time::timeout(max_wait, async {
            let mut poll = tokio::time::interval(WAIT_POLL_INTERVAL);
            poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
            poll.tick().await;

            loop {
                tokio::select! {
                    changed = rx.wait_for(|state| state.as_ref().is_some_and(|s| s.online)) => {
                        return changed.ok().and_then(|state| (*state).clone());
                    }
                    _ = poll.tick() => {
                        let state = self.refresh();
                        if state.online {
                            return Some(state);
                        }
                    }
                }
            }
        })
        .await;

        match waited {
            Ok(Some(state)) => {
                info!(quality = %state.quality, "Network is back");
                Ok(state)
            }
            Ok(None) => Err(UploadError::new(
                ErrorKind::Connectivity,
                "Network monitor closed while waiting for connectivity",
            )
            .with_network(self.snapshot())),
            Err(_) => Err(UploadError::new(
                ErrorKind::Connectivity,
                format!(
                    "Network did not come back within {} ms",
                    max_wait.as_millis()
                ),
            )
            .with_network(self.snapshot())),
        }
    }
}

impl Inner {
    fn lock_control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_listeners(&self) -> MutexGuard<'_, Vec<(u64, Listener)>> {
        self.listeners.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns true if this call started the timer.
    fn ensure_timer(this: &Arc<Inner>, control: &mut Control, interval: Duration) -> bool {
        if control.timer.is_some() {
            return false;
        }

        let interval = interval.max(MIN_INTERVAL);
        control.timer = Some(spawn_timer(Arc::downgrade(this), interval));
        debug!(interval_ms = interval.as_millis() as u64, "Network monitoring started");
        true
    }

    fn stop_timer(control: &mut Control) {
        if let Some(token) = control.timer.take() {
            token.cancel();
            debug!("Network monitoring stopped");
        }
    }

    fn check_for_change(&self) -> NetworkState {
        let next = NetworkState::from_snapshot(&self.source.snapshot());

        let mut version = 0;
        let changed = self.state_tx.send_if_modified(|current| {
            let changed = current
                .as_ref()
                .map_or(true, |previous| !previous.same_status(&next));
            *current = Some(next.clone());
            if changed {
                version = self.version.fetch_add(1, Ordering::Relaxed) + 1;
            }
            changed
        });

        if changed {
            debug!(online = next.online, quality = %next.quality, "Network state changed");
            self.notify(version, &next);
        }

        next
    }

    fn notify(&self, version: u64, state: &NetworkState) {
        // Call outside the list lock so listeners may add or remove listeners.
        let listeners: Vec<Listener> = self
            .lock_listeners()
            .iter()
            .map(|(_, slot)| Arc::clone(slot))
            .collect();

        for slot in listeners {
            slot.deliver(version, state);
        }
    }

    fn remove_listener(&self, id: u64) {
        self.lock_listeners().retain(|(listener_id, _)| *listener_id != id);
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let control = self.control.get_mut().unwrap_or_else(|e| e.into_inner());
        Inner::stop_timer(control);
    }
}

fn spawn_timer(inner: Weak<Inner>, interval: Duration) -> CancellationToken {
    let token = CancellationToken::new();
    let cancelled = token.clone();

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; the caller already published.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancelled.cancelled() => break,
                _ = ticker.tick() => {
                    let Some(inner) = inner.upgrade() else { break };
                    inner.check_for_change();
                }
            }
        }

        trace!("Network monitor timer exited");
    });

    token
}

/// Keeps monitoring alive until dropped.
#[must_use = "monitoring stops when the lease is dropped"]
pub struct MonitorLease {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for MonitorLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorLease").finish_non_exhaustive()
    }
}

impl Drop for MonitorLease {
    fn drop(&mut self) {
        let mut control = self.inner.lock_control();
        control.leases = control.leases.saturating_sub(1);
        if control.leases == 0 && !control.manual {
            Inner::stop_timer(&mut control);
        }
    }
}

/// Removes its listener when dropped (or explicitly unsubscribed).
#[must_use = "dropping the handle removes the listener"]
pub struct ListenerHandle {
    id: u64,
    inner: Weak<Inner>,
}

impl ListenerHandle {
    pub fn unsubscribe(self) {}
}

impl std::fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerHandle").field("id", &self.id).finish()
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.remove_listener(self.id);
        }
    }
}
