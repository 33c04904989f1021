//! Connectivity monitor
//!
//! Platform connectivity signals (OS reachability callbacks, a TCP probe, a
//! test driver) are pushed in through [`NetworkMonitor::report`]. Subscribers
//! registered with [`NetworkMonitor::on_connected`] run exactly once per
//! transition into [`NetworkStatus::Online`]; repeated "still online" reports
//! are swallowed.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Last known connectivity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkStatus {
    Online,
    Offline,
    Unknown,
}

impl NetworkStatus {
    pub fn is_online(&self) -> bool {
        matches!(self, NetworkStatus::Online)
    }
}

impl From<bool> for NetworkStatus {
    fn from(online: bool) -> Self {
        if online {
            NetworkStatus::Online
        } else {
            NetworkStatus::Offline
        }
    }
}

impl fmt::Display for NetworkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NetworkStatus::Online => "online",
            NetworkStatus::Offline => "offline",
            NetworkStatus::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

type ConnectedCallback = Arc<dyn Fn() + Send + Sync>;
type CallbackMap = Mutex<BTreeMap<u64, ConnectedCallback>>;

/// Handle for a registered `on_connected` callback
///
/// Dropping it unregisters the callback; call [`Subscription::detach`] to keep
/// the callback for the lifetime of the monitor.
#[must_use = "dropping a Subscription unregisters the callback"]
pub struct Subscription {
    id: u64,
    callbacks: Weak<CallbackMap>,
    active: bool,
}

impl Subscription {
    /// Keep the callback registered after this handle goes away
    pub fn detach(mut self) {
        self.active = false;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        if let Some(callbacks) = self.callbacks.upgrade() {
            callbacks.lock().remove(&self.id);
        }
    }
}

/// Observes connectivity and notifies on transitions to online
pub struct NetworkMonitor {
    status_tx: watch::Sender<NetworkStatus>,
    callbacks: Arc<CallbackMap>,
    next_id: AtomicU64,
}

impl NetworkMonitor {
    /// Create a monitor whose connectivity is not yet known
    pub fn new() -> Self {
        Self::with_status(NetworkStatus::Unknown)
    }

    /// Create a monitor seeded with an initial reading
    ///
    /// Seeding with `Online` does not fire callbacks; only a later transition
    /// does.
    pub fn with_status(status: NetworkStatus) -> Self {
        let (status_tx, _) = watch::channel(status);
        Self {
            status_tx,
            callbacks: Arc::new(Mutex::new(BTreeMap::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Current connectivity
    pub fn status(&self) -> NetworkStatus {
        *self.status_tx.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.status().is_online()
    }

    /// Receiver that observes every status change (including to offline)
    pub fn subscribe(&self) -> watch::Receiver<NetworkStatus> {
        self.status_tx.subscribe()
    }

    /// Register a callback fired once per transition into online
    pub fn on_connected<F>(&self, callback: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.callbacks.lock().insert(id, Arc::new(callback));
        Subscription {
            id,
            callbacks: Arc::downgrade(&self.callbacks),
            active: true,
        }
    }

    /// Number of registered `on_connected` callbacks
    pub fn subscriber_count(&self) -> usize {
        self.callbacks.lock().len()
    }

    /// Feed a new reading from the platform signal
    ///
    /// Returns `true` if this reading was a transition into online.
    pub fn report(&self, status: NetworkStatus) -> bool {
        let previous = self.status_tx.send_replace(status);
        if previous == status {
            debug!(%status, "Connectivity unchanged");
            return false;
        }

        match status {
            NetworkStatus::Online => info!(%previous, "Network: online"),
            NetworkStatus::Offline => warn!(%previous, "Network: offline"),
            NetworkStatus::Unknown => debug!(%previous, "Network: unknown"),
        }

        if !status.is_online() {
            return false;
        }

        // Invoke outside the lock so a callback may register or drop
        // subscriptions
        let callbacks: Vec<ConnectedCallback> = self.callbacks.lock().values().cloned().collect();
        for callback in callbacks {
            callback();
        }
        true
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new()
    }
}
