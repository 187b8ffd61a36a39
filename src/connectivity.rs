//! Online/offline state tracking.
//!
//! The monitor is a thin watch channel: platform integrations (netlink,
//! NetworkManager, a TUI keybind) push transitions in, the sync engine and
//! refresh scheduler read the current value or subscribe for changes.
//! Going back online never triggers a fetch by itself; that stays with the
//! scheduler or an explicit caller, so flaky connectivity cannot cause a
//! fetch storm.

use tokio::sync::watch;

#[derive(Clone)]
pub struct ConnectivityMonitor {
    tx: watch::Sender<bool>,
    rx: watch::Receiver<bool>,
}

impl ConnectivityMonitor {
    /// Create a monitor with the given initial state.
    pub fn new(online: bool) -> Self {
        let (tx, rx) = watch::channel(online);
        Self { tx, rx }
    }

    pub fn is_online(&self) -> bool {
        *self.rx.borrow()
    }

    /// Record a connectivity transition. Redundant updates (online →
    /// online) are still broadcast; subscribers that care can dedupe.
    pub fn set_online(&self, online: bool) {
        if *self.rx.borrow() != online {
            tracing::info!(online = online, "Connectivity changed");
        }
        let _ = self.tx.send(online);
    }

    /// Subscribe to connectivity transitions.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.rx.clone()
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}
