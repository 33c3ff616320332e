//! Connectivity monitor.

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tracing::info;

/// Online state as last reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectivityState {
    /// Network reachable.
    Online,
    /// Network unreachable.
    Offline,
    /// Online, and the transition from offline has not settled yet.
    Reconnecting,
}

impl ConnectivityState {
    /// True for `Online` and `Reconnecting`.
    pub fn is_online(self) -> bool {
        !matches!(self, Self::Offline)
    }
}

/// Tracks the host's online/offline signal.
///
/// An `Offline -> Online` report moves to `Reconnecting` and sends one
/// reconnect event to every subscriber; [`ConnectivityMonitor::settle`]
/// then clears `Reconnecting`. Repeated reports of the same state do
/// nothing.
#[derive(Debug)]
pub struct ConnectivityMonitor {
    state: watch::Sender<ConnectivityState>,
    reconnects: broadcast::Sender<()>,
}

impl ConnectivityMonitor {
    /// Creates a monitor seeded with the host's current signal.
    pub fn new(initially_online: bool) -> Self {
        let initial = if initially_online {
            ConnectivityState::Online
        } else {
            ConnectivityState::Offline
        };
        let (state, _) = watch::channel(initial);
        let (reconnects, _) = broadcast::channel(16);
        Self { state, reconnects }
    }

    /// Current state.
    pub fn state(&self) -> ConnectivityState {
        *self.state.borrow()
    }

    /// True unless offline.
    pub fn is_online(&self) -> bool {
        self.state().is_online()
    }

    /// Feeds a host signal. Returns true if the state changed.
    pub fn report(&self, online: bool) -> bool {
        let mut reconnected = false;
        let changed = self.state.send_if_modified(|state| {
            let next = match (*state, online) {
                (ConnectivityState::Offline, true) => {
                    reconnected = true;
                    ConnectivityState::Reconnecting
                }
                (ConnectivityState::Online | ConnectivityState::Reconnecting, false) => {
                    ConnectivityState::Offline
                }
                (current, _) => current,
            };
            let changed = next != *state;
            *state = next;
            changed
        });

        if changed {
            info!(state = ?self.state(), "connectivity changed");
        }
        if reconnected {
            // No subscribers is fine.
            let _ = self.reconnects.send(());
        }
        changed
    }

    /// Clears `Reconnecting` back to `Online`.
    pub fn settle(&self) {
        self.state.send_if_modified(|state| {
            if *state == ConnectivityState::Reconnecting {
                *state = ConnectivityState::Online;
                true
            } else {
                false
            }
        });
    }

    /// Subscribes to reconnect events.
    pub fn subscribe_reconnect(&self) -> broadcast::Receiver<()> {
        self.reconnects.subscribe()
    }

    /// Watches state changes.
    pub fn watch(&self) -> watch::Receiver<ConnectivityState> {
        self.state.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_follows_host() {
        assert_eq!(ConnectivityMonitor::new(true).state(), ConnectivityState::Online);
        assert_eq!(ConnectivityMonitor::new(false).state(), ConnectivityState::Offline);
    }

    #[test]
    fn offline_to_online_reconnects_once() {
        let monitor = ConnectivityMonitor::new(false);
        let mut events = monitor.subscribe_reconnect();

        assert!(monitor.report(true));
        assert_eq!(monitor.state(), ConnectivityState::Reconnecting);
        assert!(monitor.is_online());

        // Same state again: nothing.
        assert!(!monitor.report(true));

        assert!(events.try_recv().is_ok());
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn settle_clears_reconnecting() {
        let monitor = ConnectivityMonitor::new(false);
        monitor.report(true);
        monitor.settle();
        assert_eq!(monitor.state(), ConnectivityState::Online);

        // Settling a stable state is a no-op.
        monitor.settle();
        assert_eq!(monitor.state(), ConnectivityState::Online);
    }

    #[test]
    fn going_offline_does_not_emit_reconnect() {
        let monitor = ConnectivityMonitor::new(true);
        let mut events = monitor.subscribe_reconnect();

        assert!(monitor.report(false));
        assert_eq!(monitor.state(), ConnectivityState::Offline);
        assert!(!monitor.report(false));
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn online_to_online_does_not_reconnect() {
        let monitor = ConnectivityMonitor::new(true);
        let mut events = monitor.subscribe_reconnect();
        assert!(!monitor.report(true));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn watchers_see_changes() {
        let monitor = ConnectivityMonitor::new(true);
        let mut rx = monitor.watch();

        monitor.report(false);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), ConnectivityState::Offline);
    }
}
