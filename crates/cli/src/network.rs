// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Network presence signal.
//!
//! The platform layer reports connectivity through [`NetworkMonitor::set_online`];
//! the sync manager, realtime driver and status facade observe it through
//! [`NetworkMonitor::subscribe`]. Receivers only wake on actual transitions.

use std::sync::Arc;

use tokio::sync::watch;

/// Cloneable handle over the online/offline state.
#[derive(Debug, Clone)]
pub struct NetworkMonitor {
    tx: Arc<watch::Sender<bool>>,
}

impl NetworkMonitor {
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        NetworkMonitor { tx: Arc::new(tx) }
    }

    /// Record the current connectivity. Returns true if the state changed.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            tracing::info!(online, "network status changed");
        }
        changed
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Subscribe to connectivity transitions.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
#[path = "network_tests.rs"]
mod tests;
