// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Persists tracker positions as location samples.

use fieldops_core::LocationSample;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::tracker::TrackerEvent;
use crate::SharedStore;

/// Append every tracked position to the store.
///
/// All events are forwarded to the returned receiver once handled. The task
/// ends when the tracker's sender is dropped and yields the number of
/// samples recorded.
pub fn spawn_recorder(
    mut events: mpsc::UnboundedReceiver<TrackerEvent>,
    store: SharedStore,
) -> (JoinHandle<usize>, mpsc::UnboundedReceiver<TrackerEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(async move {
        let mut recorded = 0;
        while let Some(event) = events.recv().await {
            if let TrackerEvent::Position { position, mode } = &event {
                let sample = LocationSample::new(
                    position.latitude,
                    position.longitude,
                    position.accuracy,
                    position.timestamp,
                    *mode,
                );
                match store.lock().await.record_location(&sample) {
                    Ok(id) => {
                        debug!(id, "recorded location sample");
                        recorded += 1;
                    }
                    Err(e) => warn!(error = %e, "failed to record location sample"),
                }
            }
            // Nobody may be listening downstream.
            let _ = tx.send(event);
        }
        recorded
    });
    (handle, rx)
}

#[cfg(test)]
#[path = "recorder_tests.rs"]
mod tests;
