// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Background sync scheduling.
//!
//! One task decides when the manager runs:
//! - after a debounce when the network comes online,
//! - periodically while online and work is pending,
//! - with exponential backoff after a run that left work behind.
//!
//! Any clean run, including a forced one, clears the pending retry and its
//! backoff.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::manager::{SyncError, SyncManager};
use super::progress::SyncResult;
use crate::config::SyncConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Online,
    Periodic,
    Retry,
}

#[derive(Debug, Clone)]
struct Schedule {
    debounce: Duration,
    interval: Option<Duration>,
    config: SyncConfig,
}

/// Handle to the auto-sync task.
pub struct AutoSync {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl AutoSync {
    /// Spawn the scheduler for `manager`, watching its network monitor.
    pub fn spawn(manager: Arc<SyncManager>, config: &SyncConfig) -> Self {
        let cancel = CancellationToken::new();
        let schedule = Schedule {
            debounce: config.debounce(),
            interval: config.auto_sync_interval(),
            config: config.clone(),
        };
        let online = manager.network().subscribe();
        let complete = manager.on_complete();
        let handle = tokio::spawn(run(manager, online, complete, schedule, cancel.clone()));
        AutoSync { cancel, handle }
    }

    /// Stop scheduling and wait for the task. A run in flight finishes first.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            warn!(error = %e, "auto sync task failed");
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

async fn run(
    manager: Arc<SyncManager>,
    mut online: watch::Receiver<bool>,
    mut complete: broadcast::Receiver<SyncResult>,
    schedule: Schedule,
    cancel: CancellationToken,
) {
    let mut failures: u32 = 0;
    let mut complete_open = true;
    let initially_online = *online.borrow_and_update();
    let mut next: Option<(Instant, Trigger)> =
        initially_online.then(|| (Instant::now() + schedule.debounce, Trigger::Online));

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = online.changed() => {
                if changed.is_err() {
                    break;
                }
                if *online.borrow_and_update() {
                    info!(debounce = ?schedule.debounce, "network online, sync scheduled");
                    failures = 0;
                    next = Some((Instant::now() + schedule.debounce, Trigger::Online));
                } else {
                    debug!("network offline, sync paused");
                    next = None;
                }
            }
            received = complete.recv(), if complete_open => match received {
                Ok(result) if !result.needs_retry() => {
                    failures = 0;
                    if matches!(next, Some((_, Trigger::Retry))) {
                        debug!("clean sync completed, pending retry dropped");
                        next = periodic(&schedule);
                    }
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => complete_open = false,
            },
            _ = wait_until(next.map(|(at, _)| at)) => {
                let trigger = next.map(|(_, t)| t).unwrap_or(Trigger::Periodic);
                next = None;

                if trigger == Trigger::Periodic && !manager.has_pending_work().await {
                    next = periodic(&schedule);
                    continue;
                }

                debug!(?trigger, "auto sync");
                next = match manager.sync_all().await {
                    Ok(result) if result.needs_retry() => {
                        let delay = schedule.config.retry_delay(failures);
                        failures = failures.saturating_add(1);
                        info!(?delay, failures, "work left behind, retry scheduled");
                        Some((Instant::now() + delay, Trigger::Retry))
                    }
                    Ok(_) => {
                        failures = 0;
                        periodic(&schedule)
                    }
                    Err(SyncError::AlreadyRunning) => periodic(&schedule)
                        .or(Some((Instant::now() + schedule.debounce, Trigger::Retry))),
                    Err(SyncError::Offline) => None,
                    Err(e) => {
                        warn!(error = %e, "auto sync failed");
                        periodic(&schedule)
                    }
                };
            }
        }
    }
    debug!("auto sync stopped");
}

fn periodic(schedule: &Schedule) -> Option<(Instant, Trigger)> {
    schedule
        .interval
        .map(|interval| (Instant::now() + interval, Trigger::Periodic))
}

#[cfg(test)]
#[path = "auto_tests.rs"]
mod tests;
