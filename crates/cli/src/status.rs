// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Status facade for the UI layer.
//!
//! [`SyncStatus`] folds sync progress, run results, offline counts,
//! connectivity and realtime health into one [`SyncStatusState`] published
//! through a `watch` channel. A spawned driver keeps it current; the UI only
//! reads the state and calls the imperative helpers.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use fieldops_core::{ConflictResolution, OfflineStats};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::StatusConfig;
use crate::realtime::{ChannelStatus, HealthMonitor, HealthState};
use crate::sync::{SyncError, SyncManager, SyncProgress, SyncResult};

/// Realtime health as the UI sees it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RealtimeSummary {
    pub channel_count: usize,
    pub connected_channels: usize,
    pub max_retries_reached: bool,
}

impl From<&HealthState> for RealtimeSummary {
    fn from(state: &HealthState) -> Self {
        RealtimeSummary {
            channel_count: state.channels.len(),
            connected_channels: state
                .channels
                .values()
                .filter(|c| c.status == ChannelStatus::Connected)
                .count(),
            max_retries_reached: state.max_retries_reached,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncStatusState {
    pub is_online: bool,
    pub is_syncing: bool,
    pub progress: SyncProgress,
    pub last_result: Option<SyncResult>,
    pub stats: OfflineStats,
    pub pending_count: usize,
    /// Set for a short while after the network comes back.
    pub just_came_online: bool,
    pub has_errors: bool,
    pub realtime: RealtimeSummary,
}

impl SyncStatusState {
    fn recompute(&mut self) {
        let run_failed = self.last_result.as_ref().is_some_and(SyncResult::has_problems);
        self.has_errors = run_failed || self.stats.failed_actions > 0 || self.realtime.max_retries_reached;
    }
}

fn publish(tx: &watch::Sender<SyncStatusState>, f: impl FnOnce(&mut SyncStatusState)) {
    tx.send_modify(|state| {
        f(state);
        state.recompute();
    });
}

pub struct SyncStatus {
    manager: Arc<SyncManager>,
    health: Arc<HealthMonitor>,
    state: Arc<watch::Sender<SyncStatusState>>,
    listener: u64,
    cancel: CancellationToken,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl SyncStatus {
    /// Build the initial state and spawn the driver.
    pub async fn spawn(
        manager: Arc<SyncManager>,
        health: Arc<HealthMonitor>,
        config: &StatusConfig,
    ) -> Result<Self, SyncError> {
        let stats = manager.store().lock().await.stats()?;
        let progress = manager.get_progress();
        let mut initial = SyncStatusState {
            is_online: manager.network().is_online(),
            is_syncing: progress.is_running,
            progress,
            last_result: manager.get_last_result(),
            stats,
            pending_count: stats.pending_actions,
            just_came_online: false,
            has_errors: false,
            realtime: RealtimeSummary::from(&health.get_state()),
        };
        initial.recompute();
        let (state, _) = watch::channel(initial);
        let state = Arc::new(state);

        let sink = Arc::clone(&state);
        let listener = health.subscribe(move |health| {
            let summary = RealtimeSummary::from(health);
            // Listeners fire on every counter bump; only publish real changes.
            sink.send_if_modified(|state| {
                if state.realtime == summary {
                    return false;
                }
                state.realtime = summary;
                state.recompute();
                true
            });
        });

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(drive(
            Arc::clone(&manager),
            Arc::clone(&state),
            Timing::from(config),
            cancel.clone(),
        ));

        Ok(SyncStatus {
            manager,
            health,
            state,
            listener,
            cancel,
            driver: Mutex::new(Some(handle)),
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatusState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> SyncStatusState {
        self.state.borrow().clone()
    }

    /// Run a sync unless one is already in flight.
    pub async fn sync(&self) -> Result<SyncResult, SyncError> {
        let result = self.manager.sync_all().await?;
        self.refresh_stats().await?;
        Ok(result)
    }

    /// Run a sync now, after any run in flight.
    pub async fn force_sync(&self) -> Result<SyncResult, SyncError> {
        let result = self.manager.force_sync().await?;
        self.refresh_stats().await?;
        Ok(result)
    }

    pub async fn set_conflict_resolution(&self, policy: ConflictResolution) -> Result<(), SyncError> {
        self.manager.set_conflict_resolution(policy).await
    }

    /// Re-read the offline counts from the store.
    pub async fn refresh_stats(&self) -> Result<OfflineStats, SyncError> {
        refresh(&self.manager, &self.state).await
    }

    /// Stop the driver and detach from the health monitor.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.health.unsubscribe(self.listener);
        let handle = self.driver.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "status driver failed");
            }
        }
    }
}

impl Drop for SyncStatus {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.health.unsubscribe(self.listener);
    }
}

#[derive(Debug, Clone, Copy)]
struct Timing {
    stats_refresh: Duration,
    online_notice: Duration,
}

impl From<&StatusConfig> for Timing {
    fn from(config: &StatusConfig) -> Self {
        Timing {
            stats_refresh: Duration::from_secs(config.stats_refresh_secs.max(1)),
            online_notice: Duration::from_secs(config.online_notice_secs),
        }
    }
}

async fn refresh(
    manager: &SyncManager,
    state: &watch::Sender<SyncStatusState>,
) -> Result<OfflineStats, SyncError> {
    let stats = manager.store().lock().await.stats()?;
    publish(state, |s| {
        s.stats = stats;
        s.pending_count = stats.pending_actions;
    });
    Ok(stats)
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

async fn drive(
    manager: Arc<SyncManager>,
    state: Arc<watch::Sender<SyncStatusState>>,
    timing: Timing,
    cancel: CancellationToken,
) {
    let mut progress = manager.on_progress();
    let mut complete = manager.on_complete();
    let mut online = manager.network().subscribe();
    let mut ticker = tokio::time::interval(timing.stats_refresh);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut notice_until: Option<Instant> = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = progress.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = progress.borrow_and_update().clone();
                publish(&state, |s| {
                    s.is_syncing = current.is_running;
                    s.progress = current;
                });
            }
            finished = complete.recv() => {
                let result = match finished {
                    Ok(result) => Some(result),
                    Err(RecvError::Lagged(_)) => manager.get_last_result(),
                    Err(RecvError::Closed) => break,
                };
                publish(&state, |s| s.last_result = result);
                if let Err(e) = refresh(&manager, &state).await {
                    warn!(error = %e, "failed to refresh offline stats");
                }
            }
            changed = online.changed() => {
                if changed.is_err() {
                    break;
                }
                let is_online = *online.borrow_and_update();
                notice_until = (is_online && !timing.online_notice.is_zero())
                    .then(|| Instant::now() + timing.online_notice);
                publish(&state, |s| {
                    s.is_online = is_online;
                    s.just_came_online = notice_until.is_some();
                });
            }
            _ = wait_until(notice_until) => {
                notice_until = None;
                publish(&state, |s| s.just_came_online = false);
            }
            _ = ticker.tick() => {
                if let Err(e) = refresh(&manager, &state).await {
                    warn!(error = %e, "failed to refresh offline stats");
                }
            }
        }
    }
    debug!("status driver stopped");
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
