// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Sync manager.
//!
//! A run takes a snapshot of the queue and walks it in creation order. Each
//! action is submitted with the version it was built on; the outcome decides
//! whether the action is resolved, retried later, dead-lettered or handed to
//! the conflict policy. The store lock is taken per store call and never
//! held while waiting on the remote.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use fieldops_core::merge::{delete_wins, merge_fields};
use fieldops_core::policy::RESOLUTION_STATE_KEY;
use fieldops_core::{
    ActionKind, CachedRecord, ClockSource, ConflictResolution, EntityKey, LocalStore, PendingAction, Record,
    SystemClock,
};
use serde_json::Value;
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::progress::{ConflictRecord, RunTally, SyncPhase, SyncProgress, SyncResult};
use super::remote::{RemoteError, RemoteStore, Submission, SubmitOutcome};
use crate::config::SyncConfig;
use crate::network::NetworkMonitor;
use crate::SharedStore;

/// App state key holding the completion time of the last run.
pub const LAST_SYNC_STATE_KEY: &str = "last_sync_at";

const COMPLETE_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("cannot sync while offline")]
    Offline,

    #[error("a sync run is already in progress")]
    AlreadyRunning,

    #[error("store error: {0}")]
    Store(#[from] fieldops_core::Error),

    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),
}

/// Per-run bookkeeping shared by the action handlers.
#[derive(Default)]
struct RunState {
    tally: RunTally,
    /// Entities whose remaining actions wait for the next run.
    blocked: HashSet<EntityKey>,
    /// Versions confirmed earlier in this run.
    confirmed: HashMap<EntityKey, u64>,
}

pub struct SyncManager {
    store: SharedStore,
    remote: Arc<dyn RemoteStore>,
    network: NetworkMonitor,
    config: SyncConfig,
    cache_ttl: Option<chrono::Duration>,
    clock: Arc<dyn ClockSource>,
    policy: Mutex<ConflictResolution>,
    overrides: Mutex<HashMap<EntityKey, ConflictResolution>>,
    run_lock: tokio::sync::Mutex<()>,
    progress: watch::Sender<SyncProgress>,
    complete: broadcast::Sender<SyncResult>,
    last_result: Mutex<Option<SyncResult>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SyncManager {
    /// Build a manager, restoring the persisted policy and last sync time.
    pub async fn new(
        store: SharedStore,
        remote: Arc<dyn RemoteStore>,
        network: NetworkMonitor,
        config: SyncConfig,
    ) -> Result<Self, SyncError> {
        let (policy, last_sync_at) = {
            let store = store.lock().await;
            (
                store.get_state::<ConflictResolution>(RESOLUTION_STATE_KEY)?,
                store.get_state(LAST_SYNC_STATE_KEY)?,
            )
        };
        let policy = policy.unwrap_or(config.conflict_resolution);
        let (progress, _) = watch::channel(SyncProgress {
            last_sync_at,
            ..SyncProgress::default()
        });
        let (complete, _) = broadcast::channel(COMPLETE_CHANNEL_CAPACITY);

        Ok(SyncManager {
            store,
            remote,
            network,
            config,
            cache_ttl: None,
            clock: Arc::new(SystemClock),
            policy: Mutex::new(policy),
            overrides: Mutex::new(HashMap::new()),
            run_lock: tokio::sync::Mutex::new(()),
            progress,
            complete,
            last_result: Mutex::new(None),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn ClockSource>) -> Self {
        self.clock = clock;
        self
    }

    /// Lifetime of clean records adopted into the cache.
    pub fn with_cache_ttl(mut self, ttl: Option<chrono::Duration>) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn network(&self) -> &NetworkMonitor {
        &self.network
    }

    /// Start a run. Fails fast while offline or while another run is in flight.
    pub async fn sync_all(&self) -> Result<SyncResult, SyncError> {
        if !self.network.is_online() {
            return Err(SyncError::Offline);
        }
        let _guard = self
            .run_lock
            .try_lock()
            .map_err(|_| SyncError::AlreadyRunning)?;
        Ok(self.run().await)
    }

    /// Wait for any in-flight run, then run immediately.
    pub async fn force_sync(&self) -> Result<SyncResult, SyncError> {
        if !self.network.is_online() {
            return Err(SyncError::Offline);
        }
        let _guard = self.run_lock.lock().await;
        Ok(self.run().await)
    }

    pub fn is_running(&self) -> bool {
        self.progress.borrow().is_running
    }

    pub fn on_progress(&self) -> watch::Receiver<SyncProgress> {
        self.progress.subscribe()
    }

    pub fn on_complete(&self) -> broadcast::Receiver<SyncResult> {
        self.complete.subscribe()
    }

    pub fn get_progress(&self) -> SyncProgress {
        self.progress.borrow().clone()
    }

    pub fn get_last_result(&self) -> Option<SyncResult> {
        lock(&self.last_result).clone()
    }

    pub fn conflict_resolution(&self) -> ConflictResolution {
        *lock(&self.policy)
    }

    /// Set and persist the global conflict policy.
    pub async fn set_conflict_resolution(&self, policy: ConflictResolution) -> Result<(), SyncError> {
        self.store
            .lock()
            .await
            .set_state(RESOLUTION_STATE_KEY, &policy)?;
        *lock(&self.policy) = policy;
        info!(%policy, "conflict resolution changed");
        Ok(())
    }

    /// Use `policy` for one entity instead of the global policy.
    pub fn set_entity_resolution(&self, key: EntityKey, policy: ConflictResolution) {
        lock(&self.overrides).insert(key, policy);
    }

    pub fn clear_entity_resolution(&self, key: &EntityKey) {
        lock(&self.overrides).remove(key);
    }

    /// True if the store has actions or locations waiting to be synced.
    pub async fn has_pending_work(&self) -> bool {
        match self.store.lock().await.stats() {
            Ok(stats) => stats.pending_actions > 0 || stats.unsynced_locations > 0,
            Err(e) => {
                warn!(error = %e, "failed to read offline stats");
                false
            }
        }
    }

    /// Fetch authoritative state for an entity into the cache.
    pub async fn refresh_entity(&self, key: &EntityKey) -> Result<Option<CachedRecord>, SyncError> {
        let remote = self.remote.fetch(key.clone()).await?;
        let mut store = self.store.lock().await;
        match remote {
            Some(record) => Ok(store.cache_commit(&record, self.cache_ttl)?),
            None => {
                if store.pending_for(key)?.is_empty() {
                    store.cache_remove(key)?;
                    Ok(None)
                } else {
                    Ok(store.cache_get(key)?)
                }
            }
        }
    }

    fn update_progress(&self, f: impl FnOnce(&mut SyncProgress)) {
        self.progress.send_modify(f);
    }

    async fn run(&self) -> SyncResult {
        let started = Instant::now();
        let started_at = self.clock.now();
        let last_sync_at = self.progress.borrow().last_sync_at;
        self.progress.send_replace(SyncProgress {
            is_running: true,
            phase: SyncPhase::Preparing,
            started_at: Some(started_at),
            last_sync_at,
            ..SyncProgress::default()
        });
        info!("sync started");

        let mut state = RunState::default();
        if let Err(e) = self.run_phases(&mut state).await {
            error!(error = %e, "sync run aborted");
            state.tally.errors.push(e.to_string());
        }

        let completed_at = self.clock.now();
        if let Err(e) = self
            .store
            .lock()
            .await
            .set_state(LAST_SYNC_STATE_KEY, &completed_at)
        {
            warn!(error = %e, "failed to persist last sync time");
            state.tally.errors.push(e.to_string());
        }

        let result = state.tally.finish(completed_at, started.elapsed());
        self.update_progress(|p| {
            p.is_running = false;
            p.phase = SyncPhase::Complete;
            p.current_item = None;
            p.last_sync_at = Some(completed_at);
        });
        *lock(&self.last_result) = Some(result.clone());
        // No subscribers is fine.
        let _ = self.complete.send(result.clone());

        info!(
            succeeded = result.succeeded,
            failed = result.failed,
            conflicts = result.conflicts.len(),
            resolved = result.resolved_conflicts,
            deferred = result.deferred,
            locations = result.locations_synced,
            "sync complete"
        );
        result
    }

    async fn run_phases(&self, state: &mut RunState) -> fieldops_core::Result<()> {
        let actions = self.store.lock().await.list()?;
        let policy = self.conflict_resolution();
        self.update_progress(|p| {
            p.phase = SyncPhase::PendingActions;
            p.total = actions.len();
        });

        for action in actions {
            self.update_progress(|p| p.current_item = Some(action.describe()));
            self.process(action, policy, state).await?;
            self.update_progress(|p| p.processed += 1);
            debug!(percent = self.progress.borrow().percent(), "sync progress");
        }

        self.update_progress(|p| {
            p.phase = SyncPhase::Locations;
            p.current_item = None;
        });
        self.upload_locations(state).await?;

        self.update_progress(|p| p.phase = SyncPhase::Cleanup);
        state.tally.cache_entries_cleaned = self.store.lock().await.clean_expired_cache()?;
        Ok(())
    }

    async fn process(
        &self,
        action: PendingAction,
        policy: ConflictResolution,
        state: &mut RunState,
    ) -> fieldops_core::Result<()> {
        if state.blocked.contains(&action.key) {
            debug!(action = %action.id, entity = %action.key, "deferred behind earlier action");
            state.tally.deferred += 1;
            return Ok(());
        }

        if let Err(e) = action.validate() {
            error!(action = %action.id, error = %e, "dead-lettering invalid action");
            self.store
                .lock()
                .await
                .mark_permanently_failed(&action.id, &e.to_string())?;
            state.tally.failed += 1;
            return Ok(());
        }

        let expected = state
            .confirmed
            .get(&action.key)
            .copied()
            .or(action.base_version);
        let submission = Submission::from_action(&action, expected);
        debug!(action = %action.id, entity = %action.key, ?expected, "submitting");

        match self.remote.submit(submission).await {
            Ok(SubmitOutcome::Committed(record)) => {
                self.commit(&action, &record, state).await?;
                state.tally.succeeded += 1;
            }
            Ok(SubmitOutcome::Conflict(remote)) => {
                let policy = lock(&self.overrides)
                    .get(&action.key)
                    .copied()
                    .unwrap_or(policy);
                self.resolve_conflict(&action, expected, remote, policy, state)
                    .await?;
            }
            Err(e) if e.is_transient() => self.retry_later(&action, &e, state).await?,
            Err(e) => self.reject(&action, &e, state).await?,
        }
        Ok(())
    }

    /// Adopt a committed record and retire the action.
    async fn commit(&self, action: &PendingAction, record: &Record, state: &mut RunState) -> fieldops_core::Result<()> {
        let mut store = self.store.lock().await;
        settle(&mut store, action)?;
        store.cache_commit(record, self.cache_ttl)?;
        store.rebase_pending(&record.key, record.version)?;
        state.confirmed.insert(record.key.clone(), record.version);
        debug!(action = %action.id, version = record.version, "committed");
        Ok(())
    }

    /// Drop the local action and adopt the remote state.
    async fn adopt_remote(&self, action: &PendingAction, remote: &Record) -> fieldops_core::Result<()> {
        let mut store = self.store.lock().await;
        settle(&mut store, action)?;
        store.cache_commit(remote, self.cache_ttl)?;
        Ok(())
    }

    async fn resolve_conflict(
        &self,
        action: &PendingAction,
        expected: Option<u64>,
        remote: Record,
        policy: ConflictResolution,
        state: &mut RunState,
    ) -> fieldops_core::Result<()> {
        info!(
            action = %action.id,
            entity = %action.key,
            %policy,
            remote_version = remote.version,
            "version conflict"
        );

        match policy {
            ConflictResolution::ClientWins => {
                let submission = Submission::from_action(action, expected).forced(remote.version);
                self.submit_resolution(action, submission, state).await
            }
            ConflictResolution::ServerWins => {
                self.adopt_remote(action, &remote).await?;
                state.tally.resolved_conflicts += 1;
                Ok(())
            }
            ConflictResolution::Merge => match self.merged_submission(action, expected, &remote).await? {
                Some(submission) => self.submit_resolution(action, submission, state).await,
                None => {
                    debug!(action = %action.id, "merge kept the remote state");
                    self.adopt_remote(action, &remote).await?;
                    state.tally.resolved_conflicts += 1;
                    Ok(())
                }
            },
            ConflictResolution::Manual => {
                let note = format!("conflict with remote version {}", remote.version);
                self.store.lock().await.note_error(&action.id, &note)?;
                state.tally.conflicts.push(ConflictRecord {
                    action_id: action.id.clone(),
                    key: action.key.clone(),
                    local: action.payload.clone(),
                    remote,
                });
                state.blocked.insert(action.key.clone());
                Ok(())
            }
        }
    }

    /// The forced submission a field merge calls for, or `None` when the
    /// remote state already is the merged state.
    async fn merged_submission(
        &self,
        action: &PendingAction,
        expected: Option<u64>,
        remote: &Record,
    ) -> fieldops_core::Result<Option<Submission>> {
        let forced = |kind: ActionKind, payload: Value| Submission {
            kind,
            payload,
            ..Submission::from_action(action, expected).forced(remote.version)
        };

        match action.kind {
            ActionKind::Delete => Ok(delete_wins(action.created_at, remote)
                .then(|| forced(ActionKind::Delete, Value::Null))),
            // A remote delete counts as one overlapping change to the whole record.
            _ if remote.deleted => Ok((action.kind == ActionKind::Create
                && action.created_at > remote.updated_at)
                .then(|| forced(ActionKind::Create, action.payload.clone()))),
            _ => {
                let Some(local) = action.payload.as_object() else {
                    return Ok(None);
                };
                let base = match (action.kind, expected) {
                    (ActionKind::Update, Some(version)) => self
                        .store
                        .lock()
                        .await
                        .cache_get(&action.key)?
                        .filter(|cached| cached.record.version == version)
                        .and_then(|cached| cached.confirmed()),
                    _ => None,
                };
                let merge = merge_fields(local, action.created_at, base.as_ref(), remote);
                if !merge.remote_wins.is_empty() {
                    debug!(action = %action.id, fields = ?merge.remote_wins, "remote kept overlapping fields");
                }
                Ok((!merge.is_noop()).then(|| forced(ActionKind::Update, Value::Object(merge.fields))))
            }
        }
    }

    async fn submit_resolution(
        &self,
        action: &PendingAction,
        submission: Submission,
        state: &mut RunState,
    ) -> fieldops_core::Result<()> {
        match self.remote.submit(submission).await {
            Ok(SubmitOutcome::Committed(record)) => {
                self.commit(action, &record, state).await?;
                state.tally.succeeded += 1;
                state.tally.resolved_conflicts += 1;
            }
            Ok(SubmitOutcome::Conflict(remote)) => {
                warn!(action = %action.id, remote_version = remote.version, "remote refused forced resolution");
                let note = format!("conflict with remote version {}", remote.version);
                self.store.lock().await.note_error(&action.id, &note)?;
                state.tally.deferred += 1;
                state.blocked.insert(action.key.clone());
            }
            Err(e) if e.is_transient() => self.retry_later(action, &e, state).await?,
            Err(e) => self.reject(action, &e, state).await?,
        }
        Ok(())
    }

    /// Dead-letter a mutation the remote refused, then pull the entity's
    /// authoritative state.
    async fn reject(&self, action: &PendingAction, err: &RemoteError, state: &mut RunState) -> fieldops_core::Result<()> {
        let reason = match err {
            RemoteError::Rejected(reason) => reason.clone(),
            other => other.to_string(),
        };
        error!(action = %action.id, entity = %action.key, reason, "remote rejected action");
        self.store
            .lock()
            .await
            .mark_permanently_failed(&action.id, &reason)?;
        state.tally.failed += 1;

        if let Err(e) = self.refresh_entity(&action.key).await {
            warn!(entity = %action.key, error = %e, "failed to refresh rejected entity");
        }
        Ok(())
    }

    async fn retry_later(&self, action: &PendingAction, err: &RemoteError, state: &mut RunState) -> fieldops_core::Result<()> {
        let mut store = self.store.lock().await;
        let attempts = store.mark_failed(&action.id, &err.to_string())?;
        if attempts >= self.config.max_attempts {
            error!(action = %action.id, attempts, error = %err, "giving up on action");
            let reason = format!("gave up after {attempts} attempts: {err}");
            store.mark_permanently_failed(&action.id, &reason)?;
            state.tally.failed += 1;
        } else {
            warn!(action = %action.id, attempts, error = %err, "action failed, will retry");
            state.tally.deferred += 1;
        }
        state.blocked.insert(action.key.clone());
        Ok(())
    }

    async fn upload_locations(&self, state: &mut RunState) -> fieldops_core::Result<()> {
        let batch_size = self.config.location_batch_size.max(1);
        loop {
            let batch = self.store.lock().await.unsynced_locations(batch_size)?;
            if batch.is_empty() {
                break;
            }
            let ids: Vec<i64> = batch.iter().filter_map(|s| s.id).collect();
            let count = batch.len();

            match self.remote.upload_locations(batch).await {
                Ok(()) => {
                    self.store.lock().await.mark_locations_synced(&ids)?;
                    state.tally.locations_synced += count;
                    debug!(count, "uploaded location batch");
                    if count < batch_size {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "location upload failed");
                    state.tally.errors.push(format!("location upload failed: {e}"));
                    break;
                }
            }
        }
        Ok(())
    }
}

/// Retire an action unless it changed while its submission was in flight.
fn settle(store: &mut LocalStore, action: &PendingAction) -> fieldops_core::Result<()> {
    match store.get(&action.id) {
        Ok(current) if current.payload == action.payload => store.mark_resolved(&action.id),
        Ok(_) => {
            debug!(action = %action.id, "action changed during sync, keeping it queued");
            Ok(())
        }
        Err(fieldops_core::Error::ActionNotFound(_)) => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
