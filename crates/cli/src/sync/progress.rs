// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Observable sync progress and run results.

use std::time::Duration;

use chrono::{DateTime, Utc};
use fieldops_core::{EntityKey, Record};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    #[default]
    Idle,
    Preparing,
    PendingActions,
    Locations,
    Cleanup,
    Complete,
}

/// Live state of the current (or last) run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncProgress {
    pub is_running: bool,
    pub phase: SyncPhase,
    /// Actions in the run's snapshot.
    pub total: usize,
    pub processed: usize,
    pub current_item: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_sync_at: Option<DateTime<Utc>>,
}

impl SyncProgress {
    /// Completion of the action pass, 0 to 100.
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return if self.phase == SyncPhase::Complete { 100 } else { 0 };
        }
        let pct = self.processed.min(self.total) * 100 / self.total;
        u8::try_from(pct).unwrap_or(100)
    }
}

/// A conflict left for a manual decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConflictRecord {
    pub action_id: String,
    pub key: EntityKey,
    pub local: Value,
    pub remote: Record,
}

/// Outcome of one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncResult {
    pub succeeded: usize,
    pub failed: usize,
    /// Conflicts awaiting manual resolution.
    pub conflicts: Vec<ConflictRecord>,
    /// Conflicts settled by policy.
    pub resolved_conflicts: usize,
    /// Actions left in the queue for a later run.
    pub deferred: usize,
    pub locations_synced: usize,
    pub cache_entries_cleaned: usize,
    pub errors: Vec<String>,
    pub completed_at: DateTime<Utc>,
    pub duration: Duration,
}

impl SyncResult {
    /// True if the run failed items, left conflicts or hit errors.
    pub fn has_problems(&self) -> bool {
        self.failed > 0 || !self.conflicts.is_empty() || !self.errors.is_empty()
    }

    /// True if the queue still holds work this run could not finish.
    pub fn needs_retry(&self) -> bool {
        self.deferred > 0 || !self.errors.is_empty()
    }
}

/// Counters accumulated during a run.
#[derive(Debug, Default)]
pub(crate) struct RunTally {
    pub succeeded: usize,
    pub failed: usize,
    pub conflicts: Vec<ConflictRecord>,
    pub resolved_conflicts: usize,
    pub deferred: usize,
    pub locations_synced: usize,
    pub cache_entries_cleaned: usize,
    pub errors: Vec<String>,
}

impl RunTally {
    pub fn finish(self, completed_at: DateTime<Utc>, duration: Duration) -> SyncResult {
        SyncResult {
            succeeded: self.succeeded,
            failed: self.failed,
            conflicts: self.conflicts,
            resolved_conflicts: self.resolved_conflicts,
            deferred: self.deferred,
            locations_synced: self.locations_synced,
            cache_entries_cleaned: self.cache_entries_cleaned,
            errors: self.errors,
            completed_at,
            duration,
        }
    }
}

#[cfg(test)]
#[path = "progress_tests.rs"]
mod tests;
