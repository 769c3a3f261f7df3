// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Reconciliation of the local action queue with the remote store.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  AutoSync   │────►│ SyncManager │────►│ RemoteStore │
//! │ (triggers)  │     │  (one run)  │◄────│   (trait)   │
//! └─────────────┘     └──────┬──────┘     └─────────────┘
//!        ▲                   │
//!        │                   ▼
//! ┌─────────────┐     ┌─────────────┐
//! │  Network    │     │ LocalStore  │  (queue, cache, dead letter)
//! │  Monitor    │     │  (SQLite)   │
//! └─────────────┘     └─────────────┘
//! ```
//!
//! # Features
//!
//! - One run at a time, each a single pass over a queue snapshot
//! - Per-entity ordering: a deferred action holds back later ones
//! - Conflict policies: client wins, server wins, field merge, manual
//! - Bounded retries for transient failures, then dead-lettering
//! - Batched location upload and cache cleanup after every run
//! - Debounced sync on reconnect, periodic sync, exponential retry

mod auto;
mod manager;
mod progress;
mod remote;

pub use auto::AutoSync;
pub use manager::{SyncError, SyncManager, LAST_SYNC_STATE_KEY};
pub use progress::{ConflictRecord, SyncPhase, SyncProgress, SyncResult};
pub use remote::{RemoteError, RemoteResult, RemoteStore, Submission, SubmitOutcome};

#[cfg(test)]
pub(crate) mod test_helpers;
