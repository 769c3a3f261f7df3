// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Remote store seam.

use chrono::{DateTime, Utc};
use fieldops_core::{ActionKind, EntityKey, LocationSample, PendingAction, Record};
use futures_util::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;

/// Error returned by a [`RemoteStore`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("network error: {0}")]
    Network(String),

    #[error("remote request timed out")]
    Timeout,

    #[error("remote unavailable: {0}")]
    Unavailable(String),

    /// The remote refused the mutation itself. Retrying cannot help.
    #[error("rejected by remote: {0}")]
    Rejected(String),
}

impl RemoteError {
    /// Transient errors are retried on a later run.
    pub fn is_transient(&self) -> bool {
        !matches!(self, RemoteError::Rejected(_))
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// One mutation sent to the remote store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Submission {
    pub key: EntityKey,
    pub kind: ActionKind,
    pub payload: Value,
    /// Version the mutation was built on. `None` for entities the client
    /// has never seen confirmed.
    pub expected_version: Option<u64>,
    /// Apply even if the remote version differs.
    pub force: bool,
    pub client_timestamp: DateTime<Utc>,
}

impl Submission {
    pub fn from_action(action: &PendingAction, expected_version: Option<u64>) -> Self {
        Submission {
            key: action.key.clone(),
            kind: action.kind,
            payload: action.payload.clone(),
            expected_version,
            force: false,
            client_timestamp: action.created_at,
        }
    }

    /// Force the mutation over the given remote version.
    pub fn forced(mut self, remote_version: u64) -> Self {
        self.expected_version = Some(remote_version);
        self.force = true;
        self
    }
}

/// Remote answer to a [`Submission`].
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Applied; the record is the new authoritative state.
    Committed(Record),
    /// The expected version is stale; the record is the current state.
    Conflict(Record),
}

/// The authoritative store the queue is drained against.
pub trait RemoteStore: Send + Sync {
    fn submit(&self, submission: Submission) -> BoxFuture<'_, RemoteResult<SubmitOutcome>>;

    /// Current state of an entity, `None` if it does not exist.
    fn fetch(&self, key: EntityKey) -> BoxFuture<'_, RemoteResult<Option<Record>>>;

    fn upload_locations(&self, samples: Vec<LocationSample>) -> BoxFuture<'_, RemoteResult<()>>;
}

#[cfg(test)]
#[path = "remote_tests.rs"]
mod tests;
