// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for sync module tests.

#![allow(clippy::unwrap_used)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, TimeZone, Utc};
use fieldops_core::{ActionKind, EntityKey, LocalStore, LocationSample, Record};
use futures_util::future::BoxFuture;
use serde_json::{Map, Value};
use tokio::sync::Notify;

use super::{RemoteError, RemoteResult, RemoteStore, Submission, SubmitOutcome};
use crate::SharedStore;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory remote store with optimistic versioning and scripted failures.
#[derive(Default)]
pub struct FakeRemote {
    records: Mutex<HashMap<EntityKey, Record>>,
    failures: Mutex<VecDeque<RemoteError>>,
    upload_failure: Mutex<Option<RemoteError>>,
    submissions: Mutex<Vec<Submission>>,
    uploads: Mutex<Vec<Vec<LocationSample>>>,
    now: Mutex<Option<DateTime<Utc>>>,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(FakeRemote::default())
    }

    /// Put a record on the remote, as another client would.
    pub fn seed(&self, record: Record) {
        lock(&self.records).insert(record.key.clone(), record);
    }

    pub fn record(&self, key: &EntityKey) -> Option<Record> {
        lock(&self.records).get(key).cloned()
    }

    /// Fail the next submit with `err`. Calls queue up.
    pub fn fail_next(&self, err: RemoteError) {
        lock(&self.failures).push_back(err);
    }

    pub fn fail_uploads(&self, err: Option<RemoteError>) {
        *lock(&self.upload_failure) = err;
    }

    pub fn submissions(&self) -> Vec<Submission> {
        lock(&self.submissions).clone()
    }

    pub fn uploads(&self) -> Vec<Vec<LocationSample>> {
        lock(&self.uploads).clone()
    }

    /// Timestamp the remote stamps on commits.
    pub fn set_now(&self, at: DateTime<Utc>) {
        *lock(&self.now) = Some(at);
    }

    /// Hold every submit until the returned handle is notified.
    pub fn hold(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *lock(&self.gate) = Some(Arc::clone(&gate));
        gate
    }

    pub fn release(&self) {
        if let Some(gate) = lock(&self.gate).take() {
            gate.notify_waiters();
            gate.notify_one();
        }
    }

    fn apply(&self, s: &Submission) -> RemoteResult<SubmitOutcome> {
        if let Some(err) = lock(&self.failures).pop_front() {
            return Err(err);
        }
        let now = lock(&self.now).unwrap_or_else(Utc::now);
        let mut records = lock(&self.records);
        let current = records.get(&s.key).cloned();

        if !s.force {
            match (&current, s.expected_version) {
                (Some(r), Some(v)) if r.version != v => return Ok(SubmitOutcome::Conflict(r.clone())),
                (Some(r), None) => return Ok(SubmitOutcome::Conflict(r.clone())),
                (None, _) if s.kind != ActionKind::Create => {
                    return Err(RemoteError::Rejected(format!("{} not found", s.key)));
                }
                _ => {}
            }
        }

        let mut record = current.unwrap_or_else(|| Record::new(s.key.clone(), 0, Map::new(), now));
        record.apply(s.kind, &s.payload, now);
        record.version += 1;
        records.insert(s.key.clone(), record.clone());
        Ok(SubmitOutcome::Committed(record))
    }
}

impl RemoteStore for FakeRemote {
    fn submit(&self, submission: Submission) -> BoxFuture<'_, RemoteResult<SubmitOutcome>> {
        Box::pin(async move {
            lock(&self.submissions).push(submission.clone());
            let gate = lock(&self.gate).clone();
            if let Some(gate) = gate {
                gate.notified().await;
            }
            self.apply(&submission)
        })
    }

    fn fetch(&self, key: EntityKey) -> BoxFuture<'_, RemoteResult<Option<Record>>> {
        Box::pin(async move { Ok(self.record(&key)) })
    }

    fn upload_locations(&self, samples: Vec<LocationSample>) -> BoxFuture<'_, RemoteResult<()>> {
        Box::pin(async move {
            if let Some(err) = lock(&self.upload_failure).clone() {
                return Err(err);
            }
            lock(&self.uploads).push(samples);
            Ok(())
        })
    }
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 4, 1, 9, 0, 0).unwrap()
}

pub fn visit(id: &str) -> EntityKey {
    EntityKey::new("site_visit", id)
}

pub fn record(key: EntityKey, version: u64, fields: Value, updated_at: DateTime<Utc>) -> Record {
    Record::new(key, version, fields.as_object().cloned().unwrap(), updated_at)
}

pub fn memory_store() -> SharedStore {
    Arc::new(tokio::sync::Mutex::new(LocalStore::open_in_memory().unwrap()))
}
