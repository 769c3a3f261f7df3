// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Entity records as known to the remote store and the local cache.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::action::{ActionKind, EntityKey};

/// The state of one entity.
///
/// Version `0` marks a record that only exists locally and has never been
/// confirmed by the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub key: EntityKey,
    pub version: u64,
    #[serde(default)]
    pub fields: Map<String, Value>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted: bool,
}

impl Record {
    pub fn new(key: EntityKey, version: u64, fields: Map<String, Value>, updated_at: DateTime<Utc>) -> Self {
        Record {
            key,
            version,
            fields,
            updated_at,
            deleted: false,
        }
    }

    /// A record that has never been seen by the remote store.
    pub fn local(key: EntityKey, updated_at: DateTime<Utc>) -> Self {
        Self::new(key, 0, Map::new(), updated_at)
    }

    /// Returns true once the remote store has assigned a version.
    pub fn is_confirmed(&self) -> bool {
        self.version > 0
    }

    /// Returns a field value, if set.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Applies a mutation to the fields.
    ///
    /// Create replaces all fields, update patches the named fields, delete
    /// marks the record deleted. The version is left untouched; only the
    /// remote store assigns versions.
    pub fn apply(&mut self, kind: ActionKind, payload: &Value, at: DateTime<Utc>) {
        match kind {
            ActionKind::Create => {
                self.fields = payload.as_object().cloned().unwrap_or_default();
                self.deleted = false;
            }
            ActionKind::Update => {
                if let Some(patch) = payload.as_object() {
                    for (field, value) in patch {
                        self.fields.insert(field.clone(), value.clone());
                    }
                }
            }
            ActionKind::Delete => {
                self.deleted = true;
            }
        }
        self.updated_at = at;
    }
}

/// A record held in the local cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedRecord {
    pub record: Record,
    /// True while the record carries optimistic changes from pending actions.
    pub dirty: bool,
    pub cached_at: DateTime<Utc>,
    /// Clean records past this instant are dropped by cache cleanup.
    pub expires_at: Option<DateTime<Utc>>,
    /// Fields as last confirmed by the remote store, before optimistic
    /// changes. `None` for records that only exist locally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed_fields: Option<Map<String, Value>>,
}

impl CachedRecord {
    /// The last confirmed remote state, if the record has one.
    pub fn confirmed(&self) -> Option<Record> {
        if !self.record.is_confirmed() {
            return None;
        }
        let fields = self.confirmed_fields.clone()?;
        Some(Record::new(
            self.record.key.clone(),
            self.record.version,
            fields,
            self.record.updated_at,
        ))
    }

    /// Returns true if the entry can be dropped at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        !self.dirty && self.expires_at.is_some_and(|at| at <= now)
    }
}

#[cfg(test)]
#[path = "record_tests.rs"]
mod tests;
