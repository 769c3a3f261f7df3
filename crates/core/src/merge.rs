// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Field-level merge of a local payload against diverged remote state.
//!
//! Merge rules:
//! - A field only the local side changed: local value is kept
//! - A field only the remote side changed: remote value is kept
//! - A field both sides changed (overlapping): the later timestamp wins,
//!   comparing the local action's creation time with the remote record's
//!   update time; ties go to the remote
//! - A local delete wins only if it is strictly newer than the remote update
//!
//! The outcome depends only on its inputs, so the same divergence always
//! resolves the same way.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::record::Record;

/// Result of merging a local payload with remote state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMerge {
    /// Fields the local side wins. Submitting these on top of the remote
    /// record yields the merged state.
    pub fields: Map<String, Value>,
    /// Overlapping fields resolved in favor of the remote.
    pub remote_wins: Vec<String>,
}

impl FieldMerge {
    /// Returns true if the merged state equals the remote state.
    pub fn is_noop(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Merges `local`, written at `local_at` on top of `base`, with `remote`.
///
/// `base` is the record the local change was built on. Without it every
/// field where the remote holds a different value counts as overlapping.
pub fn merge_fields(
    local: &Map<String, Value>,
    local_at: DateTime<Utc>,
    base: Option<&Record>,
    remote: &Record,
) -> FieldMerge {
    let mut merge = FieldMerge::default();

    for (field, local_value) in local {
        let remote_value = remote.get(field);
        if remote_value == Some(local_value) {
            continue;
        }

        let remote_changed = match base {
            Some(base) => base.get(field) != remote_value,
            None => remote_value.is_some(),
        };

        if !remote_changed || local_at > remote.updated_at {
            merge.fields.insert(field.clone(), local_value.clone());
        } else {
            merge.remote_wins.push(field.clone());
        }
    }

    merge
}

/// Returns true if a local delete made at `local_at` supersedes `remote`.
pub fn delete_wins(local_at: DateTime<Utc>, remote: &Record) -> bool {
    remote.deleted || local_at > remote.updated_at
}

#[cfg(test)]
#[path = "merge_tests.rs"]
mod tests;
