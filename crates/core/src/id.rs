// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Pending action identifiers.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::action::{ActionKind, EntityKey};

/// Prefix shared by every action id.
pub const ACTION_ID_PREFIX: &str = "act";

/// Generate an action ID from the entity key, kind, and timestamp.
/// Format: act-{hash} where hash is the first 12 hex chars of
/// SHA256(entity_type + entity_id + kind + timestamp).
pub fn generate_action_id(key: &EntityKey, kind: ActionKind, created_at: &DateTime<Utc>) -> String {
    let input = format!(
        "{}/{}{}{}",
        key.entity_type,
        key.entity_id,
        kind.as_str(),
        created_at.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true)
    );
    let hash = Sha256::digest(input.as_bytes());
    let short_hash = hex::encode(&hash[..6]);
    format!("{}-{}", ACTION_ID_PREFIX, short_hash)
}

/// Generate a unique action ID, handling collisions by appending an incrementing suffix.
///
/// Stops at the first error from `exists`.
pub fn generate_unique_action_id<F, E>(
    key: &EntityKey,
    kind: ActionKind,
    created_at: &DateTime<Utc>,
    mut exists: F,
) -> Result<String, E>
where
    F: FnMut(&str) -> Result<bool, E>,
{
    let base_id = generate_action_id(key, kind, created_at);

    if !exists(&base_id)? {
        return Ok(base_id);
    }

    let mut suffix = 2;
    loop {
        let id = format!("{}-{}", base_id, suffix);
        if !exists(&id)? {
            return Ok(id);
        }
        suffix += 1;
    }
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
