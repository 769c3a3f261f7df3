// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Pending actions for offline-tolerant mutation tracking.
//!
//! Every offline-tolerant write is recorded as a [`PendingAction`] in the
//! local store. Actions are:
//!
//! - Durable: persisted before the write is acknowledged to the caller
//! - Ordered: the store assigns a creation sequence and actions for the
//!   same entity are replayed in that order
//! - Whole: an action is applied to the remote completely or not at all

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// The kind of mutation an action performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Create a new entity.
    Create,
    /// Patch fields of an existing entity.
    Update,
    /// Remove an entity.
    Delete,
}

impl ActionKind {
    /// Returns the string representation used in storage and display.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Create => "create",
            ActionKind::Update => "update",
            ActionKind::Delete => "delete",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "create" => Ok(ActionKind::Create),
            "update" => Ok(ActionKind::Update),
            "delete" => Ok(ActionKind::Delete),
            _ => Err(Error::InvalidActionKind(s.to_string())),
        }
    }
}

/// Identifies one entity on the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    pub entity_type: String,
    pub entity_id: String,
}

impl EntityKey {
    pub fn new(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        EntityKey {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entity_type, self.entity_id)
    }
}

/// A mutation submitted by the caller, before the store assigns identity.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAction {
    pub kind: ActionKind,
    pub key: EntityKey,
    pub payload: Value,
    /// Remote version the caller built this mutation on. When absent the
    /// store uses the confirmed version of the cached copy, if any.
    pub base_version: Option<u64>,
    pub created_at: DateTime<Utc>,
}

impl NewAction {
    pub fn new(kind: ActionKind, key: EntityKey, payload: Value, created_at: DateTime<Utc>) -> Self {
        NewAction {
            kind,
            key,
            payload,
            base_version: None,
            created_at,
        }
    }

    pub fn create(key: EntityKey, payload: Value, created_at: DateTime<Utc>) -> Self {
        Self::new(ActionKind::Create, key, payload, created_at)
    }

    pub fn update(key: EntityKey, payload: Value, created_at: DateTime<Utc>) -> Self {
        Self::new(ActionKind::Update, key, payload, created_at)
    }

    pub fn delete(key: EntityKey, created_at: DateTime<Utc>) -> Self {
        Self::new(ActionKind::Delete, key, Value::Null, created_at)
    }

    pub fn with_base_version(mut self, version: u64) -> Self {
        self.base_version = Some(version);
        self
    }
}

/// A queued mutation awaiting confirmation by the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAction {
    pub id: String,
    /// Creation sequence assigned by the store.
    pub seq: i64,
    pub kind: ActionKind,
    pub key: EntityKey,
    pub payload: Value,
    pub base_version: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub attempt_count: u32,
    pub last_error: Option<String>,
}

impl PendingAction {
    /// Returns the payload as a JSON object, or an error naming why it
    /// cannot be applied.
    ///
    /// Deletes carry no fields, so any payload (usually null) is accepted.
    pub fn validate(&self) -> Result<()> {
        match self.kind {
            ActionKind::Create | ActionKind::Update if !self.payload.is_object() => {
                Err(Error::InvalidPayload {
                    kind: self.kind.to_string(),
                    entity: self.key.to_string(),
                    reason: "payload must be a JSON object".to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    /// Short human-readable description for progress reporting.
    pub fn describe(&self) -> String {
        format!("{} {}", self.kind, self.key)
    }
}

/// An action that failed permanently and was moved aside.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedAction {
    pub action: PendingAction,
    pub failed_at: DateTime<Utc>,
    pub reason: String,
}

#[cfg(test)]
#[path = "action_tests.rs"]
mod tests;
