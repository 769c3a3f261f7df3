// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! SQLite-backed local action store.
//!
//! The [`LocalStore`] holds everything the client needs to keep working
//! offline: the pending action queue, a dead-letter table for actions that
//! failed permanently, the cached copy of remote records, recorded location
//! samples and a small key/value table of app state.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

use crate::action::{ActionKind, EntityKey, FailedAction, NewAction, PendingAction};
use crate::clock::{ClockSource, SystemClock};
use crate::error::{Error, Result};
use crate::id::generate_unique_action_id;
use crate::location::LocationSample;
use crate::record::{CachedRecord, Record};

/// Entity type counted as an unsynced visit in [`OfflineStats`].
pub const VISIT_ENTITY_TYPE: &str = "site_visit";

/// SQL schema for the local store.
pub const SCHEMA: &str = r#"
-- Pending mutations, replayed in seq order
CREATE TABLE IF NOT EXISTS pending_actions (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    kind TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    payload TEXT NOT NULL,
    base_version INTEGER,
    created_at TEXT NOT NULL,
    attempt_count INTEGER NOT NULL DEFAULT 0,
    last_error TEXT
);

-- Actions that failed permanently (dead letter)
CREATE TABLE IF NOT EXISTS failed_actions (
    id TEXT PRIMARY KEY,
    seq INTEGER NOT NULL,
    kind TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    payload TEXT NOT NULL,
    base_version INTEGER,
    created_at TEXT NOT NULL,
    attempt_count INTEGER NOT NULL,
    last_error TEXT,
    failed_at TEXT NOT NULL,
    reason TEXT NOT NULL
);

-- Cached copy of remote records, with optimistic local changes applied
CREATE TABLE IF NOT EXISTS cached_records (
    entity_type TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    version INTEGER NOT NULL,
    fields TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted INTEGER NOT NULL DEFAULT 0,
    dirty INTEGER NOT NULL DEFAULT 0,
    cached_at TEXT NOT NULL,
    expires_at_ms INTEGER,
    confirmed_fields TEXT,
    PRIMARY KEY (entity_type, entity_id)
);

-- Recorded positions awaiting upload
CREATE TABLE IF NOT EXISTS location_samples (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    latitude REAL NOT NULL,
    longitude REAL NOT NULL,
    accuracy REAL NOT NULL,
    recorded_at TEXT NOT NULL,
    mode TEXT NOT NULL,
    synced INTEGER NOT NULL DEFAULT 0
);

-- Small key/value state (conflict policy, last sync time)
CREATE TABLE IF NOT EXISTS app_state (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Indexes
CREATE INDEX IF NOT EXISTS idx_pending_entity ON pending_actions(entity_type, entity_id);
CREATE INDEX IF NOT EXISTS idx_failed_seq ON failed_actions(seq);
CREATE INDEX IF NOT EXISTS idx_cache_expires ON cached_records(dirty, expires_at_ms);
CREATE INDEX IF NOT EXISTS idx_locations_synced ON location_samples(synced);
"#;

const PENDING_COLUMNS: &str = "seq, id, kind, entity_type, entity_id, payload, base_version,
     created_at, attempt_count, last_error";

const CACHE_COLUMNS: &str =
    "entity_type, entity_id, version, fields, updated_at, deleted, dirty, cached_at, expires_at_ms,
     confirmed_fields";

/// Result of [`LocalStore::enqueue`].
#[derive(Debug, Clone, PartialEq)]
pub enum EnqueueOutcome {
    /// A new action was appended to the queue.
    Queued(PendingAction),
    /// The entity's latest unresolved action of the same kind had its
    /// payload replaced.
    Replaced(PendingAction),
    /// The submission repeated the entity's latest update; nothing changed.
    Duplicate(PendingAction),
}

impl EnqueueOutcome {
    /// The queued action this outcome refers to.
    pub fn action(&self) -> &PendingAction {
        match self {
            EnqueueOutcome::Queued(a) | EnqueueOutcome::Replaced(a) | EnqueueOutcome::Duplicate(a) => a,
        }
    }

    pub fn id(&self) -> &str {
        &self.action().id
    }
}

/// Counts of offline work, for status display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfflineStats {
    pub pending_actions: usize,
    pub unsynced_visits: usize,
    pub unsynced_locations: usize,
    pub cached_items: usize,
    pub failed_actions: usize,
}

/// Parse a string value from the database, returning a rusqlite error on parse failure.
fn parse_db<T: std::str::FromStr>(
    value: &str,
    column: &str,
) -> std::result::Result<T, rusqlite::Error> {
    value.parse().map_err(|_| corrupted(format!("invalid value '{value}' in column '{column}'")))
}

/// Parse an RFC3339 timestamp from the database.
fn parse_timestamp(
    value: &str,
    column: &str,
) -> std::result::Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| corrupted(format!("invalid timestamp '{value}' in column '{column}'")))
}

/// Parse a JSON document from the database.
fn parse_json<T: DeserializeOwned>(
    value: &str,
    column: &str,
) -> std::result::Result<T, rusqlite::Error> {
    serde_json::from_str(value)
        .map_err(|e| corrupted(format!("invalid json in column '{column}': {e}")))
}

fn corrupted(message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        Box::new(Error::CorruptedData(message)),
    )
}

fn to_version(value: Option<i64>) -> Option<u64> {
    value.and_then(|v| u64::try_from(v).ok())
}

fn row_to_action(row: &Row<'_>) -> std::result::Result<PendingAction, rusqlite::Error> {
    let kind_str: String = row.get(2)?;
    let payload_str: String = row.get(5)?;
    let created_str: String = row.get(7)?;
    let attempts: i64 = row.get(8)?;

    Ok(PendingAction {
        seq: row.get(0)?,
        id: row.get(1)?,
        kind: parse_db(&kind_str, "kind")?,
        key: EntityKey::new(row.get::<_, String>(3)?, row.get::<_, String>(4)?),
        payload: parse_json(&payload_str, "payload")?,
        base_version: to_version(row.get(6)?),
        created_at: parse_timestamp(&created_str, "created_at")?,
        attempt_count: u32::try_from(attempts).unwrap_or(u32::MAX),
        last_error: row.get(9)?,
    })
}

fn row_to_cached(row: &Row<'_>) -> std::result::Result<CachedRecord, rusqlite::Error> {
    let version: i64 = row.get(2)?;
    let fields_str: String = row.get(3)?;
    let updated_str: String = row.get(4)?;
    let cached_str: String = row.get(7)?;
    let expires_ms: Option<i64> = row.get(8)?;
    let confirmed_str: Option<String> = row.get(9)?;

    let fields: Map<String, Value> = parse_json(&fields_str, "fields")?;
    let mut record = Record::new(
        EntityKey::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?),
        u64::try_from(version).unwrap_or(0),
        fields,
        parse_timestamp(&updated_str, "updated_at")?,
    );
    record.deleted = row.get(5)?;

    Ok(CachedRecord {
        record,
        dirty: row.get(6)?,
        cached_at: parse_timestamp(&cached_str, "cached_at")?,
        expires_at: expires_ms.and_then(DateTime::from_timestamp_millis),
        confirmed_fields: confirmed_str
            .map(|s| parse_json(&s, "confirmed_fields"))
            .transpose()?,
    })
}

fn row_to_location(row: &Row<'_>) -> std::result::Result<LocationSample, rusqlite::Error> {
    let recorded_str: String = row.get(4)?;
    let mode_str: String = row.get(5)?;
    Ok(LocationSample {
        id: Some(row.get(0)?),
        latitude: row.get(1)?,
        longitude: row.get(2)?,
        accuracy: row.get(3)?,
        recorded_at: parse_timestamp(&recorded_str, "recorded_at")?,
        mode: parse_db(&mode_str, "mode")?,
    })
}

/// Run schema creation on a database connection.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

fn action_id_exists(conn: &Connection, id: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT (SELECT COUNT(*) FROM pending_actions WHERE id = ?1)
              + (SELECT COUNT(*) FROM failed_actions WHERE id = ?1)",
        params![id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn get_action(conn: &Connection, id: &str) -> Result<Option<PendingAction>> {
    let sql = format!("SELECT {PENDING_COLUMNS} FROM pending_actions WHERE id = ?1");
    Ok(conn.query_row(&sql, params![id], row_to_action).optional()?)
}

fn pending_for(conn: &Connection, key: &EntityKey) -> Result<Vec<PendingAction>> {
    let sql = format!(
        "SELECT {PENDING_COLUMNS} FROM pending_actions
         WHERE entity_type = ?1 AND entity_id = ?2 ORDER BY seq"
    );
    let mut stmt = conn.prepare(&sql)?;
    let actions = stmt
        .query_map(params![key.entity_type, key.entity_id], row_to_action)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(actions)
}

fn get_cached(conn: &Connection, key: &EntityKey) -> Result<Option<CachedRecord>> {
    let sql = format!(
        "SELECT {CACHE_COLUMNS} FROM cached_records WHERE entity_type = ?1 AND entity_id = ?2"
    );
    Ok(conn
        .query_row(&sql, params![key.entity_type, key.entity_id], row_to_cached)
        .optional()?)
}

fn write_cached(conn: &Connection, cached: &CachedRecord) -> Result<()> {
    let record = &cached.record;
    conn.execute(
        "INSERT INTO cached_records (entity_type, entity_id, version, fields, updated_at,
             deleted, dirty, cached_at, expires_at_ms, confirmed_fields)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(entity_type, entity_id) DO UPDATE SET
             version = excluded.version,
             fields = excluded.fields,
             updated_at = excluded.updated_at,
             deleted = excluded.deleted,
             dirty = excluded.dirty,
             cached_at = excluded.cached_at,
             expires_at_ms = excluded.expires_at_ms,
             confirmed_fields = excluded.confirmed_fields",
        params![
            record.key.entity_type,
            record.key.entity_id,
            i64::try_from(record.version).unwrap_or(i64::MAX),
            serde_json::to_string(&record.fields)?,
            record.updated_at.to_rfc3339(),
            record.deleted,
            cached.dirty,
            cached.cached_at.to_rfc3339(),
            cached.expires_at.map(|at| at.timestamp_millis()),
            cached
                .confirmed_fields
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
        ],
    )?;
    Ok(())
}

fn remove_cached(conn: &Connection, key: &EntityKey) -> Result<()> {
    conn.execute(
        "DELETE FROM cached_records WHERE entity_type = ?1 AND entity_id = ?2",
        params![key.entity_type, key.entity_id],
    )?;
    Ok(())
}

/// Apply an action to the cached copy of its entity, marking it dirty.
fn apply_optimistic(
    conn: &Connection,
    key: &EntityKey,
    kind: ActionKind,
    payload: &Value,
    at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<()> {
    let (mut record, confirmed_fields) = match get_cached(conn, key)? {
        Some(cached) => (cached.record, cached.confirmed_fields),
        None => (Record::local(key.clone(), at), None),
    };
    record.apply(kind, payload, at);
    write_cached(
        conn,
        &CachedRecord {
            record,
            dirty: true,
            cached_at: now,
            expires_at: None,
            confirmed_fields,
        },
    )
}

fn insert_action(conn: &Connection, action: &PendingAction, explicit_seq: bool) -> Result<i64> {
    let seq = explicit_seq.then_some(action.seq);
    conn.execute(
        "INSERT INTO pending_actions (seq, id, kind, entity_type, entity_id, payload,
             base_version, created_at, attempt_count, last_error)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            seq,
            action.id,
            action.kind.as_str(),
            action.key.entity_type,
            action.key.entity_id,
            serde_json::to_string(&action.payload)?,
            action.base_version.map(|v| i64::try_from(v).unwrap_or(i64::MAX)),
            action.created_at.to_rfc3339(),
            action.attempt_count,
            action.last_error,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn count(conn: &Connection, sql: &str) -> Result<usize> {
    let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
    Ok(usize::try_from(n).unwrap_or(0))
}

/// SQLite connection with local action store operations.
pub struct LocalStore {
    /// The underlying SQLite connection.
    pub conn: Connection,
    clock: Box<dyn ClockSource>,
}

impl LocalStore {
    /// Open a store at the given path, creating it if needed.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )?;

        run_migrations(&conn)?;
        Ok(LocalStore {
            conn,
            clock: Box::new(SystemClock),
        })
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        run_migrations(&conn)?;
        Ok(LocalStore {
            conn,
            clock: Box::new(SystemClock),
        })
    }

    /// Replace the clock used for cache and dead-letter timestamps.
    pub fn with_clock(mut self, clock: impl ClockSource + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Append a mutation to the queue.
    ///
    /// Only the entity's most recent unresolved action is considered for
    /// deduplication, so the relative order of an entity's actions never
    /// changes. The action is applied to the cached copy immediately.
    pub fn enqueue(&mut self, new: NewAction) -> Result<EnqueueOutcome> {
        let now = self.clock.now();
        let tx = self.conn.transaction()?;

        let tail = pending_for(&tx, &new.key)?.pop();
        let outcome = match tail {
            Some(mut tail)
                if tail.kind == new.kind
                    && matches!(new.kind, ActionKind::Create | ActionKind::Delete) =>
            {
                tx.execute(
                    "UPDATE pending_actions
                     SET payload = ?1, attempt_count = 0, last_error = NULL
                     WHERE id = ?2",
                    params![serde_json::to_string(&new.payload)?, tail.id],
                )?;
                tail.payload = new.payload.clone();
                tail.attempt_count = 0;
                tail.last_error = None;
                EnqueueOutcome::Replaced(tail)
            }
            Some(tail) if tail.kind == ActionKind::Update
                && new.kind == ActionKind::Update
                && tail.payload == new.payload =>
            {
                return Ok(EnqueueOutcome::Duplicate(tail));
            }
            _ => {
                let base_version = match new.base_version {
                    Some(v) => Some(v),
                    None => get_cached(&tx, &new.key)?
                        .map(|c| c.record.version)
                        .filter(|v| *v > 0),
                };
                let id = generate_unique_action_id(&new.key, new.kind, &new.created_at, |id| {
                    action_id_exists(&tx, id)
                })?;
                let mut action = PendingAction {
                    id,
                    seq: 0,
                    kind: new.kind,
                    key: new.key.clone(),
                    payload: new.payload.clone(),
                    base_version,
                    created_at: new.created_at,
                    attempt_count: 0,
                    last_error: None,
                };
                action.seq = insert_action(&tx, &action, false)?;
                EnqueueOutcome::Queued(action)
            }
        };

        apply_optimistic(&tx, &new.key, new.kind, &new.payload, new.created_at, now)?;
        tx.commit()?;
        Ok(outcome)
    }

    /// All pending actions in creation order.
    pub fn list(&self) -> Result<Vec<PendingAction>> {
        let sql = format!("SELECT {PENDING_COLUMNS} FROM pending_actions ORDER BY seq");
        let mut stmt = self.conn.prepare(&sql)?;
        let actions = stmt
            .query_map([], row_to_action)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(actions)
    }

    /// Get a pending action by ID.
    pub fn get(&self, id: &str) -> Result<PendingAction> {
        get_action(&self.conn, id)?.ok_or_else(|| Error::ActionNotFound(id.to_string()))
    }

    /// Pending actions for one entity in creation order.
    pub fn pending_for(&self, key: &EntityKey) -> Result<Vec<PendingAction>> {
        pending_for(&self.conn, key)
    }

    pub fn pending_count(&self) -> Result<usize> {
        count(&self.conn, "SELECT COUNT(*) FROM pending_actions")
    }

    /// Remove an action after the remote store confirmed (or superseded) it.
    pub fn mark_resolved(&mut self, id: &str) -> Result<()> {
        let affected = self
            .conn
            .execute("DELETE FROM pending_actions WHERE id = ?1", params![id])?;
        if affected == 0 {
            return Err(Error::ActionNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Record a transient failure. Returns the new attempt count.
    pub fn mark_failed(&mut self, id: &str, error: &str) -> Result<u32> {
        let affected = self.conn.execute(
            "UPDATE pending_actions
             SET attempt_count = attempt_count + 1, last_error = ?1
             WHERE id = ?2",
            params![error, id],
        )?;
        if affected == 0 {
            return Err(Error::ActionNotFound(id.to_string()));
        }
        Ok(self.get(id)?.attempt_count)
    }

    /// Note why an action is held back without counting an attempt.
    pub fn note_error(&mut self, id: &str, error: &str) -> Result<()> {
        let affected = self.conn.execute(
            "UPDATE pending_actions SET last_error = ?1 WHERE id = ?2",
            params![error, id],
        )?;
        if affected == 0 {
            return Err(Error::ActionNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Move an action to the dead-letter table.
    pub fn mark_permanently_failed(&mut self, id: &str, reason: &str) -> Result<FailedAction> {
        let now = self.clock.now();
        let tx = self.conn.transaction()?;

        let mut action = get_action(&tx, id)?.ok_or_else(|| Error::ActionNotFound(id.to_string()))?;
        action.last_error = Some(reason.to_string());

        tx.execute(
            "INSERT INTO failed_actions (id, seq, kind, entity_type, entity_id, payload,
                 base_version, created_at, attempt_count, last_error, failed_at, reason)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                action.id,
                action.seq,
                action.kind.as_str(),
                action.key.entity_type,
                action.key.entity_id,
                serde_json::to_string(&action.payload)?,
                action.base_version.map(|v| i64::try_from(v).unwrap_or(i64::MAX)),
                action.created_at.to_rfc3339(),
                action.attempt_count,
                action.last_error,
                now.to_rfc3339(),
                reason,
            ],
        )?;
        tx.execute("DELETE FROM pending_actions WHERE id = ?1", params![id])?;
        tx.commit()?;

        Ok(FailedAction {
            action,
            failed_at: now,
            reason: reason.to_string(),
        })
    }

    /// Dead-lettered actions in their original creation order.
    pub fn failed_actions(&self) -> Result<Vec<FailedAction>> {
        let sql = format!(
            "SELECT {PENDING_COLUMNS}, failed_at, reason FROM failed_actions ORDER BY seq"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let failed = stmt
            .query_map([], |row| {
                let failed_str: String = row.get(10)?;
                Ok(FailedAction {
                    action: row_to_action(row)?,
                    failed_at: parse_timestamp(&failed_str, "failed_at")?,
                    reason: row.get(11)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(failed)
    }

    /// Move a dead-lettered action back into the queue at its original position.
    pub fn requeue_failed(&mut self, id: &str) -> Result<PendingAction> {
        let now = self.clock.now();
        let tx = self.conn.transaction()?;

        let sql = format!("SELECT {PENDING_COLUMNS} FROM failed_actions WHERE id = ?1");
        let mut action = tx
            .query_row(&sql, params![id], row_to_action)
            .optional()?
            .ok_or_else(|| Error::FailedActionNotFound(id.to_string()))?;
        action.attempt_count = 0;
        action.last_error = None;

        insert_action(&tx, &action, true)?;
        tx.execute("DELETE FROM failed_actions WHERE id = ?1", params![id])?;
        apply_optimistic(&tx, &action.key, action.kind, &action.payload, action.created_at, now)?;
        tx.commit()?;

        Ok(action)
    }

    /// Requeue every dead-lettered action. Returns how many were moved.
    pub fn requeue_all_failed(&mut self) -> Result<usize> {
        let ids: Vec<String> = self
            .failed_actions()?
            .into_iter()
            .map(|f| f.action.id)
            .collect();
        for id in &ids {
            self.requeue_failed(id)?;
        }
        Ok(ids.len())
    }

    /// Point an entity's remaining actions at a newly confirmed version.
    pub fn rebase_pending(&mut self, key: &EntityKey, version: u64) -> Result<usize> {
        let affected = self.conn.execute(
            "UPDATE pending_actions SET base_version = ?1
             WHERE entity_type = ?2 AND entity_id = ?3",
            params![
                i64::try_from(version).unwrap_or(i64::MAX),
                key.entity_type,
                key.entity_id
            ],
        )?;
        Ok(affected)
    }

    /// Get the cached copy of an entity. Clean entries past their expiry
    /// read as misses even before cleanup removes them.
    pub fn cache_get(&self, key: &EntityKey) -> Result<Option<CachedRecord>> {
        let now = self.clock.now();
        Ok(get_cached(&self.conn, key)?.filter(|cached| !cached.is_expired(now)))
    }

    /// Store a clean record in the cache, optionally expiring after `ttl`.
    pub fn cache_put(&mut self, record: &Record, ttl: Option<Duration>) -> Result<()> {
        let now = self.clock.now();
        write_cached(
            &self.conn,
            &CachedRecord {
                record: record.clone(),
                dirty: false,
                cached_at: now,
                expires_at: ttl.map(|ttl| now + ttl),
                confirmed_fields: Some(record.fields.clone()),
            },
        )
    }

    /// Adopt authoritative state for an entity.
    ///
    /// The entity's remaining pending actions are re-applied on top, so the
    /// cache keeps showing local changes that have not been confirmed yet.
    /// A deleted record with no pending actions is dropped from the cache.
    pub fn cache_commit(&mut self, record: &Record, ttl: Option<Duration>) -> Result<Option<CachedRecord>> {
        let now = self.clock.now();
        let tx = self.conn.transaction()?;

        let pending = pending_for(&tx, &record.key)?;
        let cached = if pending.is_empty() {
            if record.deleted {
                remove_cached(&tx, &record.key)?;
                None
            } else {
                Some(CachedRecord {
                    record: record.clone(),
                    dirty: false,
                    cached_at: now,
                    expires_at: ttl.map(|ttl| now + ttl),
                    confirmed_fields: Some(record.fields.clone()),
                })
            }
        } else {
            let mut merged = record.clone();
            for action in &pending {
                merged.apply(action.kind, &action.payload, action.created_at);
            }
            Some(CachedRecord {
                record: merged,
                dirty: true,
                cached_at: now,
                expires_at: None,
                confirmed_fields: Some(record.fields.clone()),
            })
        };

        if let Some(cached) = &cached {
            write_cached(&tx, cached)?;
        }
        tx.commit()?;
        Ok(cached)
    }

    pub fn cache_remove(&mut self, key: &EntityKey) -> Result<()> {
        remove_cached(&self.conn, key)
    }

    /// Drop clean cache entries past their expiry. Returns how many were removed.
    pub fn clean_expired_cache(&mut self) -> Result<usize> {
        let now = self.clock.now();
        let removed = self.conn.execute(
            "DELETE FROM cached_records
             WHERE dirty = 0 AND expires_at_ms IS NOT NULL AND expires_at_ms <= ?1",
            params![now.timestamp_millis()],
        )?;
        Ok(removed)
    }

    /// Store a location sample. Returns its row id.
    pub fn record_location(&mut self, sample: &LocationSample) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO location_samples (latitude, longitude, accuracy, recorded_at, mode)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                sample.latitude,
                sample.longitude,
                sample.accuracy,
                sample.recorded_at.to_rfc3339(),
                sample.mode.as_str(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Oldest unsynced location samples, up to `limit`.
    pub fn unsynced_locations(&self, limit: usize) -> Result<Vec<LocationSample>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, latitude, longitude, accuracy, recorded_at, mode
             FROM location_samples WHERE synced = 0 ORDER BY id LIMIT ?1",
        )?;
        let samples = stmt
            .query_map(params![i64::try_from(limit).unwrap_or(i64::MAX)], row_to_location)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(samples)
    }

    /// Flag samples as uploaded. Returns how many rows changed.
    pub fn mark_locations_synced(&mut self, ids: &[i64]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let mut changed = 0;
        {
            let mut stmt = tx.prepare("UPDATE location_samples SET synced = 1 WHERE id = ?1")?;
            for id in ids {
                changed += stmt.execute(params![id])?;
            }
        }
        tx.commit()?;
        Ok(changed)
    }

    /// Read a JSON value from app state.
    pub fn get_state<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let value: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM app_state WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        match value {
            Some(v) => Ok(Some(serde_json::from_str(&v)?)),
            None => Ok(None),
        }
    }

    /// Write a JSON value to app state.
    pub fn set_state<T: Serialize>(&mut self, key: &str, value: &T) -> Result<()> {
        self.conn.execute(
            "INSERT INTO app_state (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, serde_json::to_string(value)?, self.clock.now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Counts of offline work.
    pub fn stats(&self) -> Result<OfflineStats> {
        let unsynced_visits: i64 = self.conn.query_row(
            "SELECT COUNT(DISTINCT entity_id) FROM pending_actions WHERE entity_type = ?1",
            params![VISIT_ENTITY_TYPE],
            |row| row.get(0),
        )?;
        Ok(OfflineStats {
            pending_actions: self.pending_count()?,
            unsynced_visits: usize::try_from(unsynced_visits).unwrap_or(0),
            unsynced_locations: count(
                &self.conn,
                "SELECT COUNT(*) FROM location_samples WHERE synced = 0",
            )?,
            cached_items: count(&self.conn, "SELECT COUNT(*) FROM cached_records")?,
            failed_actions: count(&self.conn, "SELECT COUNT(*) FROM failed_actions")?,
        })
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
