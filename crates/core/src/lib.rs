// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! fieldops-core: Shared library for the fieldops offline-first client
//!
//! This crate provides the data model, the SQLite-backed local action store,
//! field-level merge and the change-stream wire protocol used by the sync
//! and realtime layers of the `fieldops` crate.

pub mod action;
pub mod clock;
pub mod error;
pub mod id;
pub mod location;
pub mod merge;
pub mod policy;
pub mod protocol;
pub mod record;
pub mod store;

pub use action::{ActionKind, EntityKey, FailedAction, NewAction, PendingAction};
pub use clock::{ClockSource, SystemClock};
pub use error::{Error, Result};
pub use location::{BatteryMode, LocationSample};
pub use policy::ConflictResolution;
pub use record::{CachedRecord, Record};
pub use store::{EnqueueOutcome, LocalStore, OfflineStats};
