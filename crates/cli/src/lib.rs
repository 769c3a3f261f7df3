// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! fieldops - An offline-first field client library.
//!
//! This crate builds the client services on top of the local action store
//! in `fieldops-core` and provides the `fieldops` CLI.
//!
//! # Main Components
//!
//! - [`SyncManager`](sync::SyncManager) - drains the local queue against a [`RemoteStore`](sync::RemoteStore)
//! - [`AutoSync`](sync::AutoSync) - syncs on reconnect, periodically and on retry
//! - [`RealtimeManager`](realtime::RealtimeManager) - shared change-stream channels with reconnect backoff
//! - [`HealthMonitor`](realtime::HealthMonitor) - per-channel connection health
//! - [`BatteryAwareLocationTracker`](location::BatteryAwareLocationTracker) - battery-aware position sampling
//! - [`NetworkMonitor`](network::NetworkMonitor) - the online/offline signal
//! - [`SyncStatus`](status::SyncStatus) - one observable view of all of the above
//!
//! # Wiring
//!
//! ```rust,ignore
//! use fieldops::{network::NetworkMonitor, sync::{AutoSync, SyncManager}, SharedStore};
//!
//! let store: SharedStore = Arc::new(Mutex::new(LocalStore::open(&config.store_path())?));
//! let network = NetworkMonitor::new(true);
//! let manager = Arc::new(SyncManager::new(store, remote, network.clone(), config.sync.clone()).await?);
//! let auto = AutoSync::spawn(Arc::clone(&manager), &config.sync);
//! ```

mod cli;
mod commands;

pub mod config;
pub mod error;
pub mod location;
pub mod network;
pub mod realtime;
pub mod status;
pub mod sync;

use std::sync::Arc;

use fieldops_core::LocalStore;

pub use cli::{Cli, Command, OutputFormat};
pub use config::Config;
pub use error::{Error, Result};

use commands::enqueue::EnqueueArgs;
use commands::Context;

/// The local store shared between async services.
pub type SharedStore = Arc<tokio::sync::Mutex<LocalStore>>;

pub fn run(cli: Cli) -> Result<()> {
    let ctx = Context::load(cli.config.as_deref(), cli.store.as_deref())?;
    match cli.command {
        Command::Stats { output } => commands::stats::run(&ctx, output),
        Command::List { failed, output } => commands::list::run(&ctx, failed, output),
        Command::Enqueue {
            kind,
            entity_type,
            entity_id,
            payload,
            base_version,
            output,
        } => commands::enqueue::run(
            &ctx,
            EnqueueArgs {
                kind,
                entity_type: &entity_type,
                entity_id: &entity_id,
                payload: payload.as_deref(),
                base_version,
                output,
            },
        ),
        Command::Retry { id, all } => commands::retry::run(&ctx, id.as_deref(), all),
        Command::CleanCache => commands::clean_cache::run(&ctx),
        Command::Mode {
            level,
            charging,
            hours,
            output,
        } => commands::mode::run(&ctx, level, charging, hours, output),
        Command::ConflictPolicy { policy } => commands::policy::run(&ctx, policy),
        Command::Watch {
            table,
            schema,
            event,
            filter,
        } => commands::watch::run(&ctx, &table, &schema, &event, filter.as_deref()),
    }
}
