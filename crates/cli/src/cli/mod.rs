// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use clap::{Parser, Subcommand, ValueEnum};
use fieldops_core::{ActionKind, ConflictResolution};

use crate::realtime::DEFAULT_SCHEMA;

/// Parse a string that must not be empty or whitespace-only.
fn non_empty_string(s: &str) -> Result<String, String> {
    if s.trim().is_empty() {
        Err("cannot be empty".to_string())
    } else {
        Ok(s.to_string())
    }
}

/// Parse any `FromStr` type, keeping the first line of its error as the message.
fn parse_value<T>(s: &str) -> Result<T, String>
where
    T: FromStr,
    T::Err: Display,
{
    s.parse::<T>().map_err(|e| {
        let message = e.to_string();
        message.lines().next().unwrap_or_default().to_string()
    })
}

/// Output format for commands supporting structured output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "fieldops")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Offline-first field client: local action queue, sync and realtime changes")]
#[command(
    long_about = "Offline-first field client.\n\n\
    Inspect and edit the local action queue, requeue dead-lettered actions, \
    preview battery-aware tracking modes and follow realtime table changes."
)]
pub struct Cli {
    /// Config file (default: fieldops.toml in the platform config directory)
    #[arg(long, global = true, value_name = "path")]
    pub config: Option<PathBuf>,

    /// Local store file, overrides store_path from the config
    #[arg(long, global = true, value_name = "path")]
    pub store: Option<PathBuf>,

    /// Log debug detail to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show counts of offline work
    Stats {
        #[arg(long, short, value_enum, default_value = "text")]
        output: OutputFormat,
    },

    /// List pending actions in the order they will sync
    #[command(after_help = "\
Examples:
  fieldops list               Pending actions
  fieldops list --failed      Dead-lettered actions with their failure reason
  fieldops list -o json       Pending actions as JSON")]
    List {
        /// List dead-lettered actions instead
        #[arg(long)]
        failed: bool,

        #[arg(long, short, value_enum, default_value = "text")]
        output: OutputFormat,
    },

    /// Queue a mutation for the next sync
    #[command(after_help = "\
Examples:
  fieldops enqueue create site_visit v-1 --payload '{\"status\":\"scheduled\"}'
  fieldops enqueue update site_visit v-1 --payload '{\"status\":\"in_progress\"}'
  fieldops enqueue delete site_visit v-1")]
    Enqueue {
        /// Action kind (create, update, delete)
        #[arg(value_parser = parse_value::<ActionKind>)]
        kind: ActionKind,

        /// Entity type, e.g. site_visit
        #[arg(value_parser = non_empty_string)]
        entity_type: String,

        /// Entity id
        #[arg(value_parser = non_empty_string)]
        entity_id: String,

        /// Fields as a JSON object (required for create and update)
        #[arg(long, short)]
        payload: Option<String>,

        /// Remote version the change was built on
        #[arg(long, value_name = "version")]
        base_version: Option<u64>,

        #[arg(long, short, value_enum, default_value = "text")]
        output: OutputFormat,
    },

    /// Move dead-lettered actions back into the queue
    Retry {
        /// Action id to requeue
        id: Option<String>,

        /// Requeue every dead-lettered action
        #[arg(long, conflicts_with = "id")]
        all: bool,
    },

    /// Drop expired entries from the read cache
    CleanCache,

    /// Show the tracking mode derived from a battery level
    #[command(after_help = "\
Examples:
  fieldops mode 85            High accuracy tracking
  fieldops mode 15            Power saver tracking
  fieldops mode 5 --charging  Charging always tracks at high accuracy")]
    Mode {
        /// Battery level in percent
        #[arg(value_parser = clap::value_parser!(u8).range(0..=100))]
        level: u8,

        /// The device is charging
        #[arg(long)]
        charging: bool,

        /// Estimate battery drain over this many hours
        #[arg(long, default_value_t = 8.0)]
        hours: f64,

        #[arg(long, short, value_enum, default_value = "text")]
        output: OutputFormat,
    },

    /// Show or set the conflict resolution policy
    ConflictPolicy {
        /// New policy (client_wins, server_wins, merge, manual)
        #[arg(value_parser = parse_value::<ConflictResolution>)]
        policy: Option<ConflictResolution>,
    },

    /// Follow realtime changes to a table until interrupted
    #[command(after_help = "\
Examples:
  fieldops watch site_visits
  fieldops watch site_visits --event update
  fieldops watch site_visits --filter agent_id=eq.a-7")]
    Watch {
        /// Table to follow
        #[arg(value_parser = non_empty_string)]
        table: String,

        #[arg(long, default_value = DEFAULT_SCHEMA)]
        schema: String,

        /// Event type (insert, update, delete, *)
        #[arg(long, default_value = "*")]
        event: String,

        /// Row filter, column=eq.value
        #[arg(long)]
        filter: Option<String>,
    },
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
