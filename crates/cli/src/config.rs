// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Client configuration.
//!
//! Configuration is read from `fieldops.toml` and includes:
//! - `store_path`: location of the local SQLite store
//! - `[sync]`: retry limits, auto-sync cadence and the conflict policy
//! - `[realtime]`: change-stream endpoint, reconnect backoff and heartbeats
//! - `[location]`: battery thresholds between tracking modes
//! - `[status]`: status facade refresh timings
//! - `[cache]`: lifetime of cached read data
//!
//! Every field has a default, so an absent file or section is valid.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fieldops_core::ConflictResolution;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::location::ModeThresholds;

pub const CONFIG_FILE_NAME: &str = "fieldops.toml";
const DATA_DIR_NAME: &str = "fieldops";
const STORE_FILE_NAME: &str = "offline.db";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Path of the local store. Defaults to the platform data directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_path: Option<PathBuf>,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
    #[serde(default)]
    pub location: TrackingConfig,
    #[serde(default)]
    pub status: StatusConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Sync manager settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Transient failures tolerated before an action is dead-lettered (default: 5).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Periodic sync while online, in seconds (default: 30). 0 = disabled.
    #[serde(default = "default_auto_sync_interval_secs")]
    pub auto_sync_interval_secs: u64,
    /// Delay after coming online before syncing, in milliseconds (default: 2000).
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// First retry delay after a run that deferred work (default: 1000).
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
    /// Retry delay cap (default: 60000).
    #[serde(default = "default_retry_max_ms")]
    pub retry_max_ms: u64,
    /// Location samples per upload (default: 500).
    #[serde(default = "default_location_batch_size")]
    pub location_batch_size: usize,
    /// Initial conflict policy, used until one is persisted (default: merge).
    #[serde(default)]
    pub conflict_resolution: ConflictResolution,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_auto_sync_interval_secs() -> u64 {
    30
}

fn default_debounce_ms() -> u64 {
    2_000
}

fn default_retry_base_ms() -> u64 {
    1_000
}

fn default_retry_max_ms() -> u64 {
    60_000
}

fn default_location_batch_size() -> usize {
    500
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            max_attempts: default_max_attempts(),
            auto_sync_interval_secs: default_auto_sync_interval_secs(),
            debounce_ms: default_debounce_ms(),
            retry_base_ms: default_retry_base_ms(),
            retry_max_ms: default_retry_max_ms(),
            location_batch_size: default_location_batch_size(),
            conflict_resolution: ConflictResolution::default(),
        }
    }
}

impl SyncConfig {
    pub fn auto_sync_interval(&self) -> Option<Duration> {
        (self.auto_sync_interval_secs > 0).then(|| Duration::from_secs(self.auto_sync_interval_secs))
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Retry delay after `failures` consecutive runs that deferred work.
    pub fn retry_delay(&self, failures: u32) -> Duration {
        let factor = 2u64.saturating_pow(failures.min(32));
        let ms = self.retry_base_ms.saturating_mul(factor).min(self.retry_max_ms);
        Duration::from_millis(ms)
    }
}

/// Change-stream settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// WebSocket endpoint.
    #[serde(default = "default_realtime_url")]
    pub url: String,
    /// Consecutive failures before a channel gives up (default: 5).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// First reconnect delay in milliseconds (default: 2000).
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Reconnect delay cap in milliseconds (default: 30000).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Upper bound of the random jitter added to each delay (default: 1000).
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
    /// Time allowed for a join to be acknowledged (default: 10000).
    #[serde(default = "default_join_timeout_ms")]
    pub join_timeout_ms: u64,
    /// Heartbeat interval in milliseconds (default: 30000). 0 = disabled.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Max time to wait for a heartbeat ack in milliseconds (default: 10000).
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,
}

fn default_realtime_url() -> String {
    "ws://localhost:4000/realtime".to_string()
}

fn default_max_retries() -> u32 {
    5
}

fn default_initial_delay_ms() -> u64 {
    2_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_jitter_ms() -> u64 {
    1_000
}

fn default_join_timeout_ms() -> u64 {
    10_000
}

fn default_heartbeat_interval_ms() -> u64 {
    30_000
}

fn default_heartbeat_timeout_ms() -> u64 {
    10_000
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        RealtimeConfig {
            url: default_realtime_url(),
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_ms: default_jitter_ms(),
            join_timeout_ms: default_join_timeout_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
        }
    }
}

/// Battery thresholds for the location tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingConfig {
    #[serde(default = "default_high_threshold")]
    pub high_threshold: u8,
    #[serde(default = "default_medium_threshold")]
    pub medium_threshold: u8,
    #[serde(default = "default_low_threshold")]
    pub low_threshold: u8,
}

fn default_high_threshold() -> u8 {
    80
}

fn default_medium_threshold() -> u8 {
    50
}

fn default_low_threshold() -> u8 {
    10
}

impl Default for TrackingConfig {
    fn default() -> Self {
        TrackingConfig {
            high_threshold: default_high_threshold(),
            medium_threshold: default_medium_threshold(),
            low_threshold: default_low_threshold(),
        }
    }
}

impl TrackingConfig {
    pub fn thresholds(&self) -> ModeThresholds {
        ModeThresholds {
            high: self.high_threshold,
            medium: self.medium_threshold,
            low: self.low_threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusConfig {
    /// Stats refresh period in seconds (default: 10).
    #[serde(default = "default_stats_refresh_secs")]
    pub stats_refresh_secs: u64,
    /// How long `just_came_online` stays set (default: 5).
    #[serde(default = "default_online_notice_secs")]
    pub online_notice_secs: u64,
}

fn default_stats_refresh_secs() -> u64 {
    10
}

fn default_online_notice_secs() -> u64 {
    5
}

impl Default for StatusConfig {
    fn default() -> Self {
        StatusConfig {
            stats_refresh_secs: default_stats_refresh_secs(),
            online_notice_secs: default_online_notice_secs(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Lifetime of clean cached records in minutes (default: 60). 0 = never expire.
    #[serde(default = "default_ttl_minutes")]
    pub ttl_minutes: u64,
}

fn default_ttl_minutes() -> u64 {
    60
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            ttl_minutes: default_ttl_minutes(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Option<chrono::Duration> {
        if self.ttl_minutes == 0 {
            return None;
        }
        i64::try_from(self.ttl_minutes)
            .ok()
            .and_then(chrono::Duration::try_minutes)
    }
}

impl Config {
    /// Loads configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {}", path.display(), e)))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the file if it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Config::load(path)
        } else {
            Ok(Config::default())
        }
    }

    /// Saves configuration as TOML.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("failed to serialize config: {}", e)))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Rejects settings the runtime cannot work with.
    pub fn validate(&self) -> Result<()> {
        let t = &self.location;
        if !(t.low_threshold <= t.medium_threshold && t.medium_threshold <= t.high_threshold) {
            return Err(Error::Config(format!(
                "location thresholds must satisfy low <= medium <= high (got {}, {}, {})",
                t.low_threshold, t.medium_threshold, t.high_threshold
            )));
        }
        if t.high_threshold > 100 {
            return Err(Error::Config("location thresholds must be at most 100".to_string()));
        }
        if self.sync.max_attempts == 0 {
            return Err(Error::Config("sync.max_attempts must be at least 1".to_string()));
        }
        if self.sync.location_batch_size == 0 {
            return Err(Error::Config(
                "sync.location_batch_size must be at least 1".to_string(),
            ));
        }
        if !(self.realtime.url.starts_with("ws://") || self.realtime.url.starts_with("wss://")) {
            return Err(Error::Config(format!(
                "invalid realtime url '{}': must be ws:// or wss://",
                self.realtime.url
            )));
        }
        Ok(())
    }

    /// Resolved store path.
    pub fn store_path(&self) -> PathBuf {
        match &self.store_path {
            Some(path) => path.clone(),
            None => default_data_dir().join(STORE_FILE_NAME),
        }
    }
}

/// Platform data directory for fieldops files.
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DATA_DIR_NAME)
}

/// Default location of the config file.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DATA_DIR_NAME)
        .join(CONFIG_FILE_NAME)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
