// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Health bookkeeping for realtime channels.
//!
//! The monitor only observes: the realtime driver reports every status
//! transition and every delivered change, and the monitor keeps counters
//! and timestamps for display. Listeners are plain callbacks invoked after
//! each update with a snapshot of the state, never while a lock is held, so
//! a listener may call back into the monitor.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

/// Lifecycle status of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    Connecting,
    Connected,
    Disconnected,
    Error,
    Reconnecting,
}

impl ChannelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelStatus::Connecting => "connecting",
            ChannelStatus::Connected => "connected",
            ChannelStatus::Disconnected => "disconnected",
            ChannelStatus::Error => "error",
            ChannelStatus::Reconnecting => "reconnecting",
        }
    }
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelHealth {
    pub name: String,
    pub status: ChannelStatus,
    pub last_connected: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
    pub error_count: u32,
    pub retry_count: u32,
    pub event_count: u64,
}

impl ChannelHealth {
    fn new(name: &str) -> Self {
        ChannelHealth {
            name: name.to_string(),
            status: ChannelStatus::Connecting,
            last_connected: None,
            last_error: None,
            last_error_at: None,
            error_count: 0,
            retry_count: 0,
            event_count: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthState {
    pub is_online: bool,
    pub channels: BTreeMap<String, ChannelHealth>,
    pub total_events: u64,
    pub last_activity: Option<DateTime<Utc>>,
    /// Reconnect attempts since the last successful connection.
    pub connection_attempts: u32,
    pub max_retries_reached: bool,
}

impl HealthState {
    fn new(is_online: bool) -> Self {
        HealthState {
            is_online,
            channels: BTreeMap::new(),
            total_events: 0,
            last_activity: None,
            connection_attempts: 0,
            max_retries_reached: false,
        }
    }
}

/// Aggregates over all channels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthMetrics {
    pub channel_count: usize,
    pub connected_channels: usize,
    pub error_channels: usize,
    pub total_retries: u32,
    pub total_events: u64,
    pub uptime: Duration,
    /// Most recently recorded channel error.
    pub last_error: Option<String>,
}

pub type HealthListener = Arc<dyn Fn(&HealthState) + Send + Sync>;

struct Inner {
    state: HealthState,
    started: Instant,
}

pub struct HealthMonitor {
    inner: Mutex<Inner>,
    listeners: Mutex<Vec<(u64, HealthListener)>>,
    next_listener: AtomicU64,
}

impl HealthMonitor {
    pub fn new(is_online: bool) -> Self {
        HealthMonitor {
            inner: Mutex::new(Inner {
                state: HealthState::new(is_online),
                started: Instant::now(),
            }),
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn listeners(&self) -> Vec<HealthListener> {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }

    /// Apply `f` to the state, then notify listeners with the result.
    fn update(&self, f: impl FnOnce(&mut HealthState)) {
        let snapshot = {
            let mut inner = self.lock();
            f(&mut inner.state);
            inner.state.clone()
        };
        for listener in self.listeners() {
            listener(&snapshot);
        }
    }

    /// Start tracking a channel. No-op if it is already tracked.
    pub fn register_channel(&self, name: &str) {
        if self.lock().state.channels.contains_key(name) {
            return;
        }
        debug!(channel = name, "channel registered");
        self.update(|state| {
            state
                .channels
                .entry(name.to_string())
                .or_insert_with(|| ChannelHealth::new(name));
        });
    }

    pub fn unregister_channel(&self, name: &str) {
        debug!(channel = name, "channel unregistered");
        self.update(|state| {
            state.channels.remove(name);
        });
    }

    /// Record a status transition, registering the channel if needed.
    pub fn update_channel_status(&self, name: &str, status: ChannelStatus, error: Option<&str>) {
        let now = Utc::now();
        self.update(|state| {
            let channel = state
                .channels
                .entry(name.to_string())
                .or_insert_with(|| ChannelHealth::new(name));
            channel.status = status;
            match status {
                ChannelStatus::Connected => {
                    channel.last_connected = Some(now);
                    channel.retry_count = 0;
                    state.connection_attempts = 0;
                }
                ChannelStatus::Error | ChannelStatus::Disconnected => {
                    channel.error_count += 1;
                    if let Some(error) = error {
                        channel.last_error = Some(error.to_string());
                        channel.last_error_at = Some(now);
                    }
                }
                ChannelStatus::Reconnecting => {
                    channel.retry_count += 1;
                    state.connection_attempts += 1;
                }
                ChannelStatus::Connecting => {}
            }
        });
    }

    /// Count a delivered change.
    pub fn record_event(&self, name: &str) {
        let now = Utc::now();
        self.update(|state| {
            if let Some(channel) = state.channels.get_mut(name) {
                channel.event_count += 1;
            }
            state.total_events += 1;
            state.last_activity = Some(now);
        });
    }

    pub fn set_online(&self, online: bool) {
        self.update(|state| state.is_online = online);
    }

    pub fn set_max_retries_reached(&self, reached: bool) {
        self.update(|state| state.max_retries_reached = reached);
    }

    /// Zero every channel's retry counter and the connection attempts.
    /// Channels, events and errors are kept.
    pub fn clear_retries(&self) {
        self.update(|state| {
            for channel in state.channels.values_mut() {
                channel.retry_count = 0;
            }
            state.connection_attempts = 0;
            state.max_retries_reached = false;
        });
    }

    pub fn get_state(&self) -> HealthState {
        self.lock().state.clone()
    }

    pub fn get_metrics(&self) -> HealthMetrics {
        let inner = self.lock();
        let channels = inner.state.channels.values();
        let last_error = channels
            .clone()
            .filter(|c| c.last_error.is_some())
            .max_by_key(|c| c.last_error_at)
            .and_then(|c| c.last_error.clone());
        HealthMetrics {
            channel_count: inner.state.channels.len(),
            connected_channels: channels
                .clone()
                .filter(|c| c.status == ChannelStatus::Connected)
                .count(),
            error_channels: channels
                .clone()
                .filter(|c| c.status == ChannelStatus::Error)
                .count(),
            total_retries: channels.clone().map(|c| c.retry_count).sum(),
            total_events: inner.state.total_events,
            uptime: inner.started.elapsed(),
            last_error,
        }
    }

    /// Register a listener. It is called once right away with the current
    /// state, then after every update.
    pub fn subscribe(&self, listener: impl Fn(&HealthState) + Send + Sync + 'static) -> u64 {
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        let listener: HealthListener = Arc::new(listener);
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::clone(&listener)));
        let snapshot = self.get_state();
        listener(&snapshot);
        id
    }

    /// Remove a listener. Returns false if the id was unknown.
    pub fn unsubscribe(&self, id: u64) -> bool {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    /// Forget all channels and counters and restart the uptime clock.
    /// Online status and listeners are kept.
    pub fn reset(&self) {
        let snapshot = {
            let mut inner = self.lock();
            inner.state = HealthState::new(inner.state.is_online);
            inner.started = Instant::now();
            inner.state.clone()
        };
        for listener in self.listeners() {
            listener(&snapshot);
        }
    }
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
#[path = "health_tests.rs"]
mod tests;
