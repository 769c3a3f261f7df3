// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Battery status, modes and the per-mode sampling configuration.

use std::time::Duration;

use fieldops_core::BatteryMode;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Battery level and charging state as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatteryStatus {
    /// Charge level, 0 to 100.
    pub level: u8,
    pub is_charging: bool,
}

impl BatteryStatus {
    pub fn new(level: u8, is_charging: bool) -> Self {
        BatteryStatus {
            level: level.min(100),
            is_charging,
        }
    }
}

/// Level boundaries between modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeThresholds {
    /// At or above: high accuracy.
    pub high: u8,
    /// At or above: balanced.
    pub medium: u8,
    /// At or above: power saver. Below: ultra saver.
    pub low: u8,
}

impl Default for ModeThresholds {
    fn default() -> Self {
        ModeThresholds {
            high: 80,
            medium: 50,
            low: 10,
        }
    }
}

/// Derive the sampling mode from battery state.
pub fn mode_for(status: BatteryStatus, thresholds: ModeThresholds) -> BatteryMode {
    if status.is_charging || status.level >= thresholds.high {
        BatteryMode::HighAccuracy
    } else if status.level >= thresholds.medium {
        BatteryMode::Balanced
    } else if status.level >= thresholds.low {
        BatteryMode::PowerSaver
    } else {
        BatteryMode::UltraSaver
    }
}

/// How the platform should be polled in a given mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationConfig {
    pub poll_interval: Duration,
    /// Accuracy radius we ask for, in meters.
    pub desired_accuracy_m: f64,
    pub high_accuracy: bool,
    /// Oldest cached platform fix we accept.
    pub maximum_age: Duration,
    /// Bound on a single platform request.
    pub timeout: Duration,
    /// Samples closer than this to the previous one are dropped.
    pub min_displacement_m: f64,
}

pub fn config_for(mode: BatteryMode) -> LocationConfig {
    match mode {
        BatteryMode::HighAccuracy => LocationConfig {
            poll_interval: Duration::from_secs(5),
            desired_accuracy_m: 10.0,
            high_accuracy: true,
            maximum_age: Duration::ZERO,
            timeout: Duration::from_secs(10),
            min_displacement_m: 5.0,
        },
        BatteryMode::Balanced => LocationConfig {
            poll_interval: Duration::from_secs(15),
            desired_accuracy_m: 25.0,
            high_accuracy: true,
            maximum_age: Duration::from_secs(10),
            timeout: Duration::from_secs(15),
            min_displacement_m: 10.0,
        },
        BatteryMode::PowerSaver => LocationConfig {
            poll_interval: Duration::from_secs(30),
            desired_accuracy_m: 100.0,
            high_accuracy: false,
            maximum_age: Duration::from_secs(30),
            timeout: Duration::from_secs(30),
            min_displacement_m: 25.0,
        },
        BatteryMode::UltraSaver => LocationConfig {
            poll_interval: Duration::from_secs(60),
            desired_accuracy_m: 500.0,
            high_accuracy: false,
            maximum_age: Duration::from_secs(60),
            timeout: Duration::from_secs(60),
            min_displacement_m: 50.0,
        },
    }
}

pub fn mode_description(mode: BatteryMode) -> &'static str {
    match mode {
        BatteryMode::HighAccuracy => "GPS accuracy, frequent updates",
        BatteryMode::Balanced => "good accuracy, moderate battery use",
        BatteryMode::PowerSaver => "reduced accuracy, extended battery life",
        BatteryMode::UltraSaver => "minimal tracking, maximum battery life",
    }
}

/// Rough battery drain in percent for tracking `hours` in `mode`.
pub fn estimated_battery_usage(mode: BatteryMode, hours: f64) -> f64 {
    let per_hour = match mode {
        BatteryMode::HighAccuracy => 8.0,
        BatteryMode::Balanced => 4.0,
        BatteryMode::PowerSaver => 2.0,
        BatteryMode::UltraSaver => 1.0,
    };
    per_hour * hours
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum BatteryError {
    #[error("battery status unavailable: {0}")]
    Unavailable(String),
}

/// Platform battery primitive.
pub trait BatteryAdapter: Send + Sync + 'static {
    /// Read the current status.
    fn status(&self) -> BoxFuture<'_, Result<BatteryStatus, BatteryError>>;

    /// Subscribe to status changes.
    fn subscribe(&self) -> watch::Receiver<BatteryStatus>;
}

/// Battery adapter fed by the host, for platforms that push battery state
/// rather than answer queries.
#[derive(Debug)]
pub struct ManualBattery {
    tx: watch::Sender<BatteryStatus>,
}

impl ManualBattery {
    pub fn new(status: BatteryStatus) -> Self {
        let (tx, _rx) = watch::channel(status);
        ManualBattery { tx }
    }

    pub fn set(&self, status: BatteryStatus) {
        self.tx.send_replace(status);
    }
}

impl BatteryAdapter for ManualBattery {
    fn status(&self) -> BoxFuture<'_, Result<BatteryStatus, BatteryError>> {
        let status = *self.tx.borrow();
        Box::pin(async move { Ok(status) })
    }

    fn subscribe(&self) -> watch::Receiver<BatteryStatus> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
#[path = "battery_tests.rs"]
mod tests;
