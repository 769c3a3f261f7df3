// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Location samples and the battery modes they were taken under.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Power profile for location sampling, from most to least accurate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatteryMode {
    HighAccuracy,
    Balanced,
    PowerSaver,
    UltraSaver,
}

impl BatteryMode {
    /// All modes, most accurate first.
    pub const ALL: [BatteryMode; 4] = [
        BatteryMode::HighAccuracy,
        BatteryMode::Balanced,
        BatteryMode::PowerSaver,
        BatteryMode::UltraSaver,
    ];

    /// Returns the string representation used in storage and display.
    pub fn as_str(&self) -> &'static str {
        match self {
            BatteryMode::HighAccuracy => "high_accuracy",
            BatteryMode::Balanced => "balanced",
            BatteryMode::PowerSaver => "power_saver",
            BatteryMode::UltraSaver => "ultra_saver",
        }
    }
}

impl fmt::Display for BatteryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BatteryMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "high_accuracy" => Ok(BatteryMode::HighAccuracy),
            "balanced" => Ok(BatteryMode::Balanced),
            "power_saver" => Ok(BatteryMode::PowerSaver),
            "ultra_saver" => Ok(BatteryMode::UltraSaver),
            _ => Err(Error::InvalidMode(s.to_string())),
        }
    }
}

/// One recorded position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    /// Row id, assigned when the sample is stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub latitude: f64,
    pub longitude: f64,
    /// Accuracy radius in meters.
    pub accuracy: f64,
    pub recorded_at: DateTime<Utc>,
    pub mode: BatteryMode,
}

impl LocationSample {
    pub fn new(
        latitude: f64,
        longitude: f64,
        accuracy: f64,
        recorded_at: DateTime<Utc>,
        mode: BatteryMode,
    ) -> Self {
        LocationSample {
            id: None,
            latitude,
            longitude,
            accuracy,
            recorded_at,
            mode,
        }
    }
}

#[cfg(test)]
#[path = "location_tests.rs"]
mod tests;
