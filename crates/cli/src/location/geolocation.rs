// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Platform geolocation seam.

use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};

use super::battery::LocationConfig;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    /// Accuracy radius in meters.
    pub accuracy: f64,
    pub timestamp: DateTime<Utc>,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64, accuracy: f64, timestamp: DateTime<Utc>) -> Self {
        Position {
            latitude,
            longitude,
            accuracy,
            timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GeolocationError {
    #[error("location permission denied")]
    PermissionDenied,

    #[error("position unavailable: {0}")]
    PositionUnavailable(String),

    #[error("location request timed out")]
    Timeout,
}

impl GeolocationError {
    /// Terminal errors stop polling until tracking is restarted.
    pub fn is_terminal(&self) -> bool {
        matches!(self, GeolocationError::PermissionDenied)
    }
}

/// Options for a single platform request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionRequest {
    pub high_accuracy: bool,
    pub maximum_age: Duration,
    pub timeout: Duration,
}

impl From<&LocationConfig> for PositionRequest {
    fn from(config: &LocationConfig) -> Self {
        PositionRequest {
            high_accuracy: config.high_accuracy,
            maximum_age: config.maximum_age,
            timeout: config.timeout,
        }
    }
}

/// Platform geolocation primitive.
pub trait GeolocationAdapter: Send + Sync + 'static {
    fn current_position(
        &self,
        request: PositionRequest,
    ) -> BoxFuture<'_, Result<Position, GeolocationError>>;
}

/// Great-circle distance in meters (haversine).
pub fn distance_m(a: &Position, b: &Position) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().atan2((1.0 - h).sqrt())
}

#[cfg(test)]
#[path = "geolocation_tests.rs"]
mod tests;
