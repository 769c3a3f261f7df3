// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Battery-aware location tracking.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │   Battery    │────►│   Tracker    │◄───►│ Geolocation  │
//! │  (adapter)   │     │ (mode policy)│     │  (adapter)   │
//! └──────────────┘     └──────┬───────┘     └──────────────┘
//!                             │ TrackerEvent
//!                             ▼
//!                      ┌──────────────┐
//!                      │   Recorder   │  (location samples → store)
//!                      └──────────────┘
//! ```
//!
//! The tracker derives a [`BatteryMode`](fieldops_core::BatteryMode) from the
//! battery status (or a manual override), maps it to a [`LocationConfig`] and
//! polls the platform at that cadence. Platform primitives sit behind the
//! [`BatteryAdapter`] and [`GeolocationAdapter`] traits.

mod battery;
mod geolocation;
mod recorder;
mod tracker;

pub use battery::{
    config_for, estimated_battery_usage, mode_description, mode_for, BatteryAdapter, BatteryError,
    BatteryStatus, LocationConfig, ManualBattery, ModeThresholds,
};
pub use geolocation::{distance_m, GeolocationAdapter, GeolocationError, Position, PositionRequest};
pub use recorder::spawn_recorder;
pub use tracker::{BatteryAwareLocationTracker, TrackerEvent};

#[cfg(test)]
mod test_helpers;
