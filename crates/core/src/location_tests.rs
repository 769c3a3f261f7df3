// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use yare::parameterized;

#[parameterized(
    high = { "high_accuracy", BatteryMode::HighAccuracy },
    balanced = { "balanced", BatteryMode::Balanced },
    power_saver = { "power_saver", BatteryMode::PowerSaver },
    ultra_dashed = { "ultra-saver", BatteryMode::UltraSaver },
    upper = { "BALANCED", BatteryMode::Balanced },
)]
fn battery_mode_from_str_valid(input: &str, expected: BatteryMode) {
    assert_eq!(input.parse::<BatteryMode>().unwrap(), expected);
}

#[test]
fn battery_mode_from_str_invalid() {
    assert!("turbo".parse::<BatteryMode>().is_err());
}

#[test]
fn battery_modes_ordered_by_accuracy() {
    let mut modes = BatteryMode::ALL.to_vec();
    modes.sort();
    assert_eq!(modes, BatteryMode::ALL.to_vec());
    assert!(BatteryMode::HighAccuracy < BatteryMode::UltraSaver);
}

#[test]
fn location_sample_serializes_without_id() {
    let sample = LocationSample::new(-1.29, 36.82, 12.0, Utc::now(), BatteryMode::Balanced);
    let json = serde_json::to_value(&sample).unwrap();
    assert!(json.get("id").is_none());
    assert_eq!(json["mode"], "balanced");
}
