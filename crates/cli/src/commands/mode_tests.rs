// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use yare::parameterized;

fn text(level: u8, charging: bool) -> String {
    render(BatteryStatus::new(level, charging), ModeThresholds::default(), 8.0, OutputFormat::Text)
        .unwrap()
}

#[parameterized(
    full = { 85, false, "high_accuracy" },
    half = { 50, false, "balanced" },
    low = { 15, false, "power_saver" },
    critical = { 8, false, "ultra_saver" },
    charging = { 5, true, "high_accuracy" },
)]
fn names_the_derived_mode(level: u8, charging: bool, expected: &str) {
    let out = text(level, charging);
    assert!(out.starts_with(&format!("Mode:             {}", expected)), "{}", out);
}

#[test]
fn text_shows_the_poll_config() {
    let out = text(15, false);
    assert!(out.contains("Poll interval:    30s"));
    assert!(out.contains("Desired accuracy: 100 m"));
    assert!(out.contains("High accuracy:    no"));
}

#[test]
fn custom_thresholds_apply() {
    let thresholds = ModeThresholds { high: 95, medium: 70, low: 30 };
    let out = render(BatteryStatus::new(85, false), thresholds, 8.0, OutputFormat::Text).unwrap();
    assert!(out.starts_with("Mode:             balanced"));
}

#[test]
fn json_carries_millisecond_timings() {
    let json = render(BatteryStatus::new(50, false), ModeThresholds::default(), 4.0, OutputFormat::Json)
        .unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["mode"], "balanced");
    assert_eq!(value["poll_interval_ms"], 15_000);
    assert_eq!(value["hours"], 4.0);
}
