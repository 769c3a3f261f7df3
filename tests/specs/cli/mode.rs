// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Specs for `fieldops mode`.

#![allow(clippy::panic)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

mod common;
use common::*;
use yare::parameterized;

#[parameterized(
    high = { "85", "high_accuracy" },
    balanced = { "50", "balanced" },
    power_saver = { "15", "power_saver" },
    ultra_saver = { "8", "ultra_saver" },
)]
fn level_selects_mode(level: &str, mode: &str) {
    let temp = TempDir::new().unwrap();
    fieldops(&temp)
        .args(["mode", level])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("Mode:             {}", mode)));
}

#[test]
fn charging_always_tracks_at_high_accuracy() {
    let temp = TempDir::new().unwrap();
    fieldops(&temp)
        .args(["mode", "3", "--charging"])
        .assert()
        .success()
        .stdout(predicate::str::contains("high_accuracy"))
        .stdout(predicate::str::contains("Poll interval:    5s"));
}

#[test]
fn lower_battery_polls_less_often() {
    let temp = TempDir::new().unwrap();
    let interval = |level: &str| {
        let output = fieldops(&temp).args(["mode", level, "-o", "json"]).output().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        value["poll_interval_ms"].as_u64().unwrap()
    };
    let (balanced, saver, ultra) = (interval("50"), interval("15"), interval("8"));
    assert!(balanced < saver && saver < ultra);
}

#[test]
fn level_above_100_is_rejected() {
    let temp = TempDir::new().unwrap();
    fieldops(&temp).args(["mode", "120"]).assert().failure();
}

#[test]
fn configured_thresholds_apply() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("fieldops.toml");
    std::fs::write(
        &config,
        "[location]\nhigh_threshold = 95\nmedium_threshold = 70\nlow_threshold = 30\n",
    )
    .unwrap();
    fieldops(&temp)
        .arg("--config")
        .arg(&config)
        .args(["mode", "85"])
        .assert()
        .success()
        .stdout(predicate::str::contains("balanced"));
}

#[test]
fn invalid_thresholds_are_rejected() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("fieldops.toml");
    std::fs::write(&config, "[location]\nhigh_threshold = 20\nmedium_threshold = 50\n").unwrap();
    fieldops(&temp)
        .arg("--config")
        .arg(&config)
        .args(["mode", "85"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("low <= medium <= high"));
}
