// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use super::*;
use crate::location::test_helpers::{position, FakeGeolocation, Reply};
use crate::location::ManualBattery;

type Tracker = BatteryAwareLocationTracker<FakeGeolocation, ManualBattery>;

fn tracker(level: u8) -> (Tracker, mpsc::UnboundedReceiver<TrackerEvent>, FakeGeolocation, Arc<ManualBattery>) {
    let geo = FakeGeolocation::new();
    let battery = Arc::new(ManualBattery::new(BatteryStatus::new(level, false)));
    let (tracker, rx) = BatteryAwareLocationTracker::new(
        Arc::new(geo.clone()),
        Arc::clone(&battery),
        ModeThresholds::default(),
    );
    (tracker, rx, geo, battery)
}

async fn next_mode_change(rx: &mut mpsc::UnboundedReceiver<TrackerEvent>) -> (BatteryMode, LocationConfig) {
    loop {
        if let TrackerEvent::ModeChanged { mode, config } = rx.recv().await.unwrap() {
            return (mode, config);
        }
    }
}

async fn next_non_mode(rx: &mut mpsc::UnboundedReceiver<TrackerEvent>) -> TrackerEvent {
    loop {
        let event = rx.recv().await.unwrap();
        if !matches!(event, TrackerEvent::ModeChanged { .. }) {
            return event;
        }
    }
}

fn drain_positions(rx: &mut mpsc::UnboundedReceiver<TrackerEvent>) -> Vec<Position> {
    let mut positions = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let TrackerEvent::Position { position, .. } = event {
            positions.push(position);
        }
    }
    positions
}

#[tokio::test(start_paused = true)]
async fn battery_drain_walks_modes_down() {
    let (tracker, mut rx, _geo, battery) = tracker(50);
    tracker.start().await;
    assert_eq!(tracker.get_current_mode(), BatteryMode::Balanced);
    let balanced = tracker.current_config();

    battery.set(BatteryStatus::new(15, false));
    let (mode, power_saver) = next_mode_change(&mut rx).await;
    assert_eq!(mode, BatteryMode::PowerSaver);

    battery.set(BatteryStatus::new(8, false));
    let (mode, ultra) = next_mode_change(&mut rx).await;
    assert_eq!(mode, BatteryMode::UltraSaver);

    assert!(balanced.poll_interval < power_saver.poll_interval);
    assert!(power_saver.poll_interval < ultra.poll_interval);
    assert_eq!(tracker.get_current_mode(), BatteryMode::UltraSaver);
}

#[tokio::test(start_paused = true)]
async fn charging_selects_high_accuracy() {
    let (tracker, mut rx, _geo, battery) = tracker(30);
    tracker.start().await;
    assert_eq!(tracker.get_current_mode(), BatteryMode::PowerSaver);
    let (initial, _) = next_mode_change(&mut rx).await;
    assert_eq!(initial, BatteryMode::PowerSaver);

    battery.set(BatteryStatus::new(30, true));
    let (mode, _) = next_mode_change(&mut rx).await;
    assert_eq!(mode, BatteryMode::HighAccuracy);
}

#[tokio::test(start_paused = true)]
async fn manual_override_survives_battery_changes() {
    let (tracker, _rx, _geo, battery) = tracker(90);
    tracker.start().await;
    assert_eq!(tracker.get_current_mode(), BatteryMode::HighAccuracy);

    tracker.set_manual_mode(Some(BatteryMode::UltraSaver));
    assert_eq!(tracker.get_current_mode(), BatteryMode::UltraSaver);

    battery.set(BatteryStatus::new(20, false));
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(tracker.get_current_mode(), BatteryMode::UltraSaver);
    assert_eq!(tracker.manual_mode(), Some(BatteryMode::UltraSaver));

    tracker.set_manual_mode(None);
    assert_eq!(tracker.get_current_mode(), BatteryMode::PowerSaver);
}

#[tokio::test(start_paused = true)]
async fn override_before_start_applies() {
    let (tracker, _rx, geo, _battery) = tracker(90);
    tracker.set_manual_mode(Some(BatteryMode::PowerSaver));
    tracker.start().await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(tracker.get_current_mode(), BatteryMode::PowerSaver);
    assert!(!geo.requests()[0].high_accuracy);
}

#[tokio::test(start_paused = true)]
async fn stop_discards_in_flight_results() {
    let (tracker, mut rx, geo, _battery) = tracker(90);
    geo.push(Reply::Delayed(Duration::from_secs(3), position(1.0, 1.0)));
    tracker.start().await;
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(geo.calls(), 1);

    tracker.stop();
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert!(!tracker.is_running());
    assert!(drain_positions(&mut rx).is_empty());
    assert_eq!(geo.calls(), 1);
    assert!(tracker.last_position().is_none());
}

#[tokio::test(start_paused = true)]
async fn permission_denied_stops_polling() {
    let (tracker, mut rx, geo, _battery) = tracker(60);
    geo.push(Reply::Fail(GeolocationError::PermissionDenied));
    tracker.start().await;

    assert_eq!(
        rx.recv().await.unwrap(),
        TrackerEvent::Error(GeolocationError::PermissionDenied)
    );
    assert!(!tracker.is_running());

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(geo.calls(), 1);

    tracker.start().await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(tracker.is_running());
    assert_eq!(geo.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn timeouts_are_reported_and_polling_continues() {
    let (tracker, mut rx, geo, _battery) = tracker(90);
    geo.set_fallback(Reply::Hang);
    tracker.start().await;

    assert_eq!(
        next_non_mode(&mut rx).await,
        TrackerEvent::Error(GeolocationError::Timeout)
    );
    assert!(tracker.is_running());
    assert!(geo.calls() >= 2);
}

#[tokio::test(start_paused = true)]
async fn unavailable_positions_are_retried() {
    let (tracker, mut rx, geo, _battery) = tracker(90);
    geo.push(Reply::Fail(GeolocationError::PositionUnavailable("no fix".into())));
    geo.push(Reply::Fix(position(2.0, 2.0)));
    tracker.start().await;

    assert!(matches!(
        next_non_mode(&mut rx).await,
        TrackerEvent::Error(GeolocationError::PositionUnavailable(_))
    ));
    let event = next_non_mode(&mut rx).await;
    assert!(matches!(event, TrackerEvent::Position { mode: BatteryMode::HighAccuracy, .. }));
}

#[tokio::test(start_paused = true)]
async fn small_moves_are_dropped() {
    let (tracker, mut rx, geo, _battery) = tracker(90);
    geo.push(Reply::Fix(position(0.0, 0.0)));
    geo.push(Reply::Fix(position(0.0, 0.000_01)));
    geo.push(Reply::Fix(position(0.01, 0.0)));
    tracker.start().await;
    tokio::time::sleep(Duration::from_secs(12)).await;

    let positions = drain_positions(&mut rx);
    assert_eq!(positions.len(), 2);
    assert_eq!(positions[1].latitude, 0.01);
    assert_eq!(tracker.last_position().unwrap().latitude, 0.01);
}

#[tokio::test(start_paused = true)]
async fn mode_change_recreates_the_timer() {
    let (tracker, _rx, geo, _battery) = tracker(90);
    tracker.start().await;
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(geo.calls() >= 12, "high accuracy polls every 5s, got {}", geo.calls());

    tracker.set_manual_mode(Some(BatteryMode::UltraSaver));
    tokio::time::sleep(Duration::from_millis(10)).await;
    let before = geo.calls();
    tokio::time::sleep(Duration::from_secs(120)).await;

    assert_eq!(geo.calls() - before, 2, "ultra saver polls every 60s");
    assert!(!geo.requests().last().unwrap().high_accuracy);
}

#[tokio::test(start_paused = true)]
async fn economical_mode_change_waits_out_the_longer_interval() {
    let (tracker, mut rx, geo, battery) = tracker(50);
    geo.push(Reply::Fix(position(0.0, 0.0)));
    geo.push(Reply::Fix(position(0.01, 0.0)));
    tracker.start().await;
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(geo.calls(), 1);

    battery.set(BatteryStatus::new(15, false));
    let (mode, _) = next_mode_change(&mut rx).await;
    assert_eq!(mode, BatteryMode::PowerSaver);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(geo.calls(), 1, "no request before the power saver interval elapses");

    // Power saver polls 30s after the last request.
    tokio::time::sleep(Duration::from_secs(26)).await;
    assert_eq!(geo.calls(), 2);
    assert_eq!(tracker.last_position().unwrap().latitude, 0.01);
}

#[tokio::test(start_paused = true)]
async fn start_twice_keeps_one_session() {
    let (tracker, _rx, geo, _battery) = tracker(90);
    tracker.start().await;
    tracker.start().await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(geo.calls(), 1);
}
