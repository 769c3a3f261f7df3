// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;

#[test]
fn set_online_reports_transitions_only() {
    let network = NetworkMonitor::new(true);
    assert!(network.is_online());
    assert!(!network.set_online(true));
    assert!(network.set_online(false));
    assert!(!network.is_online());
}

#[test]
fn clones_share_state() {
    let network = NetworkMonitor::new(false);
    let other = network.clone();
    other.set_online(true);
    assert!(network.is_online());
}

#[tokio::test]
async fn subscribers_wake_on_change() {
    let network = NetworkMonitor::new(false);
    let mut rx = network.subscribe();

    network.set_online(false);
    assert!(!rx.has_changed().unwrap());

    network.set_online(true);
    rx.changed().await.unwrap();
    assert!(*rx.borrow_and_update());
}
