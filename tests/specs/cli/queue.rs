// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Specs for the queue commands: `enqueue`, `list`, `stats`, `retry`,
//! `clean-cache` and `conflict-policy`.

#![allow(clippy::panic)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

mod common;
use common::*;

// =============================================================================
// enqueue / list
// =============================================================================

#[test]
fn list_on_a_fresh_store_is_empty() {
    let temp = TempDir::new().unwrap();
    fieldops(&temp)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No pending actions"));
}

#[test]
fn enqueued_actions_list_in_order() {
    let temp = TempDir::new().unwrap();
    let create = enqueue(
        &temp,
        &["create", "site_visit", "s1", "--payload", r#"{"status":"scheduled"}"#],
    );
    let update = enqueue(
        &temp,
        &["update", "site_visit", "s1", "--payload", r#"{"status":"in_progress"}"#],
    );

    let output = fieldops(&temp).arg("list").output().unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains(&create) && lines[0].contains("create"));
    assert!(lines[1].contains(&update) && lines[1].contains("update"));
}

#[test]
fn repeated_create_replaces_payload() {
    let temp = TempDir::new().unwrap();
    let first = enqueue(&temp, &["create", "site_visit", "s1", "-p", r#"{"status":"draft"}"#]);

    fieldops(&temp)
        .args(["enqueue", "create", "site_visit", "s1", "-p", r#"{"status":"scheduled"}"#])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("Replaced payload of {}", first)));

    fieldops(&temp)
        .args(["list", "-o", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("scheduled"))
        .stdout(predicate::str::contains("draft").not());
}

#[test]
fn enqueue_rejects_bad_payloads() {
    let temp = TempDir::new().unwrap();
    fieldops(&temp)
        .args(["enqueue", "create", "site_visit", "s1", "--payload", "[1]"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error: invalid payload"));

    fieldops(&temp)
        .args(["enqueue", "update", "site_visit", "s1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("requires a payload"));
}

#[test]
fn enqueue_rejects_unknown_kind() {
    let temp = TempDir::new().unwrap();
    fieldops(&temp)
        .args(["enqueue", "upsert", "site_visit", "s1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid action kind"));
}

// =============================================================================
// stats
// =============================================================================

#[test]
fn stats_counts_visits() {
    let temp = TempDir::new().unwrap();
    enqueue(&temp, &["create", "site_visit", "s1", "-p", r#"{"status":"scheduled"}"#]);
    enqueue(&temp, &["update", "site_visit", "s1", "-p", r#"{"status":"completed"}"#]);
    enqueue(&temp, &["create", "note", "n1", "-p", r#"{"text":"gate code 4411"}"#]);

    let output = fieldops(&temp).args(["stats", "-o", "json"]).output().unwrap();
    assert!(output.status.success());
    let stats: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(stats["pending_actions"], 3);
    assert_eq!(stats["unsynced_visits"], 1);
    assert_eq!(stats["failed_actions"], 0);
}

// =============================================================================
// retry / clean-cache
// =============================================================================

#[test]
fn retry_without_target_fails() {
    let temp = TempDir::new().unwrap();
    fieldops(&temp)
        .arg("retry")
        .assert()
        .failure()
        .stderr(predicate::str::contains("nothing to retry"));
}

#[test]
fn retry_unknown_action_fails() {
    let temp = TempDir::new().unwrap();
    fieldops(&temp)
        .args(["retry", "act-000000000000"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed action not found"));
}

#[test]
fn retry_all_with_empty_dead_letter() {
    let temp = TempDir::new().unwrap();
    fieldops(&temp)
        .args(["retry", "--all"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Requeued 0 action(s)"));
    fieldops(&temp)
        .args(["list", "--failed"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No failed actions"));
}

#[test]
fn clean_cache_keeps_dirty_records() {
    let temp = TempDir::new().unwrap();
    enqueue(&temp, &["create", "site_visit", "s1", "-p", r#"{"status":"scheduled"}"#]);
    fieldops(&temp)
        .arg("clean-cache")
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed 0 expired cache entries"));
}

// =============================================================================
// conflict-policy
// =============================================================================

#[test]
fn conflict_policy_defaults_to_merge() {
    let temp = TempDir::new().unwrap();
    fieldops(&temp)
        .arg("conflict-policy")
        .assert()
        .success()
        .stdout(predicate::str::contains("Conflict policy: merge (config)"));
}

#[test]
fn conflict_policy_persists() {
    let temp = TempDir::new().unwrap();
    fieldops(&temp)
        .args(["conflict-policy", "server-wins"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Conflict policy set to server_wins"));
    fieldops(&temp)
        .arg("conflict-policy")
        .assert()
        .success()
        .stdout(predicate::str::contains("Conflict policy: server_wins (stored)"));
}

#[test]
fn config_file_supplies_defaults() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("fieldops.toml");
    std::fs::write(&config, "[sync]\nconflict_resolution = \"manual\"\n").unwrap();
    fieldops(&temp)
        .arg("--config")
        .arg(&config)
        .arg("conflict-policy")
        .assert()
        .success()
        .stdout(predicate::str::contains("Conflict policy: manual (config)"));
}

#[test]
fn missing_config_file_is_an_error() {
    let temp = TempDir::new().unwrap();
    fieldops(&temp)
        .args(["--config", "does-not-exist.toml", "stats"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error: config error"));
}
