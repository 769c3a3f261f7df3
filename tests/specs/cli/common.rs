// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

// Allow unused items: test helpers are shared across multiple test files,
// and not every test file uses every helper.
#![allow(dead_code)]
#![allow(unused_imports)]

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;

pub use predicates::prelude::*;
pub use tempfile::TempDir;

/// `fieldops` with its config directory pointed into `temp`, so a user
/// config never leaks into a test.
pub fn fieldops(temp: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("fieldops");
    cmd.env("XDG_CONFIG_HOME", temp.path().join("config"))
        .env("RUST_LOG", "warn")
        .arg("--store")
        .arg(temp.path().join("offline.db"));
    cmd
}

/// Queue an action and return its id.
pub fn enqueue(temp: &TempDir, args: &[&str]) -> String {
    let output = fieldops(temp)
        .arg("enqueue")
        .args(args)
        .args(["-o", "json"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    value["action"]["id"].as_str().unwrap().to_string()
}
