// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use crate::commands::testing::TestContext;

#[test]
fn empty_store_reports_zeroes() {
    let ctx = TestContext::new();
    let text = render(&ctx.store.stats().unwrap(), OutputFormat::Text).unwrap();
    assert!(text.contains("Pending actions:    0"));
    assert!(text.contains("Failed actions:     0"));
}

#[test]
fn counts_pending_and_failed_work() {
    let mut ctx = TestContext::new();
    ctx.create("v-1");
    ctx.create("v-2");
    ctx.dead_letter("v-3");

    let stats = ctx.store.stats().unwrap();
    let text = render(&stats, OutputFormat::Text).unwrap();
    assert!(text.contains("Pending actions:    2"));
    assert!(text.contains("Unsynced visits:    2"));
    assert!(text.contains("Failed actions:     1"));
}

#[test]
fn json_uses_field_names() {
    let mut ctx = TestContext::new();
    ctx.create("v-1");
    let json = render(&ctx.store.stats().unwrap(), OutputFormat::Json).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["pending_actions"], 1);
    assert_eq!(value["failed_actions"], 0);
}

#[test]
fn run_impl_succeeds() {
    let ctx = TestContext::new();
    run_impl(&ctx.store, OutputFormat::Text).unwrap();
}
