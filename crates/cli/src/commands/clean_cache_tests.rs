// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use crate::commands::testing::{now, TestContext};
use fieldops_core::{EntityKey, Record};
use serde_json::Map;

fn record(id: &str) -> Record {
    Record::new(EntityKey::new("site_visit", id), 3, Map::new(), now())
}

#[test]
fn drops_only_expired_clean_entries() {
    let mut ctx = TestContext::new();
    ctx.store
        .cache_put(&record("old"), Some(chrono::Duration::seconds(-1)))
        .unwrap();
    ctx.store
        .cache_put(&record("fresh"), Some(chrono::Duration::hours(1)))
        .unwrap();
    ctx.store.cache_put(&record("forever"), None).unwrap();

    assert_eq!(run_impl(&mut ctx.store).unwrap(), 1);
    assert!(ctx.store.cache_get(&EntityKey::new("site_visit", "old")).unwrap().is_none());
    assert!(ctx.store.cache_get(&EntityKey::new("site_visit", "fresh")).unwrap().is_some());
    assert!(ctx.store.cache_get(&EntityKey::new("site_visit", "forever")).unwrap().is_some());
}

#[test]
fn dirty_entries_survive() {
    let mut ctx = TestContext::new();
    ctx.create("v-1");
    assert_eq!(run_impl(&mut ctx.store).unwrap(), 0);
    assert_eq!(ctx.store.stats().unwrap().cached_items, 1);
}
