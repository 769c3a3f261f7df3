// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use crate::commands::testing::TestContext;

#[test]
fn shows_configured_policy_until_one_is_stored() {
    let mut ctx = TestContext::new();
    let current = run_impl(&mut ctx.store, None, ConflictResolution::Manual).unwrap();
    assert_eq!(current, ConflictResolution::Manual);
}

#[test]
fn stored_policy_wins_over_config() {
    let mut ctx = TestContext::new();
    run_impl(&mut ctx.store, Some(ConflictResolution::ServerWins), ConflictResolution::Merge)
        .unwrap();

    let current = run_impl(&mut ctx.store, None, ConflictResolution::Merge).unwrap();
    assert_eq!(current, ConflictResolution::ServerWins);
    let stored: Option<ConflictResolution> = ctx.store.get_state(RESOLUTION_STATE_KEY).unwrap();
    assert_eq!(stored, Some(ConflictResolution::ServerWins));
}
