// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use fieldops_core::policy::RESOLUTION_STATE_KEY;
use fieldops_core::{ConflictResolution, LocalStore};
use tracing::info;

use crate::error::Result;

use super::Context;

pub fn run(ctx: &Context, policy: Option<ConflictResolution>) -> Result<()> {
    let mut store = ctx.open_store()?;
    run_impl(&mut store, policy, ctx.config.sync.conflict_resolution)?;
    Ok(())
}

/// Internal implementation that accepts the store for testing.
///
/// `fallback` is the configured policy, in effect until one is stored.
pub(crate) fn run_impl(
    store: &mut LocalStore,
    policy: Option<ConflictResolution>,
    fallback: ConflictResolution,
) -> Result<ConflictResolution> {
    if let Some(policy) = policy {
        store.set_state(RESOLUTION_STATE_KEY, &policy)?;
        info!(%policy, "conflict policy stored");
        println!("Conflict policy set to {}", policy);
        return Ok(policy);
    }

    let (current, source) = match store.get_state::<ConflictResolution>(RESOLUTION_STATE_KEY)? {
        Some(stored) => (stored, "stored"),
        None => (fallback, "config"),
    };
    println!("Conflict policy: {} ({})", current, source);
    Ok(current)
}

#[cfg(test)]
#[path = "policy_tests.rs"]
mod tests;
