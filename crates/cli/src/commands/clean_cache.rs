// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use fieldops_core::LocalStore;
use tracing::info;

use crate::error::Result;

use super::Context;

pub fn run(ctx: &Context) -> Result<()> {
    let mut store = ctx.open_store()?;
    run_impl(&mut store)?;
    Ok(())
}

/// Internal implementation that accepts the store for testing.
pub(crate) fn run_impl(store: &mut LocalStore) -> Result<usize> {
    let removed = store.clean_expired_cache()?;
    info!(removed, "cleaned expired cache entries");
    let noun = if removed == 1 { "entry" } else { "entries" };
    println!("Removed {} expired cache {}", removed, noun);
    Ok(removed)
}

#[cfg(test)]
#[path = "clean_cache_tests.rs"]
mod tests;
