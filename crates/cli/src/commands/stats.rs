// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use fieldops_core::{LocalStore, OfflineStats};

use crate::cli::OutputFormat;
use crate::error::Result;

use super::Context;

pub fn run(ctx: &Context, output: OutputFormat) -> Result<()> {
    let store = ctx.open_store()?;
    run_impl(&store, output)
}

/// Internal implementation that accepts the store for testing.
pub(crate) fn run_impl(store: &LocalStore, output: OutputFormat) -> Result<()> {
    let stats = store.stats()?;
    println!("{}", render(&stats, output)?);
    Ok(())
}

pub(crate) fn render(stats: &OfflineStats, output: OutputFormat) -> Result<String> {
    match output {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(stats)?),
        OutputFormat::Text => Ok(format!(
            "Pending actions:    {}\n\
             Unsynced visits:    {}\n\
             Unsynced locations: {}\n\
             Cached items:       {}\n\
             Failed actions:     {}",
            stats.pending_actions,
            stats.unsynced_visits,
            stats.unsynced_locations,
            stats.cached_items,
            stats.failed_actions
        )),
    }
}

#[cfg(test)]
#[path = "stats_tests.rs"]
mod tests;
