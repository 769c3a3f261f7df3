// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use fieldops_core::LocalStore;
use tracing::info;

use crate::error::{Error, Result};

use super::Context;

pub fn run(ctx: &Context, id: Option<&str>, all: bool) -> Result<()> {
    let mut store = ctx.open_store()?;
    run_impl(&mut store, id, all)
}

/// Internal implementation that accepts the store for testing.
pub(crate) fn run_impl(store: &mut LocalStore, id: Option<&str>, all: bool) -> Result<()> {
    match (id, all) {
        (_, true) => {
            let count = store.requeue_all_failed()?;
            info!(count, "requeued failed actions");
            println!("Requeued {} action(s)", count);
        }
        (Some(id), false) => {
            let action = store.requeue_failed(id)?;
            info!(id, "requeued failed action");
            println!("Requeued {} ({})", action.id, action.describe());
        }
        (None, false) => return Err(Error::NothingToRetry),
    }
    Ok(())
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
