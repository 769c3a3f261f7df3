// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use fieldops_core::{FailedAction, LocalStore, PendingAction};

use crate::cli::OutputFormat;
use crate::error::Result;

use super::Context;

pub fn run(ctx: &Context, failed: bool, output: OutputFormat) -> Result<()> {
    let store = ctx.open_store()?;
    run_impl(&store, failed, output)
}

/// Internal implementation that accepts the store for testing.
pub(crate) fn run_impl(store: &LocalStore, failed: bool, output: OutputFormat) -> Result<()> {
    let rendered = if failed {
        render_failed(&store.failed_actions()?, output)?
    } else {
        render_pending(&store.list()?, output)?
    };
    println!("{}", rendered);
    Ok(())
}

pub(crate) fn render_pending(actions: &[PendingAction], output: OutputFormat) -> Result<String> {
    if output == OutputFormat::Json {
        return Ok(serde_json::to_string_pretty(actions)?);
    }
    if actions.is_empty() {
        return Ok("No pending actions".to_string());
    }
    let lines: Vec<String> = actions.iter().map(pending_line).collect();
    Ok(lines.join("\n"))
}

pub(crate) fn render_failed(failed: &[FailedAction], output: OutputFormat) -> Result<String> {
    if output == OutputFormat::Json {
        return Ok(serde_json::to_string_pretty(failed)?);
    }
    if failed.is_empty() {
        return Ok("No failed actions".to_string());
    }
    let lines: Vec<String> = failed
        .iter()
        .map(|f| {
            format!(
                "{}  {:<6}  {}  failed {}: {}",
                f.action.id,
                f.action.kind.as_str(),
                f.action.key,
                f.failed_at.format("%Y-%m-%d %H:%M"),
                f.reason
            )
        })
        .collect();
    Ok(lines.join("\n"))
}

fn pending_line(action: &PendingAction) -> String {
    let mut line = format!(
        "{:>4}  {}  {:<6}  {}",
        action.seq, action.id, action.kind.as_str(), action.key
    );
    if action.attempt_count > 0 {
        line.push_str(&format!("  attempts={}", action.attempt_count));
    }
    if let Some(error) = &action.last_error {
        line.push_str(&format!("  last error: {}", error));
    }
    line
}

#[cfg(test)]
#[path = "list_tests.rs"]
mod tests;
