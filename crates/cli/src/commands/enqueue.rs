// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use chrono::{DateTime, Utc};
use fieldops_core::{ActionKind, EnqueueOutcome, EntityKey, LocalStore, NewAction};
use serde_json::{json, Value};
use tracing::info;

use crate::cli::OutputFormat;
use crate::error::{Error, Result};

use super::Context;

/// One `enqueue` invocation.
pub struct EnqueueArgs<'a> {
    pub kind: ActionKind,
    pub entity_type: &'a str,
    pub entity_id: &'a str,
    pub payload: Option<&'a str>,
    pub base_version: Option<u64>,
    pub output: OutputFormat,
}

pub fn run(ctx: &Context, args: EnqueueArgs<'_>) -> Result<()> {
    let mut store = ctx.open_store()?;
    run_impl(&mut store, args, Utc::now())
}

/// Internal implementation that accepts the store and clock for testing.
pub(crate) fn run_impl(
    store: &mut LocalStore,
    args: EnqueueArgs<'_>,
    now: DateTime<Utc>,
) -> Result<()> {
    let action = build_action(&args, now)?;
    let outcome = store.enqueue(action)?;
    info!(id = outcome.id(), kind = %args.kind, "enqueued action");
    println!("{}", render(&outcome, args.output)?);
    Ok(())
}

pub(crate) fn build_action(args: &EnqueueArgs<'_>, now: DateTime<Utc>) -> Result<NewAction> {
    let key = EntityKey::new(args.entity_type, args.entity_id);
    let payload = parse_payload(args.kind, args.payload)?;
    let action = NewAction::new(args.kind, key, payload, now);
    Ok(match args.base_version {
        Some(version) => action.with_base_version(version),
        None => action,
    })
}

/// Creates and updates need a JSON object; deletes take no payload.
fn parse_payload(kind: ActionKind, raw: Option<&str>) -> Result<Value> {
    match (kind, raw) {
        (ActionKind::Delete, None) => Ok(Value::Null),
        (ActionKind::Delete, Some(_)) => {
            Err(Error::InvalidPayload("delete takes no payload".to_string()))
        }
        (_, None) => Err(Error::InvalidPayload(format!("{} requires a payload", kind))),
        (_, Some(raw)) => {
            let value: Value =
                serde_json::from_str(raw).map_err(|e| Error::InvalidPayload(e.to_string()))?;
            if value.is_object() {
                Ok(value)
            } else {
                Err(Error::InvalidPayload("expected a JSON object".to_string()))
            }
        }
    }
}

fn outcome_label(outcome: &EnqueueOutcome) -> &'static str {
    match outcome {
        EnqueueOutcome::Queued(_) => "queued",
        EnqueueOutcome::Replaced(_) => "replaced",
        EnqueueOutcome::Duplicate(_) => "duplicate",
    }
}

pub(crate) fn render(outcome: &EnqueueOutcome, output: OutputFormat) -> Result<String> {
    let action = outcome.action();
    match output {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&json!({
            "outcome": outcome_label(outcome),
            "action": action,
        }))?),
        OutputFormat::Text => Ok(match outcome {
            EnqueueOutcome::Queued(_) => format!("Queued {} ({})", action.id, action.describe()),
            EnqueueOutcome::Replaced(_) => {
                format!("Replaced payload of {} ({})", action.id, action.describe())
            }
            EnqueueOutcome::Duplicate(_) => {
                format!("Unchanged: {} already queues this update", action.id)
            }
        }),
    }
}

#[cfg(test)]
#[path = "enqueue_tests.rs"]
mod tests;
