// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Follow realtime changes to one table and print them as JSON lines.

use std::sync::Arc;

use fieldops_core::protocol::ChangeEvent;
use serde_json::{json, Value};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::config::RealtimeConfig;
use crate::error::{Error, Result};
use crate::network::NetworkMonitor;
use crate::realtime::{
    parse_event, ChangeHandler, ChannelEvent, ChannelEventKind, ChannelSubscriptionConfig,
    HandlerResult, HealthMonitor, RealtimeManager, WebSocketTransport,
};

use super::Context;

pub fn run(
    ctx: &Context,
    table: &str,
    schema: &str,
    event: &str,
    filter: Option<&str>,
) -> Result<()> {
    let subscription = subscription_config(table, schema, event, filter)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(follow(ctx.config.realtime.clone(), subscription))
}

pub(crate) fn subscription_config(
    table: &str,
    schema: &str,
    event: &str,
    filter: Option<&str>,
) -> Result<ChannelSubscriptionConfig> {
    let mut config = ChannelSubscriptionConfig::table(table).schema(schema);
    if let Some(event) = parse_event(event)? {
        config = config.event(event);
    }
    if let Some(filter) = filter {
        config = config.filter(filter)?;
    }
    Ok(config)
}

async fn follow(config: RealtimeConfig, subscription: ChannelSubscriptionConfig) -> Result<()> {
    let topic = subscription.topic();
    let manager = RealtimeManager::spawn(
        Box::new(WebSocketTransport::new()),
        NetworkMonitor::new(true),
        Arc::new(HealthMonitor::new(true)),
        config,
    );
    let mut events = manager.events();
    let _subscription = manager.subscribe(subscription, Arc::new(ChangePrinter));
    info!(topic = %topic, "watching for changes");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let outcome = loop {
        tokio::select! {
            _ = &mut ctrl_c => break Ok(()),
            event = events.recv() => match event {
                Ok(event) => {
                    if let Some(err) = report(&event) {
                        break Err(err);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "missed channel events");
                }
                Err(RecvError::Closed) => break Ok(()),
            },
        }
    };

    manager.shutdown().await;
    outcome
}

/// Log a lifecycle event. Returns an error once the channel gives up.
fn report(event: &ChannelEvent) -> Option<Error> {
    match &event.kind {
        ChannelEventKind::Connected => info!(channel = %event.channel, "connected"),
        ChannelEventKind::Disconnected => warn!(channel = %event.channel, "disconnected"),
        ChannelEventKind::Error { message } => {
            warn!(channel = %event.channel, error = %message, "channel error")
        }
        ChannelEventKind::Reconnecting { attempt } => {
            info!(channel = %event.channel, attempt, "reconnecting")
        }
        ChannelEventKind::MaxRetriesReached => {
            return Some(Error::Realtime(format!(
                "{} gave up after repeated failures",
                event.channel
            )));
        }
    }
    None
}

struct ChangePrinter;

impl ChangeHandler for ChangePrinter {
    fn on_any(&self, event: &ChangeEvent) -> HandlerResult {
        println!("{}", change_line(event));
        Ok(())
    }
}

pub(crate) fn change_line(event: &ChangeEvent) -> Value {
    json!({
        "schema": event.schema,
        "table": event.table,
        "event": event.event_type().as_str(),
        "commit_timestamp": event.commit_timestamp.map(|t| t.to_rfc3339()),
        "old": event.old_row(),
        "new": event.new_row(),
    })
}

#[cfg(test)]
#[path = "watch_tests.rs"]
mod tests;
