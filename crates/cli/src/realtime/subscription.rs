// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Subscriber side of the change stream.
//!
//! Callers describe what they want with [`ChannelSubscriptionConfig`]s and
//! receive matching changes through a [`ChangeHandler`]. The [`Registry`]
//! coalesces configs onto one channel per `(schema, table)` and answers
//! "who gets this event" for the driver.

use std::collections::BTreeMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::{Arc, LazyLock};

use fieldops_core::protocol::{channel_topic, ChangeEvent, ChangeRow, EventType};
use regex::Regex;
use serde_json::{Map, Value};
use tracing::warn;

use super::health::ChannelStatus;
use super::manager::Hub;

static FILTER_RE: LazyLock<Regex> =
    LazyLock::new(|| match Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)=eq\.(.+)$") {
        Ok(re) => re,
        Err(_) => unreachable!("static regex pattern"),
    });

pub const DEFAULT_SCHEMA: &str = "public";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FilterError {
    #[error("invalid filter '{0}'\n  hint: filters look like column=eq.value")]
    Malformed(String),

    #[error("unknown event '{0}'\n  hint: use insert, update, delete or *")]
    UnknownEvent(String),
}

/// A `column=eq.value` row filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFilter {
    pub column: String,
    pub value: String,
}

impl RowFilter {
    /// True if the row has the column and its value renders as `value`.
    /// Strings compare by content, other JSON values by their JSON text.
    pub fn matches(&self, row: &Map<String, Value>) -> bool {
        match row.get(&self.column) {
            Some(Value::String(s)) => *s == self.value,
            Some(other) => other.to_string() == self.value,
            None => false,
        }
    }
}

impl FromStr for RowFilter {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = FILTER_RE
            .captures(s.trim())
            .ok_or_else(|| FilterError::Malformed(s.to_string()))?;
        Ok(RowFilter {
            column: caps[1].to_string(),
            value: caps[2].to_string(),
        })
    }
}

impl fmt::Display for RowFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=eq.{}", self.column, self.value)
    }
}

/// Parse an event selector: `insert`, `update`, `delete`, or `*` for all.
pub fn parse_event(s: &str) -> Result<Option<EventType>, FilterError> {
    if s.trim() == "*" {
        return Ok(None);
    }
    s.parse()
        .map(Some)
        .map_err(|_| FilterError::UnknownEvent(s.to_string()))
}

/// What one subscriber wants from one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSubscriptionConfig {
    pub schema: String,
    pub table: String,
    /// `None` matches every event type.
    pub event: Option<EventType>,
    pub filter: Option<RowFilter>,
}

impl ChannelSubscriptionConfig {
    /// All changes to `table` in the default schema.
    pub fn table(table: impl Into<String>) -> Self {
        ChannelSubscriptionConfig {
            schema: DEFAULT_SCHEMA.to_string(),
            table: table.into(),
            event: None,
            filter: None,
        }
    }

    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    pub fn event(mut self, event: EventType) -> Self {
        self.event = Some(event);
        self
    }

    /// Restrict to rows matching a `column=eq.value` filter.
    pub fn filter(mut self, filter: &str) -> Result<Self, FilterError> {
        self.filter = Some(filter.parse()?);
        Ok(self)
    }

    pub fn topic(&self) -> String {
        channel_topic(&self.schema, &self.table)
    }

    /// True if `event` is on this config's table and passes its event and
    /// row filters. The row filter is checked against both `new` and `old`.
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        if event.schema != self.schema || event.table != self.table {
            return false;
        }
        if self.event.is_some_and(|wanted| wanted != event.event_type()) {
            return false;
        }
        match &self.filter {
            None => true,
            Some(filter) => {
                event.new_row().is_some_and(|row| filter.matches(row))
                    || event.old_row().is_some_and(|row| filter.matches(row))
            }
        }
    }
}

impl From<ChannelSubscriptionConfig> for Vec<ChannelSubscriptionConfig> {
    fn from(config: ChannelSubscriptionConfig) -> Self {
        vec![config]
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        HandlerError(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        HandlerError(message.to_string())
    }
}

pub type HandlerResult = Result<(), HandlerError>;

/// Receives the changes a subscription matched.
///
/// The typed method for the event's kind runs first, then `on_any`.
/// Handlers run on the realtime driver task and should return quickly.
pub trait ChangeHandler: Send + Sync {
    fn on_insert(&self, _new: &Map<String, Value>) -> HandlerResult {
        Ok(())
    }

    fn on_update(&self, _old: &Map<String, Value>, _new: &Map<String, Value>) -> HandlerResult {
        Ok(())
    }

    fn on_delete(&self, _old: &Map<String, Value>) -> HandlerResult {
        Ok(())
    }

    fn on_any(&self, _event: &ChangeEvent) -> HandlerResult {
        Ok(())
    }
}

fn invoke(handler: &dyn ChangeHandler, event: &ChangeEvent) -> HandlerResult {
    match &event.row {
        ChangeRow::Insert { new } => handler.on_insert(new)?,
        ChangeRow::Update { old, new } => handler.on_update(old, new)?,
        ChangeRow::Delete { old } => handler.on_delete(old)?,
    }
    handler.on_any(event)
}

// Handler isolation relies on unwinding.
#[cfg(not(panic = "unwind"))]
compile_error!("change handler isolation requires panic = \"unwind\"");

/// Deliver `event` to every handler. Returns how many handlers failed.
///
/// A handler that errors or panics is logged; the rest still run.
pub fn fan_out(topic: &str, event: &ChangeEvent, handlers: &[(u64, Arc<dyn ChangeHandler>)]) -> usize {
    let mut failed = 0;
    for (subscriber, handler) in handlers {
        match catch_unwind(AssertUnwindSafe(|| invoke(handler.as_ref(), event))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                failed += 1;
                warn!(topic, subscriber, error = %e, "change handler failed");
            }
            Err(_) => {
                failed += 1;
                warn!(topic, subscriber, "change handler panicked");
            }
        }
    }
    failed
}

struct Subscriber {
    id: u64,
    configs: Vec<ChannelSubscriptionConfig>,
    handler: Arc<dyn ChangeHandler>,
}

pub(crate) struct ChannelEntry {
    pub schema: String,
    pub table: String,
    pub status: ChannelStatus,
    subscribers: Vec<Subscriber>,
}

/// Channels and their subscribers, keyed by topic.
#[derive(Default)]
pub(crate) struct Registry {
    channels: BTreeMap<String, ChannelEntry>,
}

impl Registry {
    /// Add a subscriber. Returns the topics that had no subscribers before.
    pub fn add(
        &mut self,
        id: u64,
        configs: Vec<ChannelSubscriptionConfig>,
        handler: Arc<dyn ChangeHandler>,
    ) -> Vec<String> {
        let mut by_topic: BTreeMap<String, Vec<ChannelSubscriptionConfig>> = BTreeMap::new();
        for config in configs {
            by_topic.entry(config.topic()).or_default().push(config);
        }

        let mut opened = Vec::new();
        for (topic, configs) in by_topic {
            let entry = self.channels.entry(topic.clone()).or_insert_with(|| {
                opened.push(topic.clone());
                ChannelEntry {
                    schema: configs[0].schema.clone(),
                    table: configs[0].table.clone(),
                    status: ChannelStatus::Connecting,
                    subscribers: Vec::new(),
                }
            });
            entry.subscribers.push(Subscriber {
                id,
                configs,
                handler: Arc::clone(&handler),
            });
        }
        opened
    }

    /// Remove a subscriber. Returns the topics left without subscribers,
    /// which are dropped from the registry.
    pub fn remove(&mut self, id: u64) -> Vec<String> {
        let mut closed = Vec::new();
        self.channels.retain(|topic, entry| {
            let before = entry.subscribers.len();
            entry.subscribers.retain(|s| s.id != id);
            let emptied = before > 0 && entry.subscribers.is_empty();
            if emptied {
                closed.push(topic.clone());
            }
            !emptied
        });
        closed
    }

    /// Handlers with at least one config on `topic` matching `event`.
    pub fn handlers_for(&self, topic: &str, event: &ChangeEvent) -> Vec<(u64, Arc<dyn ChangeHandler>)> {
        self.channels
            .get(topic)
            .map(|entry| {
                entry
                    .subscribers
                    .iter()
                    .filter(|s| s.configs.iter().any(|c| c.matches(event)))
                    .map(|s| (s.id, Arc::clone(&s.handler)))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn get(&self, topic: &str) -> Option<&ChannelEntry> {
        self.channels.get(topic)
    }

    pub fn set_status(&mut self, topic: &str, status: ChannelStatus) {
        if let Some(entry) = self.channels.get_mut(topic) {
            entry.status = status;
        }
    }

    pub fn topics(&self) -> Vec<String> {
        self.channels.keys().cloned().collect()
    }

    pub fn stats(&self) -> SubscriptionStats {
        let mut subscriptions: Vec<u64> = self
            .channels
            .values()
            .flat_map(|entry| entry.subscribers.iter().map(|s| s.id))
            .collect();
        subscriptions.sort_unstable();
        subscriptions.dedup();
        SubscriptionStats {
            subscriptions: subscriptions.len(),
            tables: self
                .channels
                .values()
                .map(|entry| format!("{}.{}", entry.schema, entry.table))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SubscriptionStats {
    /// Live subscription handles.
    pub subscriptions: usize,
    /// `schema.table` of every open channel, sorted by topic.
    pub tables: Vec<String>,
}

/// Handle for one `subscribe()` call. Unsubscribes when dropped.
pub struct Subscription {
    id: u64,
    hub: Arc<Hub>,
    active: bool,
}

impl Subscription {
    pub(crate) fn new(id: u64, hub: Arc<Hub>) -> Self {
        Subscription { id, hub, active: true }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if std::mem::take(&mut self.active) {
            self.hub.release(self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.active)
            .finish()
    }
}

#[cfg(test)]
#[path = "subscription_tests.rs"]
mod tests;
