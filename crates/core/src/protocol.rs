// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Change-stream protocol messages exchanged over the realtime connection.
//!
//! One physical connection carries many logical channels, one per
//! `(schema, table)`:
//! - Client joins and leaves channels and sends heartbeats
//! - Server acknowledges joins, pushes row changes and closes channels

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Returns the channel topic for a table.
pub fn channel_topic(schema: &str, table: &str) -> String {
    format!("realtime:{schema}.{table}")
}

/// Frames sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Subscribe the connection to a table's changes.
    Join {
        topic: String,
        schema: String,
        table: String,
    },

    /// Stop receiving a channel's changes.
    Leave { topic: String },

    /// Keepalive; the server answers with `HeartbeatAck`.
    Heartbeat {
        /// Client-chosen ID echoed in the ack.
        id: u64,
    },
}

/// Frames sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// The channel is live.
    JoinOk { topic: String },

    /// The channel could not be joined.
    JoinError { topic: String, message: String },

    /// A row changed in a joined table.
    Change { topic: String, change: RawChange },

    /// The server dropped the channel.
    ChannelClosed { topic: String, reason: String },

    /// Answer to a client heartbeat.
    HeartbeatAck { id: u64 },
}

/// A row change as it appears on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawChange {
    pub schema: String,
    pub table: String,
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_timestamp: Option<DateTime<Utc>>,
}

/// Kind of row change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Insert,
    Update,
    Delete,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Insert => "insert",
            EventType::Update => "update",
            EventType::Delete => "delete",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EventType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "insert" => Ok(EventType::Insert),
            "update" => Ok(EventType::Update),
            "delete" => Ok(EventType::Delete),
            _ => Err(Error::InvalidInput(format!("unknown change event type '{s}'"))),
        }
    }
}

/// The row data carried by a change, by kind.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeRow {
    Insert { new: Map<String, Value> },
    Update { old: Map<String, Value>, new: Map<String, Value> },
    Delete { old: Map<String, Value> },
}

/// A validated row change.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub schema: String,
    pub table: String,
    pub commit_timestamp: Option<DateTime<Utc>>,
    pub row: ChangeRow,
}

impl ChangeEvent {
    pub fn event_type(&self) -> EventType {
        match self.row {
            ChangeRow::Insert { .. } => EventType::Insert,
            ChangeRow::Update { .. } => EventType::Update,
            ChangeRow::Delete { .. } => EventType::Delete,
        }
    }

    /// Row state after the change (absent for deletes).
    pub fn new_row(&self) -> Option<&Map<String, Value>> {
        match &self.row {
            ChangeRow::Insert { new } | ChangeRow::Update { new, .. } => Some(new),
            ChangeRow::Delete { .. } => None,
        }
    }

    /// Row state before the change (absent for inserts).
    pub fn old_row(&self) -> Option<&Map<String, Value>> {
        match &self.row {
            ChangeRow::Update { old, .. } | ChangeRow::Delete { old } => Some(old),
            ChangeRow::Insert { .. } => None,
        }
    }
}

fn into_object(value: Option<Value>, side: &str, event: EventType) -> Result<Map<String, Value>> {
    match value {
        Some(Value::Object(map)) => Ok(map),
        Some(Value::Null) | None => Err(Error::InvalidInput(format!(
            "{event} change is missing its {side} row"
        ))),
        Some(other) => Err(Error::InvalidInput(format!(
            "{event} change has a non-object {side} row: {other}"
        ))),
    }
}

impl TryFrom<RawChange> for ChangeEvent {
    type Error = Error;

    fn try_from(raw: RawChange) -> Result<Self> {
        let event_type: EventType = raw.event_type.parse()?;
        let row = match event_type {
            EventType::Insert => ChangeRow::Insert {
                new: into_object(raw.new, "new", event_type)?,
            },
            EventType::Update => ChangeRow::Update {
                // Old rows are only sent when the table publishes them.
                old: into_object(raw.old, "old", event_type).unwrap_or_default(),
                new: into_object(raw.new, "new", event_type)?,
            },
            EventType::Delete => ChangeRow::Delete {
                old: into_object(raw.old, "old", event_type)?,
            },
        };
        Ok(ChangeEvent {
            schema: raw.schema,
            table: raw.table,
            commit_timestamp: raw.commit_timestamp,
            row,
        })
    }
}

impl ClientFrame {
    /// Creates a Join frame for a table.
    pub fn join(schema: &str, table: &str) -> Self {
        ClientFrame::Join {
            topic: channel_topic(schema, table),
            schema: schema.to_string(),
            table: table.to_string(),
        }
    }

    /// Creates a Leave frame.
    pub fn leave(topic: impl Into<String>) -> Self {
        ClientFrame::Leave {
            topic: topic.into(),
        }
    }

    /// Creates a Heartbeat frame.
    pub fn heartbeat(id: u64) -> Self {
        ClientFrame::Heartbeat { id }
    }

    /// Serializes the frame to JSON.
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes the frame from JSON.
    pub fn from_json(s: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerFrame {
    /// Creates a JoinOk frame.
    pub fn join_ok(topic: impl Into<String>) -> Self {
        ServerFrame::JoinOk {
            topic: topic.into(),
        }
    }

    /// Creates a JoinError frame.
    pub fn join_error(topic: impl Into<String>, message: impl Into<String>) -> Self {
        ServerFrame::JoinError {
            topic: topic.into(),
            message: message.into(),
        }
    }

    /// Creates a Change frame.
    pub fn change(topic: impl Into<String>, change: RawChange) -> Self {
        ServerFrame::Change {
            topic: topic.into(),
            change,
        }
    }

    /// Creates a ChannelClosed frame.
    pub fn channel_closed(topic: impl Into<String>, reason: impl Into<String>) -> Self {
        ServerFrame::ChannelClosed {
            topic: topic.into(),
            reason: reason.into(),
        }
    }

    /// Creates a HeartbeatAck frame.
    pub fn heartbeat_ack(id: u64) -> Self {
        ServerFrame::HeartbeatAck { id }
    }

    /// The channel topic this frame belongs to, if any.
    pub fn topic(&self) -> Option<&str> {
        match self {
            ServerFrame::JoinOk { topic }
            | ServerFrame::JoinError { topic, .. }
            | ServerFrame::Change { topic, .. }
            | ServerFrame::ChannelClosed { topic, .. } => Some(topic),
            ServerFrame::HeartbeatAck { .. } => None,
        }
    }

    /// Serializes the frame to JSON.
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes the frame from JSON.
    pub fn from_json(s: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
