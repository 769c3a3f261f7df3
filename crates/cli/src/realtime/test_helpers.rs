// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for realtime module tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use fieldops_core::protocol::{ChangeEvent, ClientFrame, RawChange, ServerFrame};
use serde_json::{json, Map, Value};
use tokio::sync::Notify;

use super::subscription::{ChangeHandler, HandlerResult};
use super::transport::{Transport, TransportError, TransportResult};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// How the scripted server answers a join.
#[derive(Debug, Clone, PartialEq)]
pub enum JoinReply {
    Accept,
    Reject(String),
    Ignore,
}

enum Incoming {
    Frame(ServerFrame),
    Close,
}

struct Link {
    incoming: Mutex<VecDeque<Incoming>>,
    arrived: Notify,
    sent: Mutex<Vec<ClientFrame>>,
    connects: Mutex<u32>,
    failing_connects: Mutex<u32>,
    join_reply: Mutex<JoinReply>,
    ack_heartbeats: Mutex<bool>,
}

/// Test-side controls for a [`MockTransport`].
#[derive(Clone)]
pub struct MockServer {
    link: Arc<Link>,
}

impl MockServer {
    pub fn new() -> Self {
        MockServer {
            link: Arc::new(Link {
                incoming: Mutex::new(VecDeque::new()),
                arrived: Notify::new(),
                sent: Mutex::new(Vec::new()),
                connects: Mutex::new(0),
                failing_connects: Mutex::new(0),
                join_reply: Mutex::new(JoinReply::Accept),
                ack_heartbeats: Mutex::new(true),
            }),
        }
    }

    /// A transport connected to this server.
    pub fn transport(&self) -> Box<dyn Transport> {
        Box::new(MockTransport {
            link: Arc::clone(&self.link),
            connected: false,
        })
    }

    pub fn push(&self, frame: ServerFrame) {
        lock(&self.link.incoming).push_back(Incoming::Frame(frame));
        self.link.arrived.notify_one();
    }

    /// Close the connection from the server side.
    pub fn drop_connection(&self) {
        lock(&self.link.incoming).push_back(Incoming::Close);
        self.link.arrived.notify_one();
    }

    /// Fail the next `n` connects.
    pub fn fail_connects(&self, n: u32) {
        *lock(&self.link.failing_connects) = n;
    }

    pub fn set_join_reply(&self, reply: JoinReply) {
        *lock(&self.link.join_reply) = reply;
    }

    pub fn set_ack_heartbeats(&self, ack: bool) {
        *lock(&self.link.ack_heartbeats) = ack;
    }

    pub fn sent(&self) -> Vec<ClientFrame> {
        lock(&self.link.sent).clone()
    }

    pub fn joins(&self, topic: &str) -> usize {
        self.sent()
            .iter()
            .filter(|frame| matches!(frame, ClientFrame::Join { topic: t, .. } if t == topic))
            .count()
    }

    pub fn leaves(&self, topic: &str) -> usize {
        self.sent()
            .iter()
            .filter(|frame| matches!(frame, ClientFrame::Leave { topic: t } if t == topic))
            .count()
    }

    pub fn heartbeats(&self) -> usize {
        self.sent()
            .iter()
            .filter(|frame| matches!(frame, ClientFrame::Heartbeat { .. }))
            .count()
    }

    pub fn connects(&self) -> u32 {
        *lock(&self.link.connects)
    }
}

struct MockTransport {
    link: Arc<Link>,
    connected: bool,
}

impl Transport for MockTransport {
    fn connect(&mut self, _url: &str) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + '_>> {
        Box::pin(async move {
            *lock(&self.link.connects) += 1;
            {
                let mut failing = lock(&self.link.failing_connects);
                if *failing > 0 {
                    *failing -= 1;
                    return Err(TransportError::ConnectionFailed("mock failure".into()));
                }
            }
            lock(&self.link.incoming).clear();
            self.connected = true;
            Ok(())
        })
    }

    fn disconnect(&mut self) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + '_>> {
        Box::pin(async move {
            self.connected = false;
            Ok(())
        })
    }

    fn send(&mut self, frame: ClientFrame) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + '_>> {
        Box::pin(async move {
            if !self.connected {
                return Err(TransportError::ConnectionClosed);
            }
            let reply = match &frame {
                ClientFrame::Join { topic, .. } => match lock(&self.link.join_reply).clone() {
                    JoinReply::Accept => Some(ServerFrame::join_ok(topic.as_str())),
                    JoinReply::Reject(message) => Some(ServerFrame::join_error(topic.as_str(), message)),
                    JoinReply::Ignore => None,
                },
                ClientFrame::Heartbeat { id } => {
                    (*lock(&self.link.ack_heartbeats)).then(|| ServerFrame::heartbeat_ack(*id))
                }
                ClientFrame::Leave { .. } => None,
            };
            lock(&self.link.sent).push(frame);
            if let Some(reply) = reply {
                lock(&self.link.incoming).push_back(Incoming::Frame(reply));
                self.link.arrived.notify_one();
            }
            Ok(())
        })
    }

    fn recv(&mut self) -> Pin<Box<dyn Future<Output = TransportResult<Option<ServerFrame>>> + Send + '_>> {
        Box::pin(async move {
            loop {
                if !self.connected {
                    return Err(TransportError::ConnectionClosed);
                }
                let next = lock(&self.link.incoming).pop_front();
                match next {
                    Some(Incoming::Frame(frame)) => return Ok(Some(frame)),
                    Some(Incoming::Close) => {
                        self.connected = false;
                        return Ok(None);
                    }
                    None => self.link.arrived.notified().await,
                }
            }
        })
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

/// A change on `public.{table}`.
pub fn change(table: &str, event_type: &str, old: Option<Value>, new: Option<Value>) -> RawChange {
    RawChange {
        schema: "public".to_string(),
        table: table.to_string(),
        event_type: event_type.to_string(),
        old,
        new,
        commit_timestamp: None,
    }
}

pub fn insert(table: &str, new: Value) -> RawChange {
    change(table, "insert", None, Some(new))
}

pub fn row(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

pub fn visit_row(id: &str, agent: &str) -> Value {
    json!({ "id": id, "agent_id": agent, "status": "scheduled" })
}

/// Handler that records what it saw.
#[derive(Default)]
pub struct RecordingHandler {
    pub events: Mutex<Vec<ChangeEvent>>,
    pub inserts: Mutex<Vec<Map<String, Value>>>,
    pub updates: Mutex<Vec<(Map<String, Value>, Map<String, Value>)>>,
    pub deletes: Mutex<Vec<Map<String, Value>>>,
}

impl RecordingHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(RecordingHandler::default())
    }

    pub fn count(&self) -> usize {
        lock(&self.events).len()
    }

    pub fn events(&self) -> Vec<ChangeEvent> {
        lock(&self.events).clone()
    }
}

impl ChangeHandler for RecordingHandler {
    fn on_insert(&self, new: &Map<String, Value>) -> HandlerResult {
        lock(&self.inserts).push(new.clone());
        Ok(())
    }

    fn on_update(&self, old: &Map<String, Value>, new: &Map<String, Value>) -> HandlerResult {
        lock(&self.updates).push((old.clone(), new.clone()));
        Ok(())
    }

    fn on_delete(&self, old: &Map<String, Value>) -> HandlerResult {
        lock(&self.deletes).push(old.clone());
        Ok(())
    }

    fn on_any(&self, event: &ChangeEvent) -> HandlerResult {
        lock(&self.events).push(event.clone());
        Ok(())
    }
}

/// Handler that always fails, by error or by panic.
pub struct BrokenHandler {
    pub panics: bool,
}

impl ChangeHandler for BrokenHandler {
    fn on_any(&self, _event: &ChangeEvent) -> HandlerResult {
        if self.panics {
            panic!("handler panicked");
        }
        Err("handler broke".into())
    }
}
