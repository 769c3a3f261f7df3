// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use serde_json::json;
use yare::parameterized;

fn raw(event_type: &str, old: Option<Value>, new: Option<Value>) -> RawChange {
    RawChange {
        schema: "public".to_string(),
        table: "site_visits".to_string(),
        event_type: event_type.to_string(),
        old,
        new,
        commit_timestamp: None,
    }
}

#[test]
fn channel_topic_format() {
    assert_eq!(channel_topic("public", "site_visits"), "realtime:public.site_visits");
}

#[test]
fn client_frame_wire_format() {
    let json: Value = serde_json::from_str(&ClientFrame::join("public", "payments").to_json().unwrap()).unwrap();
    assert_eq!(json["type"], "join");
    assert_eq!(json["topic"], "realtime:public.payments");
    assert_eq!(json["table"], "payments");
}

#[parameterized(
    join_ok = { r#"{"type":"join_ok","topic":"realtime:public.a"}"#, Some("realtime:public.a") },
    join_error = { r#"{"type":"join_error","topic":"realtime:public.a","message":"denied"}"#, Some("realtime:public.a") },
    closed = { r#"{"type":"channel_closed","topic":"realtime:public.b","reason":"shutdown"}"#, Some("realtime:public.b") },
    ack = { r#"{"type":"heartbeat_ack","id":7}"#, None },
)]
fn server_frame_topic(json: &str, topic: Option<&str>) {
    let frame = ServerFrame::from_json(json).unwrap();
    assert_eq!(frame.topic(), topic);
}

#[test]
fn server_change_frame_parses() {
    let json = r#"{
        "type": "change",
        "topic": "realtime:public.site_visits",
        "change": {
            "schema": "public",
            "table": "site_visits",
            "event_type": "UPDATE",
            "old": {"id": "S1", "status": "scheduled"},
            "new": {"id": "S1", "status": "in_progress"},
            "commit_timestamp": "2026-02-03T10:00:00Z"
        }
    }"#;
    let ServerFrame::Change { change, .. } = ServerFrame::from_json(json).unwrap() else {
        unreachable!("expected change frame");
    };
    let event = ChangeEvent::try_from(change).unwrap();
    assert_eq!(event.event_type(), EventType::Update);
    assert_eq!(event.new_row().unwrap()["status"], "in_progress");
    assert_eq!(event.old_row().unwrap()["status"], "scheduled");
    assert!(event.commit_timestamp.is_some());
}

#[parameterized(
    insert = { "insert", None, Some(json!({"id": 1})), EventType::Insert },
    update_without_old = { "update", None, Some(json!({"id": 1})), EventType::Update },
    delete = { "DELETE", Some(json!({"id": 1})), None, EventType::Delete },
)]
fn change_event_from_raw(kind: &str, old: Option<Value>, new: Option<Value>, expected: EventType) {
    let event = ChangeEvent::try_from(raw(kind, old, new)).unwrap();
    assert_eq!(event.event_type(), expected);
}

#[parameterized(
    unknown_kind = { "truncate", None, Some(json!({})) },
    insert_without_new = { "insert", None, None },
    delete_without_old = { "delete", None, None },
    insert_scalar = { "insert", None, Some(json!(5)) },
)]
fn change_event_rejects_malformed(kind: &str, old: Option<Value>, new: Option<Value>) {
    assert!(ChangeEvent::try_from(raw(kind, old, new)).is_err());
}

#[test]
fn malformed_frame_is_an_error() {
    assert!(ServerFrame::from_json(r#"{"type":"mystery"}"#).is_err());
    assert!(ServerFrame::from_json("not json").is_err());
}
