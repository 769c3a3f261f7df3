// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use serde_json::json;
use yare::parameterized;

#[parameterized(
    network = { RemoteError::Network("reset".into()), true },
    timeout = { RemoteError::Timeout, true },
    unavailable = { RemoteError::Unavailable("503".into()), true },
    rejected = { RemoteError::Rejected("schema".into()), false },
)]
fn transient_classification(err: RemoteError, transient: bool) {
    assert_eq!(err.is_transient(), transient);
}

#[test]
fn submission_carries_action_fields() {
    let action = PendingAction {
        id: "act-1".into(),
        seq: 1,
        kind: ActionKind::Update,
        key: EntityKey::new("site_visit", "S1"),
        payload: json!({"status": "completed"}),
        base_version: Some(3),
        created_at: Utc::now(),
        attempt_count: 0,
        last_error: None,
    };
    let submission = Submission::from_action(&action, action.base_version);
    assert_eq!(submission.expected_version, Some(3));
    assert!(!submission.force);
    assert_eq!(submission.client_timestamp, action.created_at);

    let forced = submission.forced(7);
    assert_eq!(forced.expected_version, Some(7));
    assert!(forced.force);
}
