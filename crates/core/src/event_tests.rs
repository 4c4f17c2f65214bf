// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::task::Task;

#[test]
fn events_serialize_with_type_tag() {
    let event = Event::TaskStatus {
        id: TaskId::new("t-1"),
        status: TaskState::CloningRepo,
        epoch_ms: 1_000,
    };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], "task:status");
    assert_eq!(json["status"], "CLONING_REPO");
}

#[test]
fn events_round_trip() {
    let events = vec![
        Event::TaskCreated {
            task: Task::test_task("t-1"),
        },
        Event::TaskLog {
            id: TaskId::new("t-1"),
            line: "cloning".to_string(),
            epoch_ms: 5,
        },
        Event::QueueReleased {
            handle_id: JobHandleId::new("h-1"),
            status: HandleStatus::Finished,
            epoch_ms: 9,
        },
    ];
    for event in events {
        let json = serde_json::to_string(&event).unwrap();
        let restored: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, event);
    }
}

#[test]
fn unknown_tag_deserializes_to_unknown() {
    let restored: Event =
        serde_json::from_str(r#"{"type": "future:event", "field": 1}"#).unwrap();
    assert_eq!(restored, Event::Unknown);
}

#[test]
fn task_id_extraction() {
    let event = Event::TaskBranch {
        id: TaskId::new("t-7"),
        branch: "asa/fix-t-7".to_string(),
        epoch_ms: 1,
    };
    assert_eq!(event.task_id().map(|t| t.as_str()), Some("t-7"));

    let event = Event::QueueTaken {
        handle_id: JobHandleId::new("h-1"),
        epoch_ms: 1,
    };
    assert!(event.task_id().is_none());
}

#[test]
fn log_summary_is_compact() {
    let event = Event::TaskStatus {
        id: TaskId::new("t-1"),
        status: TaskState::Completed,
        epoch_ms: 1,
    };
    assert_eq!(event.log_summary(), "task:status t-1 -> COMPLETED");
}
