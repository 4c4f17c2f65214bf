// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn submit_request_parses_minimal_payload() {
    let request: SubmitRequest = serde_json::from_str(
        r#"{"repo_url": "https://x/r.git", "bug_description": "crash"}"#,
    )
    .unwrap();
    assert!(request.test_command.is_none());
    assert_eq!(request.priority, Priority::Normal);
}

#[test]
fn submit_request_accepts_priority() {
    let request: SubmitRequest = serde_json::from_str(
        r#"{"repo_url": "https://x/r.git", "bug_description": "crash", "priority": "high"}"#,
    )
    .unwrap();
    assert_eq!(request.priority, Priority::High);
}

#[test]
fn task_detail_round_trips() {
    let detail: TaskDetail = Task::test_task("t-1").into();
    let json = serde_json::to_string(&detail).unwrap();
    let restored: TaskDetail = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, detail);
}

#[test]
fn progress_map_pins_terminals() {
    assert_eq!(progress_percentage(TaskState::Completed), 100);
    assert_eq!(progress_percentage(TaskState::Failed), 0);
    assert_eq!(progress_percentage(TaskState::Timeout), 0);
    assert_eq!(progress_percentage(TaskState::Cancelled), 0);
}

#[test]
fn progress_is_monotone_along_the_happy_path() {
    let path = [
        TaskState::Queued,
        TaskState::Init,
        TaskState::CloningRepo,
        TaskState::IndexingCode,
        TaskState::RunningTestsBeforeFix,
        TaskState::GeneratingFix,
        TaskState::RunningTestsAfterFix,
        TaskState::CreatingPrBranch,
        TaskState::Completed,
    ];
    for window in path.windows(2) {
        assert!(
            progress_percentage(window[0]) < progress_percentage(window[1]),
            "{} -> {} not monotone",
            window[0],
            window[1]
        );
    }
}

#[test]
fn task_message_uses_type_tags() {
    let message = TaskMessage::Final {
        task: Task::test_task("t-1").into(),
    };
    let json = serde_json::to_value(&message).unwrap();
    assert_eq!(json["type"], "final");
    assert_eq!(json["task"]["id"], "t-1");
}
