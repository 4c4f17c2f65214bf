// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

// ── Creation and status ──────────────────────────────────────────────────────

#[test]
fn created_inserts_task() {
    let mut state = MaterializedState::default();
    state.apply_event(&task_created_event("t-1"));

    let task = state.get_task("t-1").unwrap();
    assert_eq!(task.status, TaskState::Queued);
}

#[test]
fn created_twice_keeps_first_write() {
    let mut state = MaterializedState::default();
    state.apply_event(&task_created_event("t-1"));
    state.apply_event(&status_event("t-1", TaskState::CloningRepo, 2_000_000));

    // Replay artifact: re-applying creation must not reset progress
    state.apply_event(&task_created_event("t-1"));
    assert_eq!(state.get_task("t-1").unwrap().status, TaskState::CloningRepo);
}

#[test]
fn status_change_bumps_updated_at() {
    let mut state = MaterializedState::default();
    state.apply_event(&task_created_event("t-1"));
    let before = state.get_task("t-1").unwrap().updated_at_epoch_ms;

    state.apply_event(&status_event("t-1", TaskState::Init, 2_000_000));
    let task = state.get_task("t-1").unwrap();
    assert_eq!(task.status, TaskState::Init);
    assert!(task.updated_at_epoch_ms > before);
}

#[test]
fn same_status_is_noop() {
    let mut state = MaterializedState::default();
    state.apply_event(&task_created_event("t-1"));
    state.apply_event(&status_event("t-1", TaskState::Init, 2_000_000));
    let updated = state.get_task("t-1").unwrap().updated_at_epoch_ms;

    state.apply_event(&status_event("t-1", TaskState::Init, 2_000_000));
    assert_eq!(state.get_task("t-1").unwrap().updated_at_epoch_ms, updated);
}

#[test]
fn status_for_unknown_task_is_noop() {
    let mut state = MaterializedState::default();
    state.apply_event(&status_event("ghost", TaskState::Init, 2_000_000));
    assert!(state.get_task("ghost").is_none());
}

// ── Field events ─────────────────────────────────────────────────────────────

#[test]
fn workspace_is_write_once() {
    let mut state = MaterializedState::default();
    state.apply_event(&task_created_event("t-1"));
    state.apply_event(&Event::TaskWorkspace {
        id: TaskId::new("t-1"),
        path: PathBuf::from("/work/a"),
        epoch_ms: 2_000_000,
    });
    state.apply_event(&Event::TaskWorkspace {
        id: TaskId::new("t-1"),
        path: PathBuf::from("/work/b"),
        epoch_ms: 2_000_001,
    });

    assert_eq!(
        state.get_task("t-1").unwrap().workspace_path.as_deref(),
        Some(std::path::Path::new("/work/a"))
    );
}

#[test]
fn log_lines_accumulate() {
    let mut state = MaterializedState::default();
    state.apply_event(&task_created_event("t-1"));
    state.apply_event(&Event::TaskLog {
        id: TaskId::new("t-1"),
        line: "cloning".to_string(),
        epoch_ms: 2_000_000,
    });
    state.apply_event(&Event::TaskLog {
        id: TaskId::new("t-1"),
        line: "indexing".to_string(),
        epoch_ms: 2_000_001,
    });

    let task = state.get_task("t-1").unwrap();
    assert_eq!(task.logs.lines().count(), 2);
    assert!(task.logs.contains("indexing"));
}

#[test]
fn branch_and_pr_and_test_output_recorded() {
    let mut state = MaterializedState::default();
    state.apply_event(&task_created_event("t-1"));
    state.apply_event(&Event::TaskBranch {
        id: TaskId::new("t-1"),
        branch: "asa/fix-t-1".to_string(),
        epoch_ms: 2_000_000,
    });
    state.apply_event(&Event::TaskPr {
        id: TaskId::new("t-1"),
        url: "https://forge/pr/1".to_string(),
        epoch_ms: 2_000_001,
    });
    state.apply_event(&Event::TaskTestOutput {
        id: TaskId::new("t-1"),
        output: "2 failed".to_string(),
        epoch_ms: 2_000_002,
    });

    let task = state.get_task("t-1").unwrap();
    assert_eq!(task.branch_name.as_deref(), Some("asa/fix-t-1"));
    assert_eq!(task.pr_url.as_deref(), Some("https://forge/pr/1"));
    assert_eq!(task.test_output.as_deref(), Some("2 failed"));
}

#[test]
fn state_round_trips_through_serde() {
    let mut state = MaterializedState::default();
    state.apply_event(&task_created_event("t-1"));
    state.apply_event(&pushed_event("h-1", "t-1", Some("alice")));
    state.apply_event(&usage_event("t-1", 500, 0.01, 2_000_000));

    let json = serde_json::to_string(&state).unwrap();
    let restored: MaterializedState = serde_json::from_str(&json).unwrap();
    assert_eq!(restored.tasks.len(), 1);
    assert_eq!(restored.handles.len(), 1);
    assert_eq!(restored.task_usage("t-1").total_tokens, 500);
}
