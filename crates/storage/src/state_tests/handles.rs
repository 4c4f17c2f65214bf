// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn pushed_creates_queued_handle_and_links_task() {
    let mut state = MaterializedState::default();
    state.apply_event(&task_created_event("t-1"));
    state.apply_event(&pushed_event("h-1", "t-1", Some("alice")));

    let handle = state.get_handle("h-1").unwrap();
    assert_eq!(handle.status, HandleStatus::Queued);
    assert_eq!(handle.principal.as_deref(), Some("alice"));
    assert_eq!(
        state.get_task("t-1").unwrap().handle_id.as_ref().unwrap(),
        "h-1"
    );
}

#[test]
fn taken_marks_running_with_start_time() {
    let mut state = MaterializedState::default();
    state.apply_event(&pushed_event("h-1", "t-1", None));
    state.apply_event(&Event::QueueTaken {
        handle_id: JobHandleId::new("h-1"),
        epoch_ms: 2_000_000,
    });

    let handle = state.get_handle("h-1").unwrap();
    assert_eq!(handle.status, HandleStatus::Running);
    assert_eq!(handle.started_at_epoch_ms, Some(2_000_000));
}

#[test]
fn released_records_outcome_and_finish_time() {
    let mut state = MaterializedState::default();
    state.apply_event(&pushed_event("h-1", "t-1", None));
    state.apply_event(&Event::QueueTaken {
        handle_id: JobHandleId::new("h-1"),
        epoch_ms: 2_000_000,
    });
    state.apply_event(&Event::QueueReleased {
        handle_id: JobHandleId::new("h-1"),
        status: HandleStatus::Failed,
        epoch_ms: 2_000_500,
    });

    let handle = state.get_handle("h-1").unwrap();
    assert_eq!(handle.status, HandleStatus::Failed);
    assert_eq!(handle.finished_at_epoch_ms, Some(2_000_500));
}

#[test]
fn cancelled_is_terminal() {
    let mut state = MaterializedState::default();
    state.apply_event(&pushed_event("h-1", "t-1", None));
    state.apply_event(&Event::QueueCancelled {
        handle_id: JobHandleId::new("h-1"),
        epoch_ms: 2_000_000,
    });

    let handle = state.get_handle("h-1").unwrap();
    assert_eq!(handle.status, HandleStatus::Cancelled);
    assert!(handle.status.is_terminal());
}

#[test]
fn purged_removes_handle() {
    let mut state = MaterializedState::default();
    state.apply_event(&pushed_event("h-1", "t-1", None));
    state.apply_event(&Event::QueuePurged {
        handle_id: JobHandleId::new("h-1"),
    });
    assert!(state.get_handle("h-1").is_none());
}

// ── Counters ─────────────────────────────────────────────────────────────────

#[test]
fn queued_and_running_counts() {
    let mut state = MaterializedState::default();
    state.apply_event(&pushed_event("h-1", "t-1", None));
    state.apply_event(&pushed_event("h-2", "t-2", None));
    state.apply_event(&pushed_event("h-3", "t-3", None));
    state.apply_event(&Event::QueueTaken {
        handle_id: JobHandleId::new("h-1"),
        epoch_ms: 2_000_000,
    });

    assert_eq!(state.queued_count(), 2);
    assert_eq!(state.running_count(), 1);
}

#[test]
fn principal_active_counts_queued_and_running_only() {
    let mut state = MaterializedState::default();
    state.apply_event(&pushed_event("h-1", "t-1", Some("alice")));
    state.apply_event(&pushed_event("h-2", "t-2", Some("alice")));
    state.apply_event(&pushed_event("h-3", "t-3", Some("bob")));
    state.apply_event(&Event::QueueTaken {
        handle_id: JobHandleId::new("h-1"),
        epoch_ms: 2_000_000,
    });
    state.apply_event(&Event::QueueReleased {
        handle_id: JobHandleId::new("h-2"),
        status: HandleStatus::Finished,
        epoch_ms: 2_000_100,
    });

    // h-1 running counts, h-2 finished does not
    assert_eq!(state.principal_active_count("alice"), 1);
    assert_eq!(state.principal_active_count("bob"), 1);
    assert_eq!(state.principal_active_count("carol"), 0);
}
