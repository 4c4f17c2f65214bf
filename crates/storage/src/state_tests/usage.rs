// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn usage_accumulates_per_task() {
    let mut state = MaterializedState::default();
    state.apply_event(&usage_event("t-1", 1_000, 0.02, 2_000_000));
    state.apply_event(&usage_event("t-1", 500, 0.01, 2_000_100));
    state.apply_event(&usage_event("t-2", 9_000, 0.20, 2_000_200));

    let usage = state.task_usage("t-1");
    assert_eq!(usage.total_tokens, 1_500);
    assert!((usage.total_cost_usd - 0.03).abs() < 1e-9);

    assert_eq!(state.task_usage("t-2").total_tokens, 9_000);
    assert_eq!(state.task_usage("t-404").total_tokens, 0);
}

#[test]
fn duplicate_replayed_record_is_dropped() {
    let mut state = MaterializedState::default();
    let event = usage_event("t-1", 1_000, 0.02, 2_000_000);
    state.apply_event(&event);
    state.apply_event(&event);

    assert_eq!(state.task_usage_records("t-1").len(), 1);
}

#[test]
fn error_records_count_tokens_but_not_calls() {
    let mut state = MaterializedState::default();
    state.apply_event(&usage_event("t-1", 1_000, 0.02, 2_000_000));

    let mut errored = match usage_event("t-1", 0, 0.0, 2_000_100) {
        Event::UsageRecorded { record } => record,
        _ => unreachable!(),
    };
    errored.status = UsageStatus::Error;
    errored.error = Some("rate limit".to_string());
    state.apply_event(&Event::UsageRecorded { record: errored });

    let counts = state.task_call_counts("t-1");
    assert_eq!(counts.get("fix_generation"), Some(&1));
    assert_eq!(state.task_usage_records("t-1").len(), 2);
}

#[test]
fn principal_cost_respects_window() {
    let mut state = MaterializedState::default();
    state.apply_event(&usage_event("t-1", 100, 0.10, 1_000));
    state.apply_event(&usage_event("t-2", 100, 0.25, 5_000));

    // Records are attributed to principal "alice" by the fixture
    assert!((state.principal_cost_since("alice", 0) - 0.35).abs() < 1e-9);
    assert!((state.principal_cost_since("alice", 2_000) - 0.25).abs() < 1e-9);
    assert_eq!(state.principal_cost_since("bob", 0), 0.0);
}
