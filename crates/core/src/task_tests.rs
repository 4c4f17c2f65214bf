// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::error::ErrorKind;
use crate::state::TaskState;
use std::path::Path;

// ── Submission validation ────────────────────────────────────────────────────

#[test]
fn valid_submission_is_trimmed() {
    let sub = Submission::validate(
        "  https://github.com/acme/repo.git  ",
        "  crash on empty input ",
        Some("pytest -x"),
        Some("alice"),
        Priority::Normal,
    )
    .unwrap();
    assert_eq!(sub.repo_url, "https://github.com/acme/repo.git");
    assert_eq!(sub.bug_description, "crash on empty input");
    assert_eq!(sub.test_command.as_deref(), Some("pytest -x"));
    assert_eq!(sub.principal.as_deref(), Some("alice"));
}

#[test]
fn empty_repo_url_rejected() {
    let err = Submission::validate("   ", "bug", None, None, Priority::Normal).unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidInput);
}

#[test]
fn empty_bug_description_rejected() {
    let err = Submission::validate("https://x/r.git", "", None, None, Priority::Normal).unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidInput);
}

#[test]
fn schemeless_url_rejected() {
    let err =
        Submission::validate("acme/repo", "bug", None, None, Priority::Normal).unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidRepoUrl);
    assert_eq!(err.details.get("repo_url").unwrap(), "acme/repo");
}

#[test]
fn ssh_and_file_urls_accepted() {
    assert!(Submission::validate("git@github.com:a/r.git", "bug", None, None, Priority::Normal)
        .is_ok());
    assert!(Submission::validate("file:///tmp/repo", "bug", None, None, Priority::Normal).is_ok());
}

#[test]
fn blank_optional_fields_become_none() {
    let sub =
        Submission::validate("https://x/r.git", "bug", Some("  "), Some(""), Priority::High)
            .unwrap();
    assert!(sub.test_command.is_none());
    assert!(sub.principal.is_none());
}

// ── Task invariants ──────────────────────────────────────────────────────────

#[test]
fn new_task_starts_queued() {
    let task = Task::test_task("t-1");
    assert_eq!(task.status, TaskState::Queued);
    assert!(!task.is_terminal());
    assert_eq!(task.created_at_epoch_ms, task.updated_at_epoch_ms);
}

#[test]
fn touch_strictly_increases_even_with_frozen_clock() {
    let mut task = Task::test_task("t-1");
    let first = task.updated_at_epoch_ms;
    task.touch(first); // same clock reading
    assert!(task.updated_at_epoch_ms > first);
    let second = task.updated_at_epoch_ms;
    task.touch(first);
    assert!(task.updated_at_epoch_ms > second);
}

#[test]
fn workspace_path_is_write_once() {
    let mut task = Task::test_task("t-1");
    task.set_workspace_path(PathBuf::from("/work/t-1"), 2_000_000);
    task.set_workspace_path(PathBuf::from("/work/other"), 2_000_001);
    assert_eq!(task.workspace_path.as_deref(), Some(Path::new("/work/t-1")));
}

#[test]
fn append_log_accumulates_lines() {
    let mut task = Task::test_task("t-1");
    task.append_log("starting", 2_000_000);
    task.append_log("cloning", 2_000_001);
    let lines: Vec<&str> = task.logs.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("starting"));
    assert!(lines[1].starts_with("[2000001]"));
}

#[test]
fn log_tail_returns_last_n_lines() {
    let mut task = Task::test_task("t-1");
    for i in 0..10 {
        task.append_log(&format!("line {i}"), 2_000_000 + i);
    }
    let tail = task.log_tail(Some(3));
    assert_eq!(tail.lines().count(), 3);
    assert!(tail.contains("line 9"));
    assert!(!tail.contains("line 6"));

    assert_eq!(task.log_tail(None).lines().count(), 10);
}

#[test]
fn task_round_trips_through_serde() {
    let mut task = Task::test_task("t-1");
    task.set_workspace_path(PathBuf::from("/work/t-1"), 2_000_000);
    task.append_log("hello", 2_000_001);
    let json = serde_json::to_string(&task).unwrap();
    let restored: Task = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, task);
}
