// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use asa_core::{Event, Task, TaskId, TaskState};

const POLL: Duration = Duration::from_millis(10);

fn open_store() -> (tempfile::TempDir, Store) {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(dir.path()).unwrap();
    (dir, store)
}

fn seed_task(store: &Store, id: &str) {
    store
        .commit(Event::TaskCreated {
            task: Task::test_task(id),
        })
        .unwrap();
}

#[tokio::test]
async fn stream_starts_with_snapshot() {
    let (_dir, store) = open_store();
    seed_task(&store, "t-1");

    let mut rx = watch_task(store, "t-1".to_string(), POLL);
    match rx.recv().await.unwrap() {
        TaskMessage::Snapshot { task } => assert_eq!(task.id, "t-1"),
        other => panic!("expected snapshot, got {other:?}"),
    }
}

#[tokio::test]
async fn updates_follow_task_mutations() {
    let (_dir, store) = open_store();
    seed_task(&store, "t-1");

    let mut rx = watch_task(store.clone(), "t-1".to_string(), POLL);
    let _snapshot = rx.recv().await.unwrap();

    store
        .commit(Event::TaskStatus {
            id: TaskId::new("t-1"),
            status: TaskState::CloningRepo,
            epoch_ms: 2_000_000,
        })
        .unwrap();

    match rx.recv().await.unwrap() {
        TaskMessage::Update { task } => assert_eq!(task.status, TaskState::CloningRepo),
        other => panic!("expected update, got {other:?}"),
    }
}

#[tokio::test]
async fn terminal_state_sends_final_and_closes() {
    let (_dir, store) = open_store();
    seed_task(&store, "t-1");

    let mut rx = watch_task(store.clone(), "t-1".to_string(), POLL);
    let _snapshot = rx.recv().await.unwrap();

    store
        .commit(Event::TaskStatus {
            id: TaskId::new("t-1"),
            status: TaskState::Completed,
            epoch_ms: 2_000_000,
        })
        .unwrap();

    match rx.recv().await.unwrap() {
        TaskMessage::Final { task } => assert_eq!(task.status, TaskState::Completed),
        other => panic!("expected final, got {other:?}"),
    }
    // Connection closes on terminal
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn already_terminal_task_gets_snapshot_then_final() {
    let (_dir, store) = open_store();
    seed_task(&store, "t-1");
    store
        .commit(Event::TaskStatus {
            id: TaskId::new("t-1"),
            status: TaskState::Failed,
            epoch_ms: 2_000_000,
        })
        .unwrap();

    let mut rx = watch_task(store, "t-1".to_string(), POLL);
    assert!(matches!(
        rx.recv().await.unwrap(),
        TaskMessage::Snapshot { .. }
    ));
    assert!(matches!(rx.recv().await.unwrap(), TaskMessage::Final { .. }));
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn unknown_task_closes_immediately() {
    let (_dir, store) = open_store();
    let mut rx = watch_task(store, "ghost".to_string(), POLL);
    assert!(rx.recv().await.is_none());
}
