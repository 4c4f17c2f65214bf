// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use asa_core::{Event, Task};

fn populated_state() -> MaterializedState {
    let mut state = MaterializedState::default();
    state.apply_event(&Event::TaskCreated {
        task: Task::test_task("t-1"),
    });
    state
}

#[test]
fn save_and_load_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.snapshot");

    Snapshot {
        seq: 42,
        state: populated_state(),
    }
    .save(&path)
    .unwrap();

    let loaded = Snapshot::load(&path).unwrap();
    assert_eq!(loaded.seq, 42);
    assert!(loaded.state.get_task("t-1").is_some());
}

#[test]
fn missing_snapshot_yields_fresh_state() {
    let dir = tempfile::tempdir().unwrap();
    let loaded = Snapshot::load(&dir.path().join("absent.snapshot")).unwrap();
    assert_eq!(loaded.seq, 0);
    assert!(loaded.state.tasks.is_empty());
}

#[test]
fn corrupt_snapshot_is_rotated_and_fresh_state_returned() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.snapshot");
    std::fs::write(&path, b"not a zstd stream").unwrap();

    let loaded = Snapshot::load(&path).unwrap();
    assert_eq!(loaded.seq, 0);
    assert!(path.with_extension("bak").exists());
    assert!(!path.exists());
}

#[test]
fn save_overwrites_atomically() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.snapshot");

    Snapshot {
        seq: 1,
        state: MaterializedState::default(),
    }
    .save(&path)
    .unwrap();
    Snapshot {
        seq: 2,
        state: populated_state(),
    }
    .save(&path)
    .unwrap();

    let loaded = Snapshot::load(&path).unwrap();
    assert_eq!(loaded.seq, 2);
    assert!(!path.with_extension("tmp").exists());
}

#[test]
fn rotate_bak_path_avoids_clobbering() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.snapshot");
    let first = rotate_bak_path(&path);
    assert_eq!(first, path.with_extension("bak"));

    std::fs::write(&first, b"occupied").unwrap();
    let second = rotate_bak_path(&path);
    assert_eq!(second, path.with_extension("bak.1"));
}
