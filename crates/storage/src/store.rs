// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Store facade: WAL + materialized state + snapshots behind one handle.
//!
//! `commit` is the single write path: the event is durable in the WAL
//! before it is applied to the in-memory state, and both happen before
//! `commit` returns. Readers observe state through `with_state`.

use crate::snapshot::{Snapshot, SnapshotError};
use crate::state::MaterializedState;
use crate::wal::{Wal, WalError};
use asa_core::{Event, Task};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// WAL file name under the state directory.
const WAL_FILE: &str = "events.wal";
/// Snapshot file name under the state directory.
const SNAPSHOT_FILE: &str = "state.snapshot";

/// Errors from store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("WAL error: {0}")]
    Wal(#[from] WalError),
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
}

struct StoreInner {
    wal: Mutex<Wal>,
    state: Mutex<MaterializedState>,
    snapshot_path: PathBuf,
}

/// Shared handle to the durable store. Cheap to clone.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    /// Open the store under a state directory: load the snapshot, open the
    /// WAL, and replay entries recorded after the snapshot.
    pub fn open(state_dir: &Path) -> Result<Self, StoreError> {
        let snapshot_path = state_dir.join(SNAPSHOT_FILE);
        let snapshot = Snapshot::load(&snapshot_path)?;

        let wal = Wal::open(&state_dir.join(WAL_FILE))?;

        let mut state = snapshot.state;
        for entry in wal.entries_after(snapshot.seq)? {
            state.apply_event(&entry.event);
        }

        tracing::info!(
            state_dir = %state_dir.display(),
            snapshot_seq = snapshot.seq,
            wal_seq = wal.write_seq(),
            tasks = state.tasks.len(),
            "store opened",
        );

        Ok(Self {
            inner: Arc::new(StoreInner {
                wal: Mutex::new(wal),
                state: Mutex::new(state),
                snapshot_path,
            }),
        })
    }

    /// Durably record an event and apply it to the materialized state.
    ///
    /// The WAL append+fsync happens-before the state apply, which
    /// happens-before this returns.
    pub fn commit(&self, event: Event) -> Result<(), StoreError> {
        {
            let mut wal = self.inner.wal.lock();
            wal.append(&event)?;
            wal.flush()?;
        }
        self.inner.state.lock().apply_event(&event);
        Ok(())
    }

    /// Read from the materialized state under its lock.
    pub fn with_state<T>(&self, f: impl FnOnce(&MaterializedState) -> T) -> T {
        f(&self.inner.state.lock())
    }

    /// Get a task by id.
    pub fn task(&self, id: &str) -> Option<Task> {
        self.with_state(|state| state.get_task(id).cloned())
    }

    /// Save a snapshot of the current state and drop covered WAL entries.
    ///
    /// The WAL is truncated only after the snapshot is durable, so no data
    /// is lost on a crash during checkpoint. Returns the covered sequence.
    pub fn checkpoint(&self) -> Result<u64, StoreError> {
        let (state, seq) = {
            let state = self.inner.state.lock();
            let wal = self.inner.wal.lock();
            (state.clone(), wal.write_seq())
        };

        Snapshot { seq, state }.save(&self.inner.snapshot_path)?;
        self.inner.wal.lock().truncate_before(seq + 1)?;

        tracing::debug!(seq, "checkpoint complete");
        Ok(seq)
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
