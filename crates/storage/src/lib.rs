// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Durable storage for the asa service: event WAL, materialized state,
//! and compressed snapshots.

mod snapshot;
mod state;
mod store;
mod wal;

pub use snapshot::{Snapshot, SnapshotError};
pub use state::{MaterializedState, TaskUsage};
pub use store::{Store, StoreError};
pub use wal::{Wal, WalEntry, WalError};
