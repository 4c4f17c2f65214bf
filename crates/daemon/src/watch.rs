// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Push channel: a passive observer of the task row.
//!
//! A subscription streams an initial snapshot, an update whenever the
//! task's `updated_at` changes (polled at a small interval), and a single
//! final message when a terminal state is reached, then closes. There is
//! no coupling from the orchestrator to subscribers.

use crate::protocol::TaskMessage;
use asa_storage::Store;
use std::time::Duration;
use tokio::sync::mpsc;

/// Buffered messages per subscription; slow consumers drop the stream.
const CHANNEL_CAPACITY: usize = 32;

/// Subscribe to one task's lifecycle. The receiver closes when the task
/// reaches a terminal state or disappears.
pub fn watch_task(
    store: Store,
    task_id: String,
    poll_interval: Duration,
) -> mpsc::Receiver<TaskMessage> {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

    tokio::spawn(async move {
        let Some(task) = store.task(&task_id) else {
            return;
        };
        let mut last_updated = task.updated_at_epoch_ms;
        let terminal = task.is_terminal();

        if tx
            .send(TaskMessage::Snapshot { task: task.into() })
            .await
            .is_err()
        {
            return;
        }
        if terminal {
            if let Some(task) = store.task(&task_id) {
                let _ = tx.send(TaskMessage::Final { task: task.into() }).await;
            }
            return;
        }

        loop {
            tokio::time::sleep(poll_interval).await;

            let Some(task) = store.task(&task_id) else {
                return;
            };

            if task.is_terminal() {
                let _ = tx.send(TaskMessage::Final { task: task.into() }).await;
                return;
            }

            if task.updated_at_epoch_ms != last_updated {
                last_updated = task.updated_at_epoch_ms;
                if tx
                    .send(TaskMessage::Update { task: task.into() })
                    .await
                    .is_err()
                {
                    return;
                }
            }
        }
    });

    rx
}

#[cfg(test)]
#[path = "watch_tests.rs"]
mod tests;
