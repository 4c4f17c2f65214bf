// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event types for the durable store.
//!
//! Serializes with `{"type": "task:created", ...fields}` format. Events are
//! facts about what happened; state is derived from them on replay. Unknown
//! type tags deserialize to `Unknown` so old logs remain readable.

use crate::handle::{HandleStatus, JobHandle, JobHandleId};
use crate::state::TaskState;
use crate::task::{Task, TaskId};
use crate::usage::UsageRecord;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Events recorded in the write-ahead log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    // -- task --
    #[serde(rename = "task:created")]
    TaskCreated { task: Task },

    #[serde(rename = "task:status")]
    TaskStatus {
        id: TaskId,
        status: TaskState,
        epoch_ms: u64,
    },

    #[serde(rename = "task:log")]
    TaskLog {
        id: TaskId,
        line: String,
        epoch_ms: u64,
    },

    #[serde(rename = "task:workspace")]
    TaskWorkspace {
        id: TaskId,
        path: PathBuf,
        epoch_ms: u64,
    },

    #[serde(rename = "task:branch")]
    TaskBranch {
        id: TaskId,
        branch: String,
        epoch_ms: u64,
    },

    #[serde(rename = "task:pr")]
    TaskPr {
        id: TaskId,
        url: String,
        epoch_ms: u64,
    },

    #[serde(rename = "task:test-output")]
    TaskTestOutput {
        id: TaskId,
        output: String,
        epoch_ms: u64,
    },

    #[serde(rename = "task:behavioral-test")]
    TaskBehavioralTest {
        id: TaskId,
        path: PathBuf,
        epoch_ms: u64,
    },

    // -- queue --
    #[serde(rename = "queue:pushed")]
    QueuePushed { handle: JobHandle },

    #[serde(rename = "queue:taken")]
    QueueTaken {
        handle_id: JobHandleId,
        epoch_ms: u64,
    },

    #[serde(rename = "queue:released")]
    QueueReleased {
        handle_id: JobHandleId,
        status: HandleStatus,
        epoch_ms: u64,
    },

    #[serde(rename = "queue:cancelled")]
    QueueCancelled {
        handle_id: JobHandleId,
        epoch_ms: u64,
    },

    #[serde(rename = "queue:purged")]
    QueuePurged { handle_id: JobHandleId },

    // -- usage --
    #[serde(rename = "usage:recorded")]
    UsageRecorded { record: UsageRecord },

    /// Unrecognized event tag (forward compatibility).
    #[serde(other)]
    Unknown,
}

impl Event {
    /// Event name for log spans.
    pub fn name(&self) -> &'static str {
        match self {
            Event::TaskCreated { .. } => "task:created",
            Event::TaskStatus { .. } => "task:status",
            Event::TaskLog { .. } => "task:log",
            Event::TaskWorkspace { .. } => "task:workspace",
            Event::TaskBranch { .. } => "task:branch",
            Event::TaskPr { .. } => "task:pr",
            Event::TaskTestOutput { .. } => "task:test-output",
            Event::TaskBehavioralTest { .. } => "task:behavioral-test",
            Event::QueuePushed { .. } => "queue:pushed",
            Event::QueueTaken { .. } => "queue:taken",
            Event::QueueReleased { .. } => "queue:released",
            Event::QueueCancelled { .. } => "queue:cancelled",
            Event::QueuePurged { .. } => "queue:purged",
            Event::UsageRecorded { .. } => "usage:recorded",
            Event::Unknown => "unknown",
        }
    }

    /// Short human-readable summary for structured logs.
    pub fn log_summary(&self) -> String {
        match self {
            Event::TaskCreated { task } => format!("task:created {}", task.id),
            Event::TaskStatus { id, status, .. } => format!("task:status {id} -> {status}"),
            Event::TaskLog { id, .. } => format!("task:log {id}"),
            Event::TaskWorkspace { id, path, .. } => {
                format!("task:workspace {id} -> {}", path.display())
            }
            Event::TaskBranch { id, branch, .. } => format!("task:branch {id} -> {branch}"),
            Event::TaskPr { id, url, .. } => format!("task:pr {id} -> {url}"),
            Event::TaskTestOutput { id, .. } => format!("task:test-output {id}"),
            Event::TaskBehavioralTest { id, path, .. } => {
                format!("task:behavioral-test {id} -> {}", path.display())
            }
            Event::QueuePushed { handle } => {
                format!("queue:pushed {} (task {})", handle.id, handle.task_id)
            }
            Event::QueueTaken { handle_id, .. } => format!("queue:taken {handle_id}"),
            Event::QueueReleased {
                handle_id, status, ..
            } => format!("queue:released {handle_id} -> {status}"),
            Event::QueueCancelled { handle_id, .. } => format!("queue:cancelled {handle_id}"),
            Event::QueuePurged { handle_id } => format!("queue:purged {handle_id}"),
            Event::UsageRecorded { record } => format!(
                "usage:recorded {} {} {} tokens",
                record.task_id, record.model, record.total_tokens
            ),
            Event::Unknown => "unknown".to_string(),
        }
    }

    /// Task this event belongs to, if any.
    pub fn task_id(&self) -> Option<&TaskId> {
        match self {
            Event::TaskCreated { task } => Some(&task.id),
            Event::TaskStatus { id, .. }
            | Event::TaskLog { id, .. }
            | Event::TaskWorkspace { id, .. }
            | Event::TaskBranch { id, .. }
            | Event::TaskPr { id, .. }
            | Event::TaskTestOutput { id, .. }
            | Event::TaskBehavioralTest { id, .. } => Some(id),
            Event::QueuePushed { handle } => Some(&handle.task_id),
            Event::UsageRecorded { record } => Some(&record.task_id),
            _ => None,
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
