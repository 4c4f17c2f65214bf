// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Queue coordination types: job handles and priorities.

use crate::task::TaskId;
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Opaque identifier linking a task to a queued unit of work.
    pub struct JobHandleId;
}

/// Priority class. Within each class, ordering is FIFO.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    #[default]
    Normal,
}

crate::simple_display! {
    Priority {
        High => "high",
        Normal => "normal",
    }
}

/// Observable lifecycle of a job handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandleStatus {
    Queued,
    Running,
    Finished,
    Failed,
    Cancelled,
    Expired,
}

crate::simple_display! {
    HandleStatus {
        Queued => "queued",
        Running => "running",
        Finished => "finished",
        Failed => "failed",
        Cancelled => "cancelled",
        Expired => "expired",
    }
}

impl HandleStatus {
    /// Terminal handles are retained for a TTL, then purged.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            HandleStatus::Finished
                | HandleStatus::Failed
                | HandleStatus::Cancelled
                | HandleStatus::Expired
        )
    }
}

/// The queue's reference to a task: enqueue/run metadata plus status.
///
/// The cooperative cancel flag is runtime state owned by the queue and is
/// not part of the persisted handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobHandle {
    pub id: JobHandleId,
    pub task_id: TaskId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal: Option<String>,
    pub priority: Priority,
    pub status: HandleStatus,
    pub enqueued_at_epoch_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_epoch_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at_epoch_ms: Option<u64>,
}

impl JobHandle {
    pub fn new(
        id: JobHandleId,
        task_id: TaskId,
        principal: Option<String>,
        priority: Priority,
        now_ms: u64,
    ) -> Self {
        Self {
            id,
            task_id,
            principal,
            priority,
            status: HandleStatus::Queued,
            enqueued_at_epoch_ms: now_ms,
            started_at_epoch_ms: None,
            finished_at_epoch_ms: None,
        }
    }
}
