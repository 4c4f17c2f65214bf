// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use asa_core::{
    HandleStatus, JobHandle, JobHandleId, Priority, Purpose, TaskId, TaskState, UsageRecord,
    UsageStatus,
};
use std::path::PathBuf;

mod handles;
mod tasks;
mod usage;

fn task_created_event(id: &str) -> Event {
    Event::TaskCreated {
        task: Task::test_task(id),
    }
}

fn status_event(id: &str, status: TaskState, epoch_ms: u64) -> Event {
    Event::TaskStatus {
        id: TaskId::new(id),
        status,
        epoch_ms,
    }
}

fn pushed_event(handle_id: &str, task_id: &str, principal: Option<&str>) -> Event {
    Event::QueuePushed {
        handle: JobHandle::new(
            JobHandleId::new(handle_id),
            TaskId::new(task_id),
            principal.map(str::to_string),
            Priority::Normal,
            1_000_000,
        ),
    }
}

fn usage_event(task_id: &str, tokens: u64, cost: f64, recorded_at: u64) -> Event {
    Event::UsageRecorded {
        record: UsageRecord {
            task_id: TaskId::new(task_id),
            principal: Some("alice".to_string()),
            purpose: Purpose::FixGeneration,
            model: "gpt-4o".to_string(),
            prompt_tokens: tokens / 2,
            completion_tokens: tokens - tokens / 2,
            total_tokens: tokens,
            cost_usd: cost,
            latency_ms: 120,
            status: UsageStatus::Success,
            error: None,
            prompt_version: None,
            schema_version: None,
            recorded_at_epoch_ms: recorded_at,
        },
    }
}
