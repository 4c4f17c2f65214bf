// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Inbound interface DTOs. The HTTP frame lives outside this crate; these
//! types define the request/response shapes it carries.

use asa_core::{AsaError, HandleStatus, Priority, Task, TaskState};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Task submission payload.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitRequest {
    pub repo_url: String,
    pub bug_description: String,
    #[serde(default)]
    pub test_command: Option<String>,
    #[serde(default)]
    pub priority: Priority,
}

/// Submission outcomes map onto the HTTP surface: invalid input is a 400,
/// queue-full a 429, internal failures a 500.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("invalid submission: {0}")]
    Invalid(AsaError),
    #[error("admission denied: {reason}")]
    QueueFull { reason: String },
    #[error("internal error: {0}")]
    Internal(String),
}

/// Full task detail, the 201/200 response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDetail {
    pub id: String,
    pub repo_url: String,
    pub bug_description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal: Option<String>,
    pub status: TaskState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle_id: Option<String>,
    pub created_at_epoch_ms: u64,
    pub updated_at_epoch_ms: u64,
}

impl From<Task> for TaskDetail {
    fn from(task: Task) -> Self {
        Self {
            id: task.id.as_str().to_string(),
            repo_url: task.repo_url,
            bug_description: task.bug_description,
            test_command: task.test_command,
            principal: task.principal,
            status: task.status,
            workspace_path: task.workspace_path,
            branch_name: task.branch_name,
            pr_url: task.pr_url,
            handle_id: task.handle_id.map(|h| h.as_str().to_string()),
            created_at_epoch_ms: task.created_at_epoch_ms,
            updated_at_epoch_ms: task.updated_at_epoch_ms,
        }
    }
}

/// Progress view: a static map from status to a percentage, with
/// terminals pinned to 0 or 100.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressResponse {
    pub status: TaskState,
    pub progress_percentage: u8,
    pub duration_seconds: u64,
    pub current_step: String,
}

/// Percentage for a status. Static and total.
pub fn progress_percentage(status: TaskState) -> u8 {
    match status {
        TaskState::Queued => 5,
        TaskState::Init => 10,
        TaskState::CloningRepo => 20,
        TaskState::IndexingCode => 30,
        TaskState::VerifyingBugBehavior => 40,
        TaskState::RunningTestsBeforeFix => 50,
        TaskState::Retry => 60,
        TaskState::GeneratingFix => 65,
        TaskState::RunningTestsAfterFix => 80,
        TaskState::VerifyingFixBehavior => 85,
        TaskState::CreatingPrBranch => 95,
        TaskState::Completed => 100,
        TaskState::Failed | TaskState::Timeout | TaskState::Cancelled => 0,
    }
}

/// Job handle status plus timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandleStatusResponse {
    pub handle_id: String,
    pub status: HandleStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enqueued_at_epoch_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_epoch_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at_epoch_ms: Option<u64>,
}

/// Queue statistics plus worker count.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsResponse {
    pub queued: usize,
    pub running: usize,
    pub workers: usize,
    pub max_queue_size: usize,
    pub max_concurrent_jobs: usize,
    pub max_per_user_concurrent: usize,
}

/// Push-channel messages: one snapshot, updates while the task mutates, a
/// single final message on terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskMessage {
    Snapshot { task: TaskDetail },
    Update { task: TaskDetail },
    Final { task: TaskDetail },
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
