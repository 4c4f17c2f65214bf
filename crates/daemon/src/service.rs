// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The inbound service facade: submission, inspection, and cancellation.
//!
//! The HTTP layer (out of scope here) maps these calls onto its routes;
//! everything it needs is in the returned DTOs and errors.

use crate::protocol::{
    progress_percentage, HandleStatusResponse, ProgressResponse, StatsResponse, SubmitError,
    SubmitRequest, TaskDetail,
};
use asa_core::{Clock, Event, IdGen, JobHandleId, Submission, Task, TaskId, UuidIdGen};
use asa_engine::{QueueError, TaskQueue};
use asa_storage::Store;
use std::sync::Arc;

/// Inbound API surface over one store and one queue.
pub struct Service<C: Clock> {
    store: Store,
    queue: Arc<TaskQueue<C>>,
    clock: C,
    workers: usize,
}

impl<C: Clock> Service<C> {
    pub fn new(store: Store, queue: Arc<TaskQueue<C>>, clock: C, workers: usize) -> Self {
        Self {
            store,
            queue,
            clock,
            workers,
        }
    }

    /// Validate, admit, and persist a submission.
    ///
    /// Denied admissions leave no task behind; the reason is surfaced for
    /// the 429 body.
    pub fn submit(
        &self,
        request: SubmitRequest,
        principal: Option<&str>,
    ) -> Result<TaskDetail, SubmitError> {
        let submission = Submission::validate(
            &request.repo_url,
            &request.bug_description,
            request.test_command.as_deref(),
            principal,
            request.priority,
        )
        .map_err(SubmitError::Invalid)?;

        // Fast-fail before persisting anything
        self.queue
            .can_admit(submission.principal.as_deref())
            .map_err(|denied| SubmitError::QueueFull {
                reason: denied.reason,
            })?;

        let task_id = TaskId::new(format!("t-{}", UuidIdGen.next()));
        let task = Task::new(task_id.clone(), submission.clone(), self.clock.epoch_ms());
        self.store
            .commit(Event::TaskCreated { task })
            .map_err(|e| SubmitError::Internal(e.to_string()))?;

        match self
            .queue
            .enqueue(task_id.clone(), submission.principal, submission.priority)
        {
            Ok(_handle) => {
                let task = self
                    .store
                    .task(task_id.as_str())
                    .ok_or_else(|| SubmitError::Internal("task vanished".to_string()))?;
                tracing::info!(task = %task_id, "submission accepted");
                Ok(task.into())
            }
            Err(QueueError::Denied(denied)) => {
                // Lost an admission race after persisting: close the task out
                let now = self.clock.epoch_ms();
                let _ = self.store.commit(Event::TaskLog {
                    id: task_id.clone(),
                    line: format!("admission denied: {}", denied.reason),
                    epoch_ms: now,
                });
                let _ = self.store.commit(Event::TaskStatus {
                    id: task_id,
                    status: asa_core::TaskState::Cancelled,
                    epoch_ms: now,
                });
                Err(SubmitError::QueueFull {
                    reason: denied.reason,
                })
            }
            Err(QueueError::Storage(e)) => Err(SubmitError::Internal(e.to_string())),
        }
    }

    /// Full task detail by id.
    pub fn task_detail(&self, task_id: &str) -> Option<TaskDetail> {
        self.store.task(task_id).map(Into::into)
    }

    /// Task log text, optionally only the last `tail` lines.
    pub fn task_logs(&self, task_id: &str, tail: Option<usize>) -> Option<String> {
        self.store.task(task_id).map(|task| task.log_tail(tail))
    }

    /// Progress view for polling clients.
    pub fn task_progress(&self, task_id: &str) -> Option<ProgressResponse> {
        let task = self.store.task(task_id)?;
        let duration_ms = self
            .clock
            .epoch_ms()
            .saturating_sub(task.created_at_epoch_ms);
        Some(ProgressResponse {
            status: task.status,
            progress_percentage: progress_percentage(task.status),
            duration_seconds: duration_ms / 1_000,
            current_step: task.status.to_string(),
        })
    }

    /// Job handle status. A handle referenced by a task but no longer
    /// retained anywhere reports as expired.
    pub fn handle_status(&self, handle_id: &str) -> Option<HandleStatusResponse> {
        let id = JobHandleId::new(handle_id);
        if let Some(handle) = self.queue.status(&id) {
            return Some(HandleStatusResponse {
                handle_id: handle.id.as_str().to_string(),
                status: handle.status,
                enqueued_at_epoch_ms: Some(handle.enqueued_at_epoch_ms),
                started_at_epoch_ms: handle.started_at_epoch_ms,
                finished_at_epoch_ms: handle.finished_at_epoch_ms,
            });
        }
        if let Some(handle) = self.store.with_state(|s| s.get_handle(handle_id).cloned()) {
            return Some(HandleStatusResponse {
                handle_id: handle.id.as_str().to_string(),
                status: handle.status,
                enqueued_at_epoch_ms: Some(handle.enqueued_at_epoch_ms),
                started_at_epoch_ms: handle.started_at_epoch_ms,
                finished_at_epoch_ms: handle.finished_at_epoch_ms,
            });
        }

        // Purged after TTL, but still referenced by a task row
        let referenced = self.store.with_state(|s| {
            s.tasks
                .values()
                .any(|t| t.handle_id.as_ref().map(|h| h.as_str()) == Some(handle_id))
        });
        referenced.then(|| HandleStatusResponse {
            handle_id: handle_id.to_string(),
            status: asa_core::HandleStatus::Expired,
            enqueued_at_epoch_ms: None,
            started_at_epoch_ms: None,
            finished_at_epoch_ms: None,
        })
    }

    /// Queue statistics plus worker count.
    pub fn stats(&self) -> StatsResponse {
        let stats = self.queue.stats();
        StatsResponse {
            queued: stats.queued,
            running: stats.running,
            workers: self.workers,
            max_queue_size: stats.max_queue_size,
            max_concurrent_jobs: stats.max_concurrent_jobs,
            max_per_user_concurrent: stats.max_per_user_concurrent,
        }
    }

    /// Request cancellation. Queued tasks cancel immediately; running
    /// tasks are flagged and observed cooperatively by their worker.
    pub fn cancel(&self, task_id: &str) -> bool {
        self.queue.cancel_task(&TaskId::new(task_id))
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
