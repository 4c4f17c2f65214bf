// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Materialized state from WAL replay.
//!
//! Events are facts about what happened; state is derived from those facts.
//! All handlers are idempotent: applying the same event twice produces the
//! same state as applying it once, so crash-recovery replay is safe.

use asa_core::{Event, HandleStatus, JobHandle, Task, UsageRecord, UsageStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Cumulative LLM usage for one task.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TaskUsage {
    pub total_tokens: u64,
    pub total_cost_usd: f64,
}

/// Materialized state built from WAL replay
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct MaterializedState {
    pub tasks: HashMap<String, Task>,
    #[serde(default)]
    pub handles: HashMap<String, JobHandle>,
    /// Usage records per task id, in append order.
    #[serde(default)]
    pub usage: HashMap<String, Vec<UsageRecord>>,
}

impl MaterializedState {
    /// Get a task by id.
    pub fn get_task(&self, id: &str) -> Option<&Task> {
        self.tasks.get(id)
    }

    /// Get a handle by id.
    pub fn get_handle(&self, id: &str) -> Option<&JobHandle> {
        self.handles.get(id)
    }

    /// Cumulative successful-call token and cost totals for a task.
    ///
    /// Budgets are recomputed from these records on every gateway call; the
    /// append of a UsageRecord happens-before the call returns, so the next
    /// call observes the previous call's cost.
    pub fn task_usage(&self, task_id: &str) -> TaskUsage {
        let mut usage = TaskUsage::default();
        if let Some(records) = self.usage.get(task_id) {
            for record in records {
                usage.total_tokens += record.total_tokens;
                usage.total_cost_usd += record.cost_usd;
            }
        }
        usage
    }

    /// Usage records for one task, in append order.
    pub fn task_usage_records(&self, task_id: &str) -> &[UsageRecord] {
        self.usage.get(task_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Per-purpose successful call counts for one task.
    pub fn task_call_counts(&self, task_id: &str) -> HashMap<String, u32> {
        let mut counts = HashMap::new();
        for record in self.task_usage_records(task_id) {
            if record.status == UsageStatus::Success {
                *counts.entry(record.purpose.to_string()).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Cost accumulated by a principal since the given epoch instant
    /// (typically the start of the current UTC day).
    pub fn principal_cost_since(&self, principal: &str, since_epoch_ms: u64) -> f64 {
        self.usage
            .values()
            .flatten()
            .filter(|r| r.principal.as_deref() == Some(principal))
            .filter(|r| r.recorded_at_epoch_ms >= since_epoch_ms)
            .map(|r| r.cost_usd)
            .sum()
    }

    /// Number of handles currently queued.
    pub fn queued_count(&self) -> usize {
        self.count_handles(HandleStatus::Queued)
    }

    /// Number of handles currently running.
    pub fn running_count(&self) -> usize {
        self.count_handles(HandleStatus::Running)
    }

    fn count_handles(&self, status: HandleStatus) -> usize {
        self.handles.values().filter(|h| h.status == status).count()
    }

    /// Queued-or-running handle count for one principal.
    pub fn principal_active_count(&self, principal: &str) -> usize {
        self.handles
            .values()
            .filter(|h| h.principal.as_deref() == Some(principal))
            .filter(|h| matches!(h.status, HandleStatus::Queued | HandleStatus::Running))
            .count()
    }

    /// Apply an event to derive state changes.
    pub fn apply_event(&mut self, event: &Event) {
        match event {
            Event::TaskCreated { task } => {
                // Idempotency: first write wins
                self.tasks
                    .entry(task.id.as_str().to_string())
                    .or_insert_with(|| task.clone());
            }

            Event::TaskStatus {
                id,
                status,
                epoch_ms,
            } => {
                if let Some(task) = self.tasks.get_mut(id.as_str()) {
                    if task.status != *status {
                        task.status = *status;
                        task.touch(*epoch_ms);
                    }
                }
            }

            Event::TaskLog { id, line, epoch_ms } => {
                if let Some(task) = self.tasks.get_mut(id.as_str()) {
                    task.append_log(line, *epoch_ms);
                }
            }

            Event::TaskWorkspace { id, path, epoch_ms } => {
                if let Some(task) = self.tasks.get_mut(id.as_str()) {
                    // Write-once: ignored when already set
                    task.set_workspace_path(path.clone(), *epoch_ms);
                }
            }

            Event::TaskBranch {
                id,
                branch,
                epoch_ms,
            } => {
                if let Some(task) = self.tasks.get_mut(id.as_str()) {
                    if task.branch_name.as_deref() != Some(branch) {
                        task.branch_name = Some(branch.clone());
                        task.touch(*epoch_ms);
                    }
                }
            }

            Event::TaskPr { id, url, epoch_ms } => {
                if let Some(task) = self.tasks.get_mut(id.as_str()) {
                    if task.pr_url.as_deref() != Some(url) {
                        task.pr_url = Some(url.clone());
                        task.touch(*epoch_ms);
                    }
                }
            }

            Event::TaskTestOutput {
                id,
                output,
                epoch_ms,
            } => {
                if let Some(task) = self.tasks.get_mut(id.as_str()) {
                    task.test_output = Some(output.clone());
                    task.touch(*epoch_ms);
                }
            }

            Event::TaskBehavioralTest { id, path, epoch_ms } => {
                if let Some(task) = self.tasks.get_mut(id.as_str()) {
                    if task.behavioral_test_path.as_deref() != Some(path) {
                        task.behavioral_test_path = Some(path.clone());
                        task.touch(*epoch_ms);
                    }
                }
            }

            Event::QueuePushed { handle } => {
                self.handles
                    .entry(handle.id.as_str().to_string())
                    .or_insert_with(|| handle.clone());
                if let Some(task) = self.tasks.get_mut(handle.task_id.as_str()) {
                    if task.handle_id.is_none() {
                        task.handle_id = Some(handle.id.clone());
                    }
                }
            }

            Event::QueueTaken {
                handle_id,
                epoch_ms,
            } => {
                if let Some(handle) = self.handles.get_mut(handle_id.as_str()) {
                    handle.status = HandleStatus::Running;
                    if handle.started_at_epoch_ms.is_none() {
                        handle.started_at_epoch_ms = Some(*epoch_ms);
                    }
                }
            }

            Event::QueueReleased {
                handle_id,
                status,
                epoch_ms,
            } => {
                if let Some(handle) = self.handles.get_mut(handle_id.as_str()) {
                    handle.status = *status;
                    if handle.finished_at_epoch_ms.is_none() {
                        handle.finished_at_epoch_ms = Some(*epoch_ms);
                    }
                }
            }

            Event::QueueCancelled {
                handle_id,
                epoch_ms,
            } => {
                if let Some(handle) = self.handles.get_mut(handle_id.as_str()) {
                    handle.status = HandleStatus::Cancelled;
                    if handle.finished_at_epoch_ms.is_none() {
                        handle.finished_at_epoch_ms = Some(*epoch_ms);
                    }
                }
            }

            Event::QueuePurged { handle_id } => {
                self.handles.remove(handle_id.as_str());
            }

            Event::UsageRecorded { record } => {
                let records = self
                    .usage
                    .entry(record.task_id.as_str().to_string())
                    .or_default();
                // Idempotency: identical consecutive records are replay artifacts
                if records.last() != Some(record) {
                    records.push(record.clone());
                }
            }

            Event::Unknown => {}
        }
    }
}

#[cfg(test)]
#[path = "state_tests/mod.rs"]
mod tests;
