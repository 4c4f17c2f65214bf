// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded work queue with admission backpressure and cancellation.
//!
//! Two priority classes, FIFO within each. Three admission gates close the
//! queue: global queued count, global running count, and per-principal
//! active count. The gates and the enqueue are evaluated under one lock so
//! concurrent submissions observe a consistent snapshot. Queue mutations
//! are persisted as events; the in-memory ordering is the coordination
//! layer and is re-seeded from the store on startup.

use asa_core::{
    AsaError, Clock, ErrorKind, Event, HandleStatus, IdGen, JobHandle, JobHandleId, Priority,
    TaskId, UuidIdGen,
};
use asa_storage::{Store, StoreError};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;

/// Admission gate limits.
#[derive(Debug, Clone)]
pub struct QueueLimits {
    pub max_queue_size: usize,
    pub max_concurrent_jobs: usize,
    pub max_per_user_concurrent: usize,
    /// Retention for finished handles.
    pub result_ttl: Duration,
    /// Retention for failed/cancelled handles.
    pub failure_ttl: Duration,
}

impl Default for QueueLimits {
    fn default() -> Self {
        Self {
            max_queue_size: 100,
            max_concurrent_jobs: 5,
            max_per_user_concurrent: 2,
            result_ttl: Duration::from_secs(86_400),
            failure_ttl: Duration::from_secs(604_800),
        }
    }
}

/// Admission denial with a user-facing reason (the 429 body).
#[derive(Debug, Clone, Error)]
#[error("{reason}")]
pub struct AdmitDenied {
    pub reason: String,
}

impl From<AdmitDenied> for AsaError {
    fn from(denied: AdmitDenied) -> Self {
        AsaError::new(ErrorKind::QueueFull, denied.reason)
    }
}

/// Errors from queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("admission denied: {0}")]
    Denied(#[from] AdmitDenied),
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

/// A dequeued unit of work, handed to one worker.
#[derive(Debug, Clone)]
pub struct DequeuedJob {
    pub handle_id: JobHandleId,
    pub task_id: TaskId,
    pub principal: Option<String>,
    /// Cooperative cancellation flag, observed by the orchestrator.
    pub cancel: Arc<AtomicBool>,
}

/// Point-in-time queue statistics.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct QueueStats {
    pub queued: usize,
    pub running: usize,
    pub max_queue_size: usize,
    pub max_concurrent_jobs: usize,
    pub max_per_user_concurrent: usize,
}

struct Entry {
    handle: JobHandle,
    cancel: Arc<AtomicBool>,
}

#[derive(Default)]
struct QueueInner {
    high: VecDeque<JobHandleId>,
    normal: VecDeque<JobHandleId>,
    entries: HashMap<String, Entry>,
}

impl QueueInner {
    fn count(&self, status: HandleStatus) -> usize {
        self.entries
            .values()
            .filter(|e| e.handle.status == status)
            .count()
    }

    fn principal_active(&self, principal: &str) -> usize {
        self.entries
            .values()
            .filter(|e| e.handle.principal.as_deref() == Some(principal))
            .filter(|e| {
                matches!(
                    e.handle.status,
                    HandleStatus::Queued | HandleStatus::Running
                )
            })
            .count()
    }

    fn gate_check(&self, limits: &QueueLimits, principal: Option<&str>) -> Result<(), AdmitDenied> {
        let queued = self.count(HandleStatus::Queued);
        if queued >= limits.max_queue_size {
            return Err(AdmitDenied {
                reason: format!("queue is full ({queued}/{})", limits.max_queue_size),
            });
        }

        let running = self.count(HandleStatus::Running);
        if running >= limits.max_concurrent_jobs {
            return Err(AdmitDenied {
                reason: format!(
                    "maximum concurrent jobs reached ({running}/{})",
                    limits.max_concurrent_jobs
                ),
            });
        }

        if let Some(principal) = principal {
            let active = self.principal_active(principal);
            if active >= limits.max_per_user_concurrent {
                return Err(AdmitDenied {
                    reason: format!(
                        "principal has too many active tasks ({active}/{})",
                        limits.max_per_user_concurrent
                    ),
                });
            }
        }

        Ok(())
    }
}

/// The bounded task queue.
pub struct TaskQueue<C: Clock> {
    inner: Mutex<QueueInner>,
    notify: Notify,
    limits: QueueLimits,
    store: Store,
    clock: C,
}

impl<C: Clock> TaskQueue<C> {
    pub fn new(store: Store, limits: QueueLimits, clock: C) -> Self {
        Self {
            inner: Mutex::new(QueueInner::default()),
            notify: Notify::new(),
            limits,
            store,
            clock,
        }
    }

    pub fn limits(&self) -> &QueueLimits {
        &self.limits
    }

    /// Re-seed coordination state from persisted handles after a restart.
    ///
    /// Queued handles re-enter their priority queues in enqueue order.
    /// Handles that were running when the process died are released as
    /// failed (their workers are gone).
    pub fn reseed(&self) -> Result<usize, StoreError> {
        let handles: Vec<JobHandle> = self
            .store
            .with_state(|state| state.handles.values().cloned().collect());

        let mut orphaned = Vec::new();
        let mut requeued = 0;

        {
            let mut inner = self.inner.lock();
            let mut queued: Vec<JobHandle> = handles
                .iter()
                .filter(|h| h.status == HandleStatus::Queued)
                .cloned()
                .collect();
            queued.sort_by_key(|h| h.enqueued_at_epoch_ms);

            for handle in queued {
                let id = handle.id.clone();
                match handle.priority {
                    Priority::High => inner.high.push_back(id.clone()),
                    Priority::Normal => inner.normal.push_back(id.clone()),
                }
                inner.entries.insert(
                    id.as_str().to_string(),
                    Entry {
                        handle,
                        cancel: Arc::new(AtomicBool::new(false)),
                    },
                );
                requeued += 1;
            }

            for handle in handles {
                if handle.status == HandleStatus::Running {
                    orphaned.push(handle.id.clone());
                    let mut handle = handle;
                    handle.status = HandleStatus::Failed;
                    inner.entries.insert(
                        handle.id.as_str().to_string(),
                        Entry {
                            handle,
                            cancel: Arc::new(AtomicBool::new(false)),
                        },
                    );
                }
            }
        }

        for handle_id in orphaned {
            tracing::warn!(handle = %handle_id, "orphaned running handle marked failed");
            self.store.commit(Event::QueueReleased {
                handle_id,
                status: HandleStatus::Failed,
                epoch_ms: self.clock.epoch_ms(),
            })?;
        }

        if requeued > 0 {
            self.notify.notify_waiters();
        }
        Ok(requeued)
    }

    /// Evaluate the three admission gates without enqueueing.
    pub fn can_admit(&self, principal: Option<&str>) -> Result<(), AdmitDenied> {
        self.inner.lock().gate_check(&self.limits, principal)
    }

    /// Admit and enqueue a task. Denial leaves no trace.
    pub fn enqueue(
        &self,
        task_id: TaskId,
        principal: Option<String>,
        priority: Priority,
    ) -> Result<JobHandle, QueueError> {
        let handle = {
            let mut inner = self.inner.lock();
            inner.gate_check(&self.limits, principal.as_deref())?;

            let handle = JobHandle::new(
                JobHandleId::new(format!("h-{}", UuidIdGen.next())),
                task_id,
                principal,
                priority,
                self.clock.epoch_ms(),
            );

            match priority {
                Priority::High => inner.high.push_back(handle.id.clone()),
                Priority::Normal => inner.normal.push_back(handle.id.clone()),
            }
            inner.entries.insert(
                handle.id.as_str().to_string(),
                Entry {
                    handle: handle.clone(),
                    cancel: Arc::new(AtomicBool::new(false)),
                },
            );

            // Persisted under the lock so gate checks in racing enqueues
            // observe a consistent snapshot.
            if let Err(e) = self.store.commit(Event::QueuePushed {
                handle: handle.clone(),
            }) {
                inner.high.retain(|id| id != &handle.id);
                inner.normal.retain(|id| id != &handle.id);
                inner.entries.remove(handle.id.as_str());
                return Err(e.into());
            }

            handle
        };

        tracing::info!(handle = %handle.id, task = %handle.task_id, "enqueued");
        self.notify.notify_one();
        Ok(handle)
    }

    /// Take the next job, waiting up to `wait` for one to arrive.
    /// High priority drains before normal; FIFO within each class.
    pub async fn dequeue(&self, wait: Duration) -> Option<DequeuedJob> {
        let deadline = tokio::time::Instant::now() + wait;

        loop {
            if let Some(job) = self.try_take() {
                return Some(job);
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                return None;
            }
            let _ = tokio::time::timeout(deadline - now, self.notify.notified()).await;
        }
    }

    fn try_take(&self) -> Option<DequeuedJob> {
        let (job, event) = {
            let mut inner = self.inner.lock();
            let handle_id = inner.high.pop_front().or_else(|| inner.normal.pop_front())?;
            let now_ms = self.clock.epoch_ms();

            let entry = inner.entries.get_mut(handle_id.as_str())?;
            entry.handle.status = HandleStatus::Running;
            entry.handle.started_at_epoch_ms = Some(now_ms);

            (
                DequeuedJob {
                    handle_id: handle_id.clone(),
                    task_id: entry.handle.task_id.clone(),
                    principal: entry.handle.principal.clone(),
                    cancel: Arc::clone(&entry.cancel),
                },
                Event::QueueTaken {
                    handle_id,
                    epoch_ms: now_ms,
                },
            )
        };

        if let Err(e) = self.store.commit(event) {
            tracing::error!(error = %e, "failed to persist queue take");
        }
        Some(job)
    }

    /// Cancel by handle: queued handles leave the queue immediately (and
    /// their never-started task goes straight to CANCELLED); running
    /// handles get their flag set for the worker to observe.
    pub fn cancel(&self, handle_id: &JobHandleId) -> bool {
        let (found, events) = {
            let mut inner = self.inner.lock();
            let now_ms = self.clock.epoch_ms();
            let Some(entry) = inner.entries.get_mut(handle_id.as_str()) else {
                return false;
            };

            match entry.handle.status {
                HandleStatus::Queued => {
                    entry.handle.status = HandleStatus::Cancelled;
                    entry.handle.finished_at_epoch_ms = Some(now_ms);
                    entry.cancel.store(true, Ordering::SeqCst);
                    let task_id = entry.handle.task_id.clone();
                    inner.high.retain(|id| id != handle_id);
                    inner.normal.retain(|id| id != handle_id);
                    (
                        true,
                        vec![
                            Event::QueueCancelled {
                                handle_id: handle_id.clone(),
                                epoch_ms: now_ms,
                            },
                            Event::TaskStatus {
                                id: task_id,
                                status: asa_core::TaskState::Cancelled,
                                epoch_ms: now_ms,
                            },
                        ],
                    )
                }
                HandleStatus::Running => {
                    entry.cancel.store(true, Ordering::SeqCst);
                    (true, Vec::new())
                }
                _ => (false, Vec::new()),
            }
        };

        for event in events {
            if let Err(e) = self.store.commit(event) {
                tracing::error!(error = %e, "failed to persist queue cancel");
            }
        }
        found
    }

    /// Cancel by task id. Returns false when no live handle exists.
    pub fn cancel_task(&self, task_id: &TaskId) -> bool {
        let handle_id = {
            let inner = self.inner.lock();
            inner
                .entries
                .values()
                .find(|e| {
                    e.handle.task_id == *task_id
                        && matches!(
                            e.handle.status,
                            HandleStatus::Queued | HandleStatus::Running
                        )
                })
                .map(|e| e.handle.id.clone())
        };
        match handle_id {
            Some(id) => self.cancel(&id),
            None => false,
        }
    }

    /// Release a running handle with its terminal status.
    pub fn release(&self, handle_id: &JobHandleId, status: HandleStatus) {
        let event = {
            let mut inner = self.inner.lock();
            let now_ms = self.clock.epoch_ms();
            let Some(entry) = inner.entries.get_mut(handle_id.as_str()) else {
                return;
            };
            entry.handle.status = status;
            entry.handle.finished_at_epoch_ms = Some(now_ms);
            Event::QueueReleased {
                handle_id: handle_id.clone(),
                status,
                epoch_ms: now_ms,
            }
        };

        if let Err(e) = self.store.commit(event) {
            tracing::error!(error = %e, "failed to persist queue release");
        }
    }

    /// Handle status plus timing, None once purged.
    pub fn status(&self, handle_id: &JobHandleId) -> Option<JobHandle> {
        self.inner
            .lock()
            .entries
            .get(handle_id.as_str())
            .map(|e| e.handle.clone())
    }

    pub fn stats(&self) -> QueueStats {
        let inner = self.inner.lock();
        QueueStats {
            queued: inner.count(HandleStatus::Queued),
            running: inner.count(HandleStatus::Running),
            max_queue_size: self.limits.max_queue_size,
            max_concurrent_jobs: self.limits.max_concurrent_jobs,
            max_per_user_concurrent: self.limits.max_per_user_concurrent,
        }
    }

    /// Drop terminal handles past their retention TTL. Returns how many
    /// were purged.
    pub fn purge_expired(&self) -> usize {
        let now_ms = self.clock.epoch_ms();
        let expired: Vec<JobHandleId> = {
            let inner = self.inner.lock();
            inner
                .entries
                .values()
                .filter(|e| e.handle.status.is_terminal())
                .filter(|e| {
                    let ttl = match e.handle.status {
                        HandleStatus::Finished => self.limits.result_ttl,
                        _ => self.limits.failure_ttl,
                    };
                    e.handle
                        .finished_at_epoch_ms
                        .map(|finished| finished + ttl.as_millis() as u64 <= now_ms)
                        .unwrap_or(false)
                })
                .map(|e| e.handle.id.clone())
                .collect()
        };

        for handle_id in &expired {
            self.inner.lock().entries.remove(handle_id.as_str());
            if let Err(e) = self.store.commit(Event::QueuePurged {
                handle_id: handle_id.clone(),
            }) {
                tracing::error!(error = %e, "failed to persist queue purge");
            }
        }

        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "purged expired handles");
        }
        expired.len()
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
