// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker pool: drains the queue, one task to a terminal state at a time
//! per worker.

use crate::orchestrator::{CancelProbe, Orchestrator, OrchestratorDeps};
use crate::queue::{DequeuedJob, TaskQueue};
use asa_adapters::{CodeIndex, Forge, Git, LlmProvider, Sandbox};
use asa_core::{Clock, Event, HandleStatus, TaskState};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// A fixed-size pool of workers bound to one queue.
pub struct WorkerPool {
    shutdown: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `count` workers. Each polls the queue with `poll_interval`
    /// bounded waits so shutdown is observed promptly.
    pub fn spawn<P, S, G, F, I, C>(
        count: usize,
        queue: Arc<TaskQueue<C>>,
        deps: OrchestratorDeps<P, S, G, F, I, C>,
        poll_interval: Duration,
    ) -> Self
    where
        P: LlmProvider,
        S: Sandbox,
        G: Git,
        F: Forge,
        I: CodeIndex,
        C: Clock,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let handles = (0..count)
            .map(|worker| {
                let queue = Arc::clone(&queue);
                let deps = deps.clone();
                let shutdown = Arc::clone(&shutdown);
                tokio::spawn(async move {
                    worker_loop(worker, queue, deps, shutdown, poll_interval).await;
                })
            })
            .collect();

        Self { shutdown, handles }
    }

    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }

    /// Signal shutdown and wait for in-flight tasks to reach a terminal
    /// state.
    pub async fn shutdown(self) {
        self.shutdown.store(true, Ordering::SeqCst);
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

async fn worker_loop<P, S, G, F, I, C>(
    worker: usize,
    queue: Arc<TaskQueue<C>>,
    deps: OrchestratorDeps<P, S, G, F, I, C>,
    shutdown: Arc<AtomicBool>,
    poll_interval: Duration,
) where
    P: LlmProvider,
    S: Sandbox,
    G: Git,
    F: Forge,
    I: CodeIndex,
    C: Clock,
{
    tracing::info!(worker, "worker started");
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        let Some(job) = queue.dequeue(poll_interval).await else {
            continue;
        };
        run_one(worker, job, &queue, &deps).await;
    }
    tracing::info!(worker, "worker stopped");
}

async fn run_one<P, S, G, F, I, C>(
    worker: usize,
    job: DequeuedJob,
    queue: &TaskQueue<C>,
    deps: &OrchestratorDeps<P, S, G, F, I, C>,
) where
    P: LlmProvider,
    S: Sandbox,
    G: Git,
    F: Forge,
    I: CodeIndex,
    C: Clock,
{
    let task = deps.store.task(job.task_id.as_str());
    match &task {
        None => {
            tracing::warn!(worker, task = %job.task_id, "dequeued handle for unknown task");
            queue.release(&job.handle_id, HandleStatus::Failed);
            return;
        }
        Some(task) if task.is_terminal() => {
            tracing::info!(worker, task = %job.task_id, "task already terminal, releasing");
            queue.release(&job.handle_id, HandleStatus::Finished);
            return;
        }
        Some(_) => {}
    }

    tracing::info!(worker, task = %job.task_id, handle = %job.handle_id, "task picked up");

    let probe = CancelProbe::new(Arc::clone(&job.cancel));
    let orchestrator = Orchestrator::new(deps.clone(), job.task_id.clone(), probe);

    match orchestrator.run().await {
        Ok(final_state) => {
            let status = match final_state {
                TaskState::Completed => HandleStatus::Finished,
                TaskState::Cancelled => HandleStatus::Cancelled,
                _ => HandleStatus::Failed,
            };
            tracing::info!(worker, task = %job.task_id, %final_state, "task finished");
            queue.release(&job.handle_id, status);
        }
        Err(e) => {
            tracing::error!(worker, task = %job.task_id, error = %e, "orchestrator error");
            let now = deps.clock.epoch_ms();
            let _ = deps.store.commit(Event::TaskLog {
                id: job.task_id.clone(),
                line: format!("worker error: {e}"),
                epoch_ms: now,
            });
            let _ = deps.store.commit(Event::TaskStatus {
                id: job.task_id.clone(),
                status: TaskState::Failed,
                epoch_ms: now,
            });
            queue.release(&job.handle_id, HandleStatus::Failed);
        }
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
