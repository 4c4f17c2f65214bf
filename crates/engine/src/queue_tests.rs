// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use asa_core::{Event, FakeClock, Task};

struct Fixture {
    _dir: tempfile::TempDir,
    store: Store,
    clock: FakeClock,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        Self {
            _dir: dir,
            store,
            clock: FakeClock::new(),
        }
    }

    fn queue(&self, limits: QueueLimits) -> TaskQueue<FakeClock> {
        TaskQueue::new(self.store.clone(), limits, self.clock.clone())
    }

    fn create_task(&self, id: &str) {
        self.store
            .commit(Event::TaskCreated {
                task: Task::test_task(id),
            })
            .unwrap();
    }
}

fn tiny_limits() -> QueueLimits {
    QueueLimits {
        max_queue_size: 2,
        max_concurrent_jobs: 2,
        max_per_user_concurrent: 1,
        ..Default::default()
    }
}

// ── Admission gates ──────────────────────────────────────────────────────────

#[tokio::test]
async fn queue_full_gate_denies_at_capacity() {
    let fx = Fixture::new();
    let queue = fx.queue(tiny_limits());

    queue
        .enqueue(TaskId::new("t-1"), None, Priority::Normal)
        .unwrap();
    assert!(queue.can_admit(None).is_ok());
    queue
        .enqueue(TaskId::new("t-2"), None, Priority::Normal)
        .unwrap();

    // At exactly max_queue_size the next submission is denied
    let err = queue.can_admit(None).unwrap_err();
    assert!(err.reason.contains("queue is full"));
    assert!(queue
        .enqueue(TaskId::new("t-3"), None, Priority::Normal)
        .is_err());
    assert_eq!(queue.stats().queued, 2);
}

#[tokio::test]
async fn running_gate_denies_when_workers_saturated() {
    let fx = Fixture::new();
    let queue = fx.queue(tiny_limits());

    for id in ["t-1", "t-2"] {
        queue.enqueue(TaskId::new(id), None, Priority::Normal).unwrap();
    }
    // Move both to running
    queue.dequeue(Duration::from_millis(10)).await.unwrap();
    queue.dequeue(Duration::from_millis(10)).await.unwrap();
    assert_eq!(queue.stats().running, 2);

    let err = queue.can_admit(None).unwrap_err();
    assert!(err.reason.contains("concurrent jobs"));
}

#[tokio::test]
async fn per_principal_gate_counts_queued_and_running() {
    let fx = Fixture::new();
    let queue = fx.queue(QueueLimits {
        max_per_user_concurrent: 1,
        ..Default::default()
    });

    queue
        .enqueue(TaskId::new("t-1"), Some("alice".to_string()), Priority::Normal)
        .unwrap();

    let err = queue.can_admit(Some("alice")).unwrap_err();
    assert!(err.reason.contains("too many active tasks"));
    // Other principals and anonymous submissions are unaffected
    assert!(queue.can_admit(Some("bob")).is_ok());
    assert!(queue.can_admit(None).is_ok());
}

#[tokio::test]
async fn denial_leaves_no_trace() {
    let fx = Fixture::new();
    let queue = fx.queue(QueueLimits {
        max_queue_size: 1,
        ..Default::default()
    });

    queue
        .enqueue(TaskId::new("t-1"), None, Priority::Normal)
        .unwrap();
    let before = fx.store.with_state(|s| s.handles.len());

    assert!(queue
        .enqueue(TaskId::new("t-2"), None, Priority::Normal)
        .is_err());
    assert_eq!(fx.store.with_state(|s| s.handles.len()), before);
}

// ── Ordering ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn fifo_within_class_high_priority_first() {
    let fx = Fixture::new();
    let queue = fx.queue(QueueLimits::default());

    queue.enqueue(TaskId::new("n-1"), None, Priority::Normal).unwrap();
    queue.enqueue(TaskId::new("n-2"), None, Priority::Normal).unwrap();
    queue.enqueue(TaskId::new("h-1"), None, Priority::High).unwrap();

    let order: Vec<String> = [
        queue.dequeue(Duration::from_millis(10)).await.unwrap(),
        queue.dequeue(Duration::from_millis(10)).await.unwrap(),
        queue.dequeue(Duration::from_millis(10)).await.unwrap(),
    ]
    .iter()
    .map(|j| j.task_id.as_str().to_string())
    .collect();

    assert_eq!(order, vec!["h-1", "n-1", "n-2"]);
}

#[tokio::test]
async fn dequeue_times_out_on_empty_queue() {
    let fx = Fixture::new();
    let queue = fx.queue(QueueLimits::default());
    assert!(queue.dequeue(Duration::from_millis(20)).await.is_none());
}

#[tokio::test]
async fn dequeue_wakes_on_enqueue() {
    let fx = Fixture::new();
    let queue = Arc::new(fx.queue(QueueLimits::default()));

    let waiter = {
        let queue = Arc::clone(&queue);
        tokio::spawn(async move { queue.dequeue(Duration::from_secs(5)).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    queue.enqueue(TaskId::new("t-1"), None, Priority::Normal).unwrap();
    let job = waiter.await.unwrap().unwrap();
    assert_eq!(job.task_id, "t-1");
}

// ── Cancellation ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn cancelling_queued_handle_removes_it() {
    let fx = Fixture::new();
    let queue = fx.queue(QueueLimits::default());

    let handle = queue
        .enqueue(TaskId::new("t-1"), None, Priority::Normal)
        .unwrap();
    assert!(queue.cancel(&handle.id));

    assert_eq!(queue.stats().queued, 0);
    assert!(queue.dequeue(Duration::from_millis(10)).await.is_none());
    assert_eq!(
        queue.status(&handle.id).unwrap().status,
        HandleStatus::Cancelled
    );
}

#[tokio::test]
async fn cancelling_running_handle_sets_flag_only() {
    let fx = Fixture::new();
    let queue = fx.queue(QueueLimits::default());

    let handle = queue
        .enqueue(TaskId::new("t-1"), None, Priority::Normal)
        .unwrap();
    let job = queue.dequeue(Duration::from_millis(10)).await.unwrap();
    assert!(!job.cancel.load(Ordering::SeqCst));

    assert!(queue.cancel(&handle.id));
    assert!(job.cancel.load(Ordering::SeqCst));
    // Removal is left to the worker's cooperative check
    assert_eq!(
        queue.status(&handle.id).unwrap().status,
        HandleStatus::Running
    );
}

#[tokio::test]
async fn cancel_by_task_id_finds_live_handle() {
    let fx = Fixture::new();
    let queue = fx.queue(QueueLimits::default());

    queue.enqueue(TaskId::new("t-1"), None, Priority::Normal).unwrap();
    assert!(queue.cancel_task(&TaskId::new("t-1")));
    assert!(!queue.cancel_task(&TaskId::new("t-1")));
    assert!(!queue.cancel_task(&TaskId::new("ghost")));
}

// ── Release, status, stats ───────────────────────────────────────────────────

#[tokio::test]
async fn release_records_outcome_and_frees_capacity() {
    let fx = Fixture::new();
    let queue = fx.queue(tiny_limits());

    let handle = queue
        .enqueue(TaskId::new("t-1"), Some("alice".to_string()), Priority::Normal)
        .unwrap();
    queue.dequeue(Duration::from_millis(10)).await.unwrap();

    assert!(queue.can_admit(Some("alice")).is_err());
    queue.release(&handle.id, HandleStatus::Finished);
    assert!(queue.can_admit(Some("alice")).is_ok());

    let released = queue.status(&handle.id).unwrap();
    assert_eq!(released.status, HandleStatus::Finished);
    assert!(released.finished_at_epoch_ms.is_some());
}

#[tokio::test]
async fn stats_reflect_limits_and_counts() {
    let fx = Fixture::new();
    let queue = fx.queue(tiny_limits());
    queue.enqueue(TaskId::new("t-1"), None, Priority::Normal).unwrap();

    let stats = queue.stats();
    assert_eq!(stats.queued, 1);
    assert_eq!(stats.running, 0);
    assert_eq!(stats.max_queue_size, 2);
    assert_eq!(stats.max_per_user_concurrent, 1);
}

// ── TTL purge ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn purge_drops_terminal_handles_after_ttl() {
    let fx = Fixture::new();
    let queue = fx.queue(QueueLimits {
        result_ttl: Duration::from_secs(60),
        failure_ttl: Duration::from_secs(600),
        ..Default::default()
    });

    let finished = queue
        .enqueue(TaskId::new("t-1"), None, Priority::Normal)
        .unwrap();
    queue.dequeue(Duration::from_millis(10)).await.unwrap();
    queue.release(&finished.id, HandleStatus::Finished);

    let failed = queue
        .enqueue(TaskId::new("t-2"), None, Priority::Normal)
        .unwrap();
    queue.dequeue(Duration::from_millis(10)).await.unwrap();
    queue.release(&failed.id, HandleStatus::Failed);

    // Within both TTLs: nothing to purge
    assert_eq!(queue.purge_expired(), 0);

    // Past the result TTL but within the failure TTL
    fx.clock.advance(Duration::from_secs(61));
    assert_eq!(queue.purge_expired(), 1);
    assert!(queue.status(&finished.id).is_none());
    assert!(queue.status(&failed.id).is_some());

    // Past the failure TTL as well
    fx.clock.advance(Duration::from_secs(600));
    assert_eq!(queue.purge_expired(), 1);
    assert!(queue.status(&failed.id).is_none());
}

// ── Reseed ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn reseed_requeues_queued_and_fails_orphaned_running() {
    let fx = Fixture::new();
    fx.create_task("t-1");
    fx.create_task("t-2");

    {
        let queue = fx.queue(QueueLimits::default());
        queue.enqueue(TaskId::new("t-1"), None, Priority::Normal).unwrap();
        queue.enqueue(TaskId::new("t-2"), None, Priority::Normal).unwrap();
        // t-1 was running when the process died
        queue.dequeue(Duration::from_millis(10)).await.unwrap();
    }

    // Fresh queue over the same store (restart)
    let queue = fx.queue(QueueLimits::default());
    let requeued = queue.reseed().unwrap();
    assert_eq!(requeued, 1);

    let job = queue.dequeue(Duration::from_millis(10)).await.unwrap();
    assert_eq!(job.task_id, "t-2");

    // The orphaned running handle is now failed in the store
    let orphaned = fx.store.with_state(|s| {
        s.handles
            .values()
            .find(|h| h.task_id == "t-1")
            .map(|h| h.status)
    });
    assert_eq!(orphaned, Some(HandleStatus::Failed));
}
