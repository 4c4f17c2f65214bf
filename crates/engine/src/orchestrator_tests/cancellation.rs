// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn preset_flag_cancels_before_any_effect() {
    let fx = Fixture::new();
    let id = fx.create_task("t-1");

    let flag = Arc::new(AtomicBool::new(true));
    let orchestrator =
        Orchestrator::new(fx.deps(), id.clone(), CancelProbe::new(Arc::clone(&flag)));

    let final_state = orchestrator.run().await.unwrap();
    assert_eq!(final_state, TaskState::Cancelled);

    let task = fx.task(&id);
    assert_eq!(task.status, TaskState::Cancelled);
    assert!(task.workspace_path.is_none());
    assert!(fx.git.cloned_to().is_empty());
    assert!(fx.sandbox.calls().is_empty());
}

#[tokio::test]
async fn cancel_during_clone_is_observed_at_next_checkpoint() {
    let fx = Fixture::new();
    let id = fx.create_task("t-1");
    fx.git.set_clone_delay(Duration::from_millis(150));

    let flag = Arc::new(AtomicBool::new(false));
    let orchestrator =
        Orchestrator::new(fx.deps(), id.clone(), CancelProbe::new(Arc::clone(&flag)));

    let runner = tokio::spawn(async move { orchestrator.run().await });
    // Let the run reach the (slow) clone, then cancel
    tokio::time::sleep(Duration::from_millis(50)).await;
    flag.store(true, Ordering::SeqCst);

    let final_state = runner.await.unwrap().unwrap();
    assert_eq!(final_state, TaskState::Cancelled);

    let task = fx.task(&id);
    assert_eq!(task.status, TaskState::Cancelled);
    // The clone finished, but no later effect ran
    assert!(fx.sandbox.calls().is_empty());
    assert!(fx.provider.calls().is_empty());
    assert!(task.logs.contains("cancellation observed"));
}

#[tokio::test]
async fn cancel_during_test_run_stops_before_fix_generation() {
    let fx = Fixture::new();
    let id = fx.create_task("t-1");
    fx.sandbox.push_delayed(Duration::from_millis(150), 1);

    let flag = Arc::new(AtomicBool::new(false));
    let orchestrator =
        Orchestrator::new(fx.deps(), id.clone(), CancelProbe::new(Arc::clone(&flag)));

    let runner = tokio::spawn(async move { orchestrator.run().await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    flag.store(true, Ordering::SeqCst);

    let final_state = runner.await.unwrap().unwrap();
    assert_eq!(final_state, TaskState::Cancelled);
    // Fix generation never started
    assert!(fx.provider.calls().is_empty());
}
