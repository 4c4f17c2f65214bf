// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use asa_adapters::{GitError, IndexError};
use asa_core::UsageStatus;
use std::time::Duration;

// ── Happy path ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn happy_path_reaches_completed() {
    let fx = Fixture::new();
    let id = fx.create_task("t-1");
    fx.script_happy_path();

    let final_state = fx.orchestrator(&id).run().await.unwrap();
    assert_eq!(final_state, TaskState::Completed);

    let task = fx.task(&id);
    assert_eq!(task.status, TaskState::Completed);
    assert!(task.workspace_path.is_some());
    assert_eq!(task.branch_name.as_deref(), Some("asa/fix-t-1"));
    assert!(task.logs.contains("workflow complete: COMPLETED"));

    // The patch really landed in the workspace
    let workspace = task.workspace_path.unwrap();
    let patched = std::fs::read_to_string(workspace.join("src/calc.py")).unwrap();
    assert!(patched.contains("return a + b"));

    // Fix generation went through the gateway and was logged
    let records = fx
        .store
        .with_state(|s| s.task_usage_records("t-1").to_vec());
    assert!(records
        .iter()
        .any(|r| r.purpose == Purpose::FixGeneration && r.status == UsageStatus::Success));

    // Deterministic branch and commit
    assert_eq!(fx.git.branches(), vec!["asa/fix-t-1"]);
    assert_eq!(fx.git.commits(), vec!["asa: automated fix for task t-1"]);
}

#[tokio::test]
async fn captured_test_output_is_persisted_and_truncated() {
    let fx = Fixture::new();
    let id = fx.create_task("t-1");

    let long_output = "x".repeat(10_000) + "TAIL_MARKER";
    fx.sandbox.push_exit(1, long_output);
    fx.script_good_fix();
    fx.sandbox.push_exit(0, "ok");

    fx.orchestrator(&id).run().await.unwrap();

    let task = fx.task(&id);
    let output = task.test_output.unwrap();
    assert!(output.len() <= 5_000);
    assert!(output.ends_with("TAIL_MARKER"));
}

// ── Early failures ───────────────────────────────────────────────────────────

#[tokio::test]
async fn tests_passing_before_fix_means_no_bug() {
    let fx = Fixture::new();
    let id = fx.create_task("t-1");
    fx.sandbox.push_exit(0, "all green");

    let final_state = fx.orchestrator(&id).run().await.unwrap();
    assert_eq!(final_state, TaskState::Failed);

    let task = fx.task(&id);
    assert!(task.logs.contains("no bug observed"));
    // The provider was never consulted
    assert!(fx.provider.calls().is_empty());
}

#[tokio::test]
async fn clone_auth_failure_fails_with_kind() {
    let fx = Fixture::new();
    let id = fx.create_task("t-1");
    fx.git
        .fail_clone(GitError::Authentication("bad token".to_string()));

    let final_state = fx.orchestrator(&id).run().await.unwrap();
    assert_eq!(final_state, TaskState::Failed);

    let task = fx.task(&id);
    assert!(task.logs.contains("git_authentication_failed"));
    assert!(task.workspace_path.is_none());
}

#[tokio::test]
async fn missing_task_is_an_error() {
    let fx = Fixture::new();
    let orchestrator = fx.orchestrator(&asa_core::TaskId::new("ghost"));
    let err = orchestrator.run().await.unwrap_err();
    assert!(matches!(err, OrchestratorError::TaskNotFound(_)));
}

#[tokio::test]
async fn terminal_task_is_left_untouched() {
    let fx = Fixture::new();
    let id = fx.create_task("t-1");
    fx.store
        .commit(Event::TaskStatus {
            id: id.clone(),
            status: TaskState::Failed,
            epoch_ms: fx.clock.epoch_ms(),
        })
        .unwrap();

    let final_state = fx.orchestrator(&id).run().await.unwrap();
    assert_eq!(final_state, TaskState::Failed);
    assert!(fx.git.cloned_to().is_empty());
}

// ── Index degradation ────────────────────────────────────────────────────────

#[tokio::test]
async fn semantic_index_failure_falls_back_to_lexical() {
    let fx = Fixture::new();
    let id = fx.create_task("t-1");
    fx.index
        .fail_build(IndexError::BuildFailed("embedding service down".to_string()));
    fx.script_happy_path();

    let final_state = fx.orchestrator(&id).run().await.unwrap();
    assert_eq!(final_state, TaskState::Completed);

    let task = fx.task(&id);
    assert!(task.logs.contains("falling back to lexical index"));
}

// ── Behavioral verification branch ───────────────────────────────────────────

#[tokio::test]
async fn behavioral_verification_runs_generated_test() {
    let mut fx = Fixture::new();
    fx.config.behavioral_verification = true;
    let id = fx.create_task("t-1");

    fx.provider.push_text(behavioral_test_json(), 50, 30);
    fx.sandbox.push_exit(1, "repro fails"); // behavioral test: bug confirmed
    fx.sandbox.push_exit(1, "unit tests fail");
    fx.script_good_fix();
    fx.sandbox.push_exit(0, "unit tests pass");
    fx.sandbox.push_exit(0, "repro passes"); // behavioral test: fix validated

    let final_state = fx.orchestrator(&id).run().await.unwrap();
    assert_eq!(final_state, TaskState::Completed);

    let task = fx.task(&id);
    let test_path = task.behavioral_test_path.unwrap();
    assert!(test_path.to_string_lossy().contains(".asa_tests"));
    assert!(test_path.to_string_lossy().ends_with("repro_sum.py"));
    assert!(task.logs.contains("bug confirmed"));
    assert!(task.logs.contains("fix validated"));

    // The behavioral test runs with the interpreter, in the workspace
    let behavioral_calls: Vec<_> = fx
        .sandbox
        .calls()
        .into_iter()
        .filter(|c| c.command.starts_with("python "))
        .collect();
    assert_eq!(behavioral_calls.len(), 2);
}

#[tokio::test]
async fn behavioral_generation_failure_is_nonfatal() {
    let mut fx = Fixture::new();
    fx.config.behavioral_verification = true;
    let id = fx.create_task("t-1");

    // The generation call fails permanently; verification degrades to
    // bug_not_found and the unit-test pipeline continues
    fx.provider
        .push_error(asa_adapters::LlmError::Api("HTTP 500: boom".to_string()));
    fx.sandbox.push_exit(1, "unit tests fail");
    fx.script_good_fix();
    fx.sandbox.push_exit(0, "unit tests pass");
    fx.sandbox.push_exit(1, "repro still fails"); // fix_invalid, still non-fatal

    let final_state = fx.orchestrator(&id).run().await.unwrap();
    assert_eq!(final_state, TaskState::Completed);

    let task = fx.task(&id);
    assert!(task.logs.contains("non-fatal"));
}

// ── Publication ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn pr_publication_failure_does_not_demote_fix() {
    let mut fx = Fixture::new();
    fx.config.publish_branch = true;
    let id = fx.create_task("t-1");
    fx.script_happy_path();
    fx.forge
        .fail_next(GitError::ForgeRateLimit("slow down".to_string()));

    let final_state = fx.orchestrator(&id).run().await.unwrap();
    assert_eq!(final_state, TaskState::Completed);

    let task = fx.task(&id);
    assert!(task.pr_url.is_none());
    assert!(task.logs.contains("pull request failed (non-fatal)"));
    assert_eq!(fx.git.pushes(), vec!["asa/fix-t-1"]);
}

#[tokio::test]
async fn successful_publication_records_pr_url() {
    let mut fx = Fixture::new();
    fx.config.publish_branch = true;
    let id = fx.create_task("t-1");
    fx.script_happy_path();

    fx.orchestrator(&id).run().await.unwrap();

    let task = fx.task(&id);
    assert!(task.pr_url.unwrap().contains("asa/fix-t-1"));
    assert_eq!(fx.forge.created().len(), 1);
}

// ── Wall-clock budget ────────────────────────────────────────────────────────

#[tokio::test]
async fn zero_task_timeout_lands_in_timeout_state() {
    let mut fx = Fixture::new();
    fx.config.task_timeout = Some(Duration::ZERO);
    let id = fx.create_task("t-1");

    let final_state = fx.orchestrator(&id).run().await.unwrap();
    assert_eq!(final_state, TaskState::Timeout);
    assert_eq!(fx.task(&id).status, TaskState::Timeout);
}

// ── Updated-at monotonicity ──────────────────────────────────────────────────

#[tokio::test]
async fn updated_at_strictly_increases_across_run() {
    let fx = Fixture::new();
    let id = fx.create_task("t-1");
    fx.script_happy_path();

    let before = fx.task(&id).updated_at_epoch_ms;
    fx.orchestrator(&id).run().await.unwrap();
    // Frozen fake clock: monotonicity comes from the touch bump
    assert!(fx.task(&id).updated_at_epoch_ms > before);
}
