// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

// ── Fix-generation retries ───────────────────────────────────────────────────

#[tokio::test]
async fn failed_generation_retries_then_succeeds() {
    let fx = Fixture::new();
    let id = fx.create_task("t-1");

    fx.sandbox.push_exit(1, "1 failed");
    // First attempt returns prose instead of JSON (permanent, consumes
    // one state-level retry); second attempt is a good fix
    fx.provider.push_text("I would change the minus sign", 50, 20);
    fx.provider.push_text(good_fix_json(), 200, 100);
    fx.sandbox.push_exit(0, "1 passed");

    let final_state = fx.orchestrator(&id).run().await.unwrap();
    assert_eq!(final_state, TaskState::Completed);

    let task = fx.task(&id);
    // The retry pseudo-state re-entered GENERATING_FIX
    assert!(task
        .logs
        .contains("transitioned: GENERATING_FIX -> GENERATING_FIX (failure)"));
    assert_eq!(fx.provider.calls().len(), 2);
}

#[tokio::test]
async fn generation_retry_budget_exhausts_to_failed() {
    let fx = Fixture::new();
    let id = fx.create_task("t-1");

    fx.sandbox.push_exit(1, "1 failed");
    // Budget is 2 retries: three bad attempts exhaust it
    for _ in 0..3 {
        fx.provider.push_text("still not json", 10, 5);
    }

    let final_state = fx.orchestrator(&id).run().await.unwrap();
    assert_eq!(final_state, TaskState::Failed);

    let task = fx.task(&id);
    assert!(task.logs.contains("retry budget exhausted for GENERATING_FIX"));
    assert_eq!(fx.provider.calls().len(), 3);
}

// ── Post-fix test retries ────────────────────────────────────────────────────

#[tokio::test]
async fn persistent_test_failures_exhaust_and_fail() {
    let fx = Fixture::new();
    let id = fx.create_task("t-1");

    fx.sandbox.push_exit(1, "1 failed");
    fx.script_good_fix();
    // Budget is 1 retry: two failing post-fix runs exhaust it
    fx.sandbox.push_exit(1, "still 1 failed");
    fx.sandbox.push_exit(1, "still 1 failed");

    let final_state = fx.orchestrator(&id).run().await.unwrap();
    assert_eq!(final_state, TaskState::Failed);

    let task = fx.task(&id);
    assert!(task
        .logs
        .contains("retry budget exhausted for RUNNING_TESTS_AFTER_FIX"));
    assert!(task
        .logs
        .contains("transitioned: RUNNING_TESTS_AFTER_FIX -> RUNNING_TESTS_AFTER_FIX (tests_fail)"));
    // The fix is generated once; retries only re-run the tests
    assert_eq!(fx.provider.calls().len(), 1);
    // Sandbox ran: before, after, after-retry
    assert_eq!(fx.sandbox.calls().len(), 3);
}

#[tokio::test]
async fn sandbox_error_after_fix_consumes_a_retry() {
    let fx = Fixture::new();
    let id = fx.create_task("t-1");

    fx.sandbox.push_exit(1, "1 failed");
    fx.script_good_fix();
    fx.sandbox
        .push_error(asa_adapters::SandboxError::Failed("runner died".to_string()));
    fx.sandbox.push_exit(0, "1 passed");

    let final_state = fx.orchestrator(&id).run().await.unwrap();
    assert_eq!(final_state, TaskState::Completed);

    let task = fx.task(&id);
    assert!(task.logs.contains("test execution failed"));
}

// ── Counter reset ────────────────────────────────────────────────────────────

#[tokio::test]
async fn patch_application_failure_is_retried() {
    let fx = Fixture::new();
    let id = fx.create_task("t-1");

    fx.sandbox.push_exit(1, "1 failed");
    // First fix targets a file that does not exist: application fails and
    // the state retries; the second fix is sound
    let bad_fix = serde_json::json!({
        "patches": [{
            "file_path": "src/ghost.py",
            "patch_type": "replace",
            "start_line": 1,
            "end_line": 1,
            "new_code": "x = 1\n",
            "description": "phantom"
        }],
        "confidence": 0.4,
        "rationale": "wrong file"
    })
    .to_string();
    fx.provider.push_text(bad_fix, 100, 50);
    fx.provider.push_text(good_fix_json(), 200, 100);
    fx.sandbox.push_exit(0, "1 passed");

    let final_state = fx.orchestrator(&id).run().await.unwrap();
    assert_eq!(final_state, TaskState::Completed);

    let task = fx.task(&id);
    assert!(task.logs.contains("patch application failed"));
}
