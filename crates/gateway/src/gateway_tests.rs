// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::prompt::PromptStore;
use asa_adapters::{FakeLlmProvider, LlmError};
use asa_core::{FakeClock, Task, UsageStatus};
use std::time::Duration;

struct Fixture {
    _dir: tempfile::TempDir,
    store: Store,
    provider: FakeLlmProvider,
    clock: FakeClock,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        store
            .commit(Event::TaskCreated {
                task: Task::test_task("t-1"),
            })
            .unwrap();
        Self {
            _dir: dir,
            store,
            provider: FakeLlmProvider::new(),
            clock: FakeClock::new(),
        }
    }

    fn gateway(&self, limits: BudgetLimits, principal: Option<&str>) -> Gateway<FakeLlmProvider, FakeClock> {
        Gateway::new(
            self.provider.clone(),
            self.store.clone(),
            Arc::new(PromptStore::builtin()),
            limits,
            TaskId::new("t-1"),
            principal.map(str::to_string),
            self.clock.clone(),
        )
    }

    fn records(&self) -> Vec<UsageRecord> {
        self.store
            .with_state(|state| state.task_usage_records("t-1").to_vec())
    }
}

fn user_messages() -> Vec<ChatMessage> {
    vec![ChatMessage::user("analyze this")]
}

// ── Happy path ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn chat_returns_text_and_logs_usage() {
    let fx = Fixture::new();
    fx.provider.push_text("looks buggy", 100, 50);

    let gateway = fx.gateway(BudgetLimits::default(), None);
    let text = gateway
        .chat(Purpose::CodeAnalysis, &user_messages(), None, None)
        .await
        .unwrap();

    assert_eq!(text, "looks buggy");

    let records = fx.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, UsageStatus::Success);
    assert_eq!(records[0].total_tokens, 150);
    assert_eq!(records[0].purpose, Purpose::CodeAnalysis);
    assert!(records[0].cost_usd > 0.0);
}

#[tokio::test]
async fn pinned_model_and_defaults_are_used() {
    let fx = Fixture::new();
    fx.provider.push_text("ok", 1, 1);

    let gateway = fx.gateway(BudgetLimits::default(), None);
    gateway
        .chat(Purpose::FixGeneration, &user_messages(), None, None)
        .await
        .unwrap();

    let calls = fx.provider.calls();
    let config = model_config(Purpose::FixGeneration);
    assert_eq!(calls[0].model, config.model);
    assert_eq!(calls[0].max_tokens, config.max_tokens_per_call);
    assert_eq!(calls[0].temperature, config.temperature);
}

#[tokio::test]
async fn explicit_overrides_win() {
    let fx = Fixture::new();
    fx.provider.push_text("ok", 1, 1);

    let gateway = fx.gateway(BudgetLimits::default(), None);
    gateway
        .chat(Purpose::CodeAnalysis, &user_messages(), Some(64), Some(0.9))
        .await
        .unwrap();

    assert_eq!(fx.provider.calls()[0].max_tokens, 64);
    assert_eq!(fx.provider.calls()[0].temperature, 0.9);
}

// ── Budget gates ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn token_budget_blocks_before_provider_call() {
    let fx = Fixture::new();
    fx.provider.push_text("first", 60, 40); // consumes 100 tokens

    let limits = BudgetLimits {
        max_tokens_per_task: 100,
        ..Default::default()
    };
    let gateway = fx.gateway(limits, None);

    // First call lands exactly on the cap
    gateway
        .chat(Purpose::CodeAnalysis, &user_messages(), None, None)
        .await
        .unwrap();

    // Second call is rejected before the provider sees it
    let err = gateway
        .chat(Purpose::CodeAnalysis, &user_messages(), None, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::TokenBudgetExceeded));
    assert_eq!(fx.provider.calls().len(), 1);
}

#[tokio::test]
async fn tiny_cost_cap_blocks_first_call_entirely() {
    let fx = Fixture::new();
    fx.provider.push_text("should never be used", 10, 10);

    let limits = BudgetLimits {
        max_cost_per_task_usd: 0.01,
        ..Default::default()
    };
    let gateway = fx.gateway(limits, None);

    let err = gateway
        .chat(Purpose::FixGeneration, &user_messages(), None, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::CostBudgetExceeded));

    // No provider call, no success record
    assert!(fx.provider.calls().is_empty());
    assert!(fx
        .records()
        .iter()
        .all(|r| r.status != UsageStatus::Success));
}

#[tokio::test]
async fn per_purpose_call_cap_is_enforced() {
    let fx = Fixture::new();
    // guardian allows 3 calls per task
    for _ in 0..3 {
        fx.provider.push_text("{\"approved\": true, \"reasons\": []}", 1, 1);
    }

    let gateway = fx.gateway(BudgetLimits::default(), None);
    for _ in 0..3 {
        gateway
            .chat(Purpose::Guardian, &user_messages(), None, None)
            .await
            .unwrap();
    }

    let err = gateway
        .chat(Purpose::Guardian, &user_messages(), None, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::CostBudgetExceeded));
    assert_eq!(fx.provider.calls().len(), 3);

    // Other purposes are unaffected by guardian's cap
    fx.provider.push_text("fine", 1, 1);
    assert!(gateway
        .chat(Purpose::CodeAnalysis, &user_messages(), None, None)
        .await
        .is_ok());
}

#[tokio::test]
async fn principal_daily_budget_is_enforced() {
    let fx = Fixture::new();
    // Prior spend today for alice, on another task
    fx.store
        .commit(Event::UsageRecorded {
            record: UsageRecord {
                task_id: TaskId::new("t-other"),
                principal: Some("alice".to_string()),
                purpose: Purpose::FixGeneration,
                model: "gpt-4o".to_string(),
                prompt_tokens: 0,
                completion_tokens: 0,
                total_tokens: 0,
                cost_usd: 19.99,
                latency_ms: 1,
                status: UsageStatus::Success,
                error: None,
                prompt_version: None,
                schema_version: None,
                recorded_at_epoch_ms: fx.clock.epoch_ms(),
            },
        })
        .unwrap();

    let limits = BudgetLimits {
        max_cost_per_principal_per_day_usd: 20.0,
        ..Default::default()
    };

    // alice's projected spend is not over yet (19.99 < 20.0)
    let gateway = fx.gateway(limits.clone(), Some("alice"));
    fx.provider.push_text("ok", 1, 1);
    gateway
        .chat(Purpose::CodeAnalysis, &user_messages(), None, None)
        .await
        .unwrap();

    // Push alice over the line and the next call is rejected
    let tight = BudgetLimits {
        max_cost_per_principal_per_day_usd: 19.0,
        ..Default::default()
    };
    let gateway = fx.gateway(tight, Some("alice"));
    let err = gateway
        .chat(Purpose::CodeAnalysis, &user_messages(), None, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::CostBudgetExceeded));

    // bob is unaffected
    let gateway = fx.gateway(limits, Some("bob"));
    fx.provider.push_text("ok", 1, 1);
    assert!(gateway
        .chat(Purpose::CodeAnalysis, &user_messages(), None, None)
        .await
        .is_ok());
}

// ── Retries and error logging ────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn transient_failure_retries_and_logs_every_attempt() {
    let fx = Fixture::new();
    fx.provider
        .push_error(LlmError::RateLimited("429".to_string()));
    fx.provider.push_text("recovered", 10, 10);

    let gateway = fx.gateway(BudgetLimits::default(), None);
    let text = gateway
        .chat(Purpose::CodeAnalysis, &user_messages(), None, None)
        .await
        .unwrap();
    assert_eq!(text, "recovered");

    let records = fx.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].status, UsageStatus::Error);
    assert!(records[0].error.as_deref().unwrap().contains("429"));
    assert_eq!(records[1].status, UsageStatus::Success);
}

#[tokio::test(start_paused = true)]
async fn rate_limit_exhaustion_reports_retry_exhausted() {
    let fx = Fixture::new();
    for _ in 0..5 {
        fx.provider
            .push_error(LlmError::RateLimited("429".to_string()));
    }

    let gateway = fx.gateway(BudgetLimits::default(), None);
    let err = gateway
        .chat(Purpose::CodeAnalysis, &user_messages(), None, None)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), Some(ErrorKind::LlmRateLimit));
    assert!(err.is_retry_exhausted());
    assert_eq!(fx.records().len(), 5);
}

#[tokio::test]
async fn timeout_maps_to_llm_timeout_kind() {
    let fx = Fixture::new();
    fx.provider
        .push_error(LlmError::Timeout(Duration::from_secs(120)));
    fx.provider.push_text("late but fine", 5, 5);

    let gateway = fx.gateway(BudgetLimits::default(), None);
    // llm_timeout is transient: the retry recovers
    let text = gateway
        .chat(Purpose::CodeAnalysis, &user_messages(), None, None)
        .await
        .unwrap();
    assert_eq!(text, "late but fine");
}

// ── Versioned prompts ────────────────────────────────────────────────────────

#[tokio::test]
async fn chat_with_prompt_parses_and_validates() {
    let fx = Fixture::new();
    fx.provider.push_text(
        r#"{"patches": [{"file_path": "a.py", "patch_type": "replace", "start_line": 1, "end_line": 1, "new_code": "x = 2\n", "description": "fix"}], "confidence": 0.8, "rationale": "because"}"#,
        200,
        80,
    );

    let gateway = fx.gateway(BudgetLimits::default(), None);
    let mut vars = HashMap::new();
    vars.insert("bug_description".to_string(), "x is wrong".to_string());
    let value = gateway
        .chat_with_prompt(Purpose::FixGeneration, "v1", &vars)
        .await
        .unwrap();

    assert_eq!(value["confidence"], 0.8);
    assert_eq!(value["patches"][0]["file_path"], "a.py");

    // Prompt provenance lands in the usage record
    let records = fx.records();
    assert_eq!(records[0].schema_version.as_deref(), Some("v1"));
    assert!(records[0].prompt_version.is_some());
}

#[tokio::test]
async fn chat_with_prompt_rejects_non_json() {
    let fx = Fixture::new();
    fx.provider.push_text("I think the fix is...", 10, 10);

    let gateway = fx.gateway(BudgetLimits::default(), None);
    let err = gateway
        .chat_with_prompt(Purpose::FixGeneration, "v1", &HashMap::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::LlmInvalidResponse));
}

#[tokio::test]
async fn chat_with_prompt_rejects_schema_violation() {
    let fx = Fixture::new();
    fx.provider.push_text(r#"{"patches": []}"#, 10, 10);

    let gateway = fx.gateway(BudgetLimits::default(), None);
    let err = gateway
        .chat_with_prompt(Purpose::FixGeneration, "v1", &HashMap::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::LlmInvalidResponse));
}

// ── Summary ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn usage_summary_reports_counts_and_occupancy() {
    let fx = Fixture::new();
    fx.provider.push_text("a", 500, 500);
    fx.provider.push_text("b", 500, 500);

    let limits = BudgetLimits {
        max_tokens_per_task: 4_000,
        ..Default::default()
    };
    let gateway = fx.gateway(limits, None);
    for _ in 0..2 {
        gateway
            .chat(Purpose::CodeAnalysis, &user_messages(), None, None)
            .await
            .unwrap();
    }

    let summary = gateway.usage_summary();
    assert_eq!(summary.call_counts.get("code_analysis"), Some(&2));
    assert_eq!(summary.total_tokens, 2_000);
    assert!((summary.token_usage_pct - 50.0).abs() < 1e-9);
}
