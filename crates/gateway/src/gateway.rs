// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The gateway proper: budget gates, pinned-model calls, retries, and
//! usage logging.

use crate::limits::BudgetLimits;
use crate::prompt::{PromptError, PromptStore, PromptVersion};
use asa_adapters::{retry, ChatMessage, LlmError, LlmProvider, RetryError};
use asa_core::{
    calculate_cost, model_config, AsaError, Clock, ErrorKind, Event, Purpose, TaskId, UsageRecord,
    UsageStatus,
};
use asa_storage::{Store, StoreError};
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by gateway calls.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Budget violations, provider failures, and schema failures, all
    /// carrying a taxonomy kind.
    #[error(transparent)]
    Domain(#[from] AsaError),
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
    #[error("prompt error: {0}")]
    Prompt(#[from] PromptError),
}

impl GatewayError {
    /// Taxonomy kind, when the failure carries one.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            GatewayError::Domain(err) => Some(err.kind),
            _ => None,
        }
    }

    /// Whether the underlying failure was transient retries running dry.
    pub fn is_retry_exhausted(&self) -> bool {
        matches!(self, GatewayError::Domain(err) if err.details.contains_key("retry_exhausted"))
    }
}

/// Instance usage counters plus budget occupancy, for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct UsageSummary {
    pub task_id: TaskId,
    pub principal: Option<String>,
    pub call_counts: HashMap<String, u32>,
    pub total_tokens: u64,
    pub total_cost_usd: f64,
    pub token_usage_pct: f64,
    pub cost_usage_pct: f64,
}

/// Per-task gateway bound to one provider and one durable store.
pub struct Gateway<P: LlmProvider, C: Clock> {
    provider: P,
    store: Store,
    prompts: Arc<PromptStore>,
    limits: BudgetLimits,
    task_id: TaskId,
    principal: Option<String>,
    clock: C,
    /// Successful calls per purpose for this gateway instance.
    call_counts: Mutex<HashMap<Purpose, u32>>,
}

impl<P: LlmProvider, C: Clock> Gateway<P, C> {
    pub fn new(
        provider: P,
        store: Store,
        prompts: Arc<PromptStore>,
        limits: BudgetLimits,
        task_id: TaskId,
        principal: Option<String>,
        clock: C,
    ) -> Self {
        Self {
            provider,
            store,
            prompts,
            limits,
            task_id,
            principal,
            clock,
            call_counts: Mutex::new(HashMap::new()),
        }
    }

    /// Make a chat call for a purpose, with budget enforcement, transient
    /// retries, and per-attempt usage logging.
    pub async fn chat(
        &self,
        purpose: Purpose,
        messages: &[ChatMessage],
        max_tokens: Option<u32>,
        temperature: Option<f64>,
    ) -> Result<String, GatewayError> {
        self.chat_inner(purpose, messages, max_tokens, temperature, None)
            .await
    }

    /// Make a call through a versioned prompt and validate the JSON
    /// response against its output schema.
    pub async fn chat_with_prompt(
        &self,
        purpose: Purpose,
        version: &str,
        vars: &HashMap<String, String>,
    ) -> Result<serde_json::Value, GatewayError> {
        let prompt = self.prompts.load(purpose, version)?;

        tracing::info!(
            purpose = %purpose,
            prompt_version = %prompt.version,
            schema_version = %prompt.schema_version,
            checksum = %prompt.checksum,
            "using versioned prompt"
        );

        let messages = prompt.messages(vars);
        let text = self
            .chat_inner(
                purpose,
                &messages,
                prompt.model_config.max_tokens,
                prompt.model_config.temperature,
                Some(prompt.as_ref()),
            )
            .await?;

        let value: serde_json::Value = serde_json::from_str(&text).map_err(|e| {
            AsaError::new(ErrorKind::LlmInvalidResponse, "LLM response is not valid JSON")
                .with_detail("parse_error", e.to_string())
                .with_detail("response", head_chars(&text, 200))
        })?;

        prompt.validate_response(&value).map_err(|message| {
            AsaError::new(ErrorKind::LlmInvalidResponse, message)
                .with_detail("schema_version", prompt.schema_version.clone())
        })?;

        Ok(value)
    }

    async fn chat_inner(
        &self,
        purpose: Purpose,
        messages: &[ChatMessage],
        max_tokens: Option<u32>,
        temperature: Option<f64>,
        prompt: Option<&PromptVersion>,
    ) -> Result<String, GatewayError> {
        let config = model_config(purpose);
        self.check_budgets(purpose, &config)?;

        let model = config.model;
        let max_tokens = max_tokens.unwrap_or(config.max_tokens_per_call);
        let temperature = temperature.unwrap_or(config.temperature);

        tracing::info!(
            %purpose,
            model,
            task = %self.task_id,
            max_tokens,
            "gateway call"
        );

        let result = retry::with_policy(|_attempt| async move {
            let started_ms = self.clock.epoch_ms();
            let outcome = self
                .provider
                .chat(model, messages, max_tokens, temperature, self.limits.llm_call_timeout)
                .await;
            let latency_ms = self.clock.epoch_ms().saturating_sub(started_ms);

            match outcome {
                Ok(response) => {
                    let cost = calculate_cost(
                        model,
                        response.usage.prompt_tokens,
                        response.usage.completion_tokens,
                    );
                    self.log_usage(
                        purpose,
                        model,
                        &response.usage,
                        cost,
                        latency_ms,
                        UsageStatus::Success,
                        None,
                        prompt,
                    )
                    .map_err(storage_failure)?;

                    tracing::info!(
                        tokens = response.usage.total_tokens,
                        cost_usd = cost,
                        latency_ms,
                        "gateway call succeeded"
                    );
                    Ok((response, cost))
                }
                Err(error) => {
                    let classified = map_llm_error(&error);
                    self.log_usage(
                        purpose,
                        model,
                        &Default::default(),
                        0.0,
                        latency_ms,
                        UsageStatus::Error,
                        Some(error.to_string()),
                        prompt,
                    )
                    .map_err(storage_failure)?;

                    tracing::warn!(kind = %classified.kind, error = %error, "gateway call failed");
                    Err(classified)
                }
            }
        })
        .await;

        match result {
            Ok((response, _cost)) => {
                *self.call_counts.lock().entry(purpose).or_insert(0) += 1;
                Ok(response.text)
            }
            Err(RetryError::Aborted(error)) => Err(error.into()),
            Err(RetryError::Exhausted { attempts, error }) => Err(AsaError {
                kind: error.kind,
                message: format!("retry exhausted after {attempts} attempts: {}", error.message),
                details: {
                    let mut details = error.details;
                    details.insert("retry_exhausted".to_string(), attempts.to_string());
                    details
                },
            }
            .into()),
        }
    }

    /// Budget gates, evaluated in order against the durable usage store.
    /// Any violation raises a resource-kind error; no provider call is made.
    fn check_budgets(
        &self,
        purpose: Purpose,
        config: &asa_core::ModelConfig,
    ) -> Result<(), GatewayError> {
        let max_calls = config.max_calls_per_task;
        let calls = self
            .call_counts
            .lock()
            .get(&purpose)
            .copied()
            .unwrap_or(0);
        if calls >= max_calls {
            return Err(AsaError::new(
                ErrorKind::CostBudgetExceeded,
                format!("max calls for {purpose} exceeded ({calls}/{max_calls})"),
            )
            .with_detail("purpose", purpose.to_string())
            .into());
        }

        let usage = self
            .store
            .with_state(|state| state.task_usage(self.task_id.as_str()));

        if usage.total_tokens >= self.limits.max_tokens_per_task {
            return Err(AsaError::new(
                ErrorKind::TokenBudgetExceeded,
                format!(
                    "token budget exceeded ({}/{})",
                    usage.total_tokens, self.limits.max_tokens_per_task
                ),
            )
            .with_detail("task_id", self.task_id.as_str())
            .into());
        }

        // A call is blocked when the spend so far plus the floor cost of
        // one more call on this model would overrun the cap. The floor
        // keeps a cap smaller than any possible call from ever reaching
        // the provider.
        let floor = calculate_cost(config.model, MIN_BILLABLE_TOKENS, MIN_BILLABLE_TOKENS);
        if usage.total_cost_usd >= self.limits.max_cost_per_task_usd
            || usage.total_cost_usd + floor > self.limits.max_cost_per_task_usd
        {
            return Err(AsaError::new(
                ErrorKind::CostBudgetExceeded,
                format!(
                    "cost budget exceeded (${:.4}/${:.2})",
                    usage.total_cost_usd, self.limits.max_cost_per_task_usd
                ),
            )
            .with_detail("task_id", self.task_id.as_str())
            .into());
        }

        if let Some(principal) = &self.principal {
            let day_start = utc_day_start_ms(self.clock.epoch_ms());
            let spent = self
                .store
                .with_state(|state| state.principal_cost_since(principal, day_start));
            if spent >= self.limits.max_cost_per_principal_per_day_usd {
                return Err(AsaError::new(
                    ErrorKind::CostBudgetExceeded,
                    format!(
                        "daily cost budget exceeded for {principal} (${:.4}/${:.2})",
                        spent, self.limits.max_cost_per_principal_per_day_usd
                    ),
                )
                .with_detail("principal", principal.clone())
                .with_detail("period", "daily")
                .into());
            }
        }

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn log_usage(
        &self,
        purpose: Purpose,
        model: &str,
        usage: &asa_adapters::ChatUsage,
        cost: f64,
        latency_ms: u64,
        status: UsageStatus,
        error: Option<String>,
        prompt: Option<&PromptVersion>,
    ) -> Result<(), StoreError> {
        self.store.commit(Event::UsageRecorded {
            record: UsageRecord {
                task_id: self.task_id.clone(),
                principal: self.principal.clone(),
                purpose,
                model: model.to_string(),
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
                cost_usd: cost,
                latency_ms,
                status,
                error,
                prompt_version: prompt.map(|p| p.version.clone()),
                schema_version: prompt.map(|p| p.schema_version.clone()),
                recorded_at_epoch_ms: self.clock.epoch_ms(),
            },
        })
    }

    /// Usage summary for this gateway instance.
    pub fn usage_summary(&self) -> UsageSummary {
        let usage = self
            .store
            .with_state(|state| state.task_usage(self.task_id.as_str()));

        UsageSummary {
            task_id: self.task_id.clone(),
            principal: self.principal.clone(),
            call_counts: self
                .call_counts
                .lock()
                .iter()
                .map(|(p, n)| (p.to_string(), *n))
                .collect(),
            total_tokens: usage.total_tokens,
            total_cost_usd: usage.total_cost_usd,
            token_usage_pct: usage.total_tokens as f64 / self.limits.max_tokens_per_task as f64
                * 100.0,
            cost_usage_pct: usage.total_cost_usd / self.limits.max_cost_per_task_usd * 100.0,
        }
    }
}

/// Assumed floor, in tokens each way, for the cheapest useful call when
/// projecting whether one more call fits the cost budget.
const MIN_BILLABLE_TOKENS: u64 = 1_000;

/// Midnight UTC of the day containing `epoch_ms`.
fn utc_day_start_ms(epoch_ms: u64) -> u64 {
    let datetime = match Utc.timestamp_millis_opt(epoch_ms as i64).single() {
        Some(dt) => dt,
        None => return 0,
    };
    let day = datetime.date_naive();
    day.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp_millis().max(0) as u64)
        .unwrap_or(0)
}

fn map_llm_error(error: &LlmError) -> AsaError {
    match error {
        LlmError::RateLimited(msg) => AsaError::new(ErrorKind::LlmRateLimit, msg.clone()),
        LlmError::Timeout(timeout) => AsaError::new(
            ErrorKind::LlmTimeout,
            format!("provider call timed out after {timeout:?}"),
        ),
        LlmError::Connection(msg) => AsaError::new(ErrorKind::NetworkConnection, msg.clone()),
        LlmError::MalformedResponse(msg) => {
            AsaError::new(ErrorKind::LlmInvalidResponse, msg.clone())
        }
        LlmError::Auth(msg) => {
            AsaError::classified("LlmError", format!("authentication failed: {msg}"))
        }
        LlmError::Api(msg) => AsaError::classified("LlmError", msg),
    }
}

/// First `n` characters of `s`, on a char boundary.
fn head_chars(s: &str, n: usize) -> String {
    let mut end = n.min(s.len());
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

fn storage_failure(error: StoreError) -> AsaError {
    // A failed usage append must not look transient; surface as permanent.
    AsaError::new(ErrorKind::SandboxFailed, format!("usage logging failed: {error}"))
}

#[cfg(test)]
#[path = "gateway_tests.rs"]
mod tests;
