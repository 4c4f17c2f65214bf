// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task state machine.
//!
//! The transition table is the authoritative specification of the fix
//! pipeline. `Retry` is a pseudo-state: it consults the retry budget of the
//! state that emitted the signal and either re-enters that state or fails
//! the task with `retry_exhausted`. It carries no effect of its own.

use crate::time_fmt::format_elapsed_ms;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// All states in the bug-fixing pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Queued,
    Init,
    CloningRepo,
    IndexingCode,
    VerifyingBugBehavior,
    RunningTestsBeforeFix,
    GeneratingFix,
    RunningTestsAfterFix,
    VerifyingFixBehavior,
    CreatingPrBranch,
    Retry,
    Completed,
    Failed,
    Timeout,
    Cancelled,
}

crate::simple_display! {
    TaskState {
        Queued => "QUEUED",
        Init => "INIT",
        CloningRepo => "CLONING_REPO",
        IndexingCode => "INDEXING_CODE",
        VerifyingBugBehavior => "VERIFYING_BUG_BEHAVIOR",
        RunningTestsBeforeFix => "RUNNING_TESTS_BEFORE_FIX",
        GeneratingFix => "GENERATING_FIX",
        RunningTestsAfterFix => "RUNNING_TESTS_AFTER_FIX",
        VerifyingFixBehavior => "VERIFYING_FIX_BEHAVIOR",
        CreatingPrBranch => "CREATING_PR_BRANCH",
        Retry => "RETRY",
        Completed => "COMPLETED",
        Failed => "FAILED",
        Timeout => "TIMEOUT",
        Cancelled => "CANCELLED",
    }
}

impl TaskState {
    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Timeout | TaskState::Cancelled
        )
    }

    /// Check if this is a successful terminal state.
    pub fn is_successful(&self) -> bool {
        *self == TaskState::Completed
    }
}

/// Closed-set outcome of a state's effect, used to index the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    Success,
    Failure,
    Timeout,
    RetryExhausted,
    TestsPass,
    TestsFail,
    BugConfirmed,
    BugNotFound,
    FixValidated,
    FixInvalid,
}

crate::simple_display! {
    Signal {
        Success => "success",
        Failure => "failure",
        Timeout => "timeout",
        RetryExhausted => "retry_exhausted",
        TestsPass => "tests_pass",
        TestsFail => "tests_fail",
        BugConfirmed => "bug_confirmed",
        BugNotFound => "bug_not_found",
        FixValidated => "fix_validated",
        FixInvalid => "fix_invalid",
    }
}

/// One entry per state visited. Append-only history on a machine instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateContext {
    pub state: TaskState,
    pub entered_at_epoch_ms: u64,
    pub exited_at_epoch_ms: Option<u64>,
    pub signal: Option<Signal>,
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl StateContext {
    fn new(state: TaskState, now_ms: u64) -> Self {
        Self {
            state,
            entered_at_epoch_ms: now_ms,
            exited_at_epoch_ms: None,
            signal: None,
            error: None,
            metadata: HashMap::new(),
        }
    }

    /// Duration of the visit, if the state has been exited.
    pub fn duration_ms(&self) -> Option<u64> {
        self.exited_at_epoch_ms
            .map(|exit| exit.saturating_sub(self.entered_at_epoch_ms))
    }
}

/// Per-state retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RetryBudget {
    max: u32,
    count: u32,
}

impl RetryBudget {
    fn new(max: u32) -> Self {
        Self { max, count: 0 }
    }
}

/// Error returned for a (state, signal) pair not present in the table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no valid transition from {from} with signal '{signal}'")]
pub struct TransitionError {
    pub from: TaskState,
    pub signal: Signal,
}

/// Summary of a machine run, for reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineSummary {
    pub current_state: TaskState,
    pub is_terminal: bool,
    pub is_successful: bool,
    pub total_states: usize,
    pub total_duration_ms: u64,
    pub retry_counts: HashMap<String, u32>,
}

/// Deterministic state machine driving a task through the fix pipeline.
#[derive(Debug, Clone)]
pub struct StateMachine {
    current: TaskState,
    history: Vec<StateContext>,
    retries: HashMap<TaskState, RetryBudget>,
    behavioral: bool,
}

/// Retry budgets per retry-eligible state.
const GENERATING_FIX_MAX_RETRIES: u32 = 2;
const TESTS_AFTER_FIX_MAX_RETRIES: u32 = 1;

impl StateMachine {
    /// Create a machine at `QUEUED`. `behavioral` selects the
    /// bug/fix-verification branch of the transition table.
    pub fn new(behavioral: bool, now_ms: u64) -> Self {
        let mut retries = HashMap::new();
        retries.insert(
            TaskState::GeneratingFix,
            RetryBudget::new(GENERATING_FIX_MAX_RETRIES),
        );
        retries.insert(
            TaskState::RunningTestsAfterFix,
            RetryBudget::new(TESTS_AFTER_FIX_MAX_RETRIES),
        );

        Self {
            current: TaskState::Queued,
            history: vec![StateContext::new(TaskState::Queued, now_ms)],
            retries,
            behavioral,
        }
    }

    pub fn current(&self) -> TaskState {
        self.current
    }

    pub fn is_terminal(&self) -> bool {
        self.current.is_terminal()
    }

    pub fn history(&self) -> &[StateContext] {
        &self.history
    }

    /// Retry count recorded for a state (0 if none).
    pub fn retry_count(&self, state: TaskState) -> u32 {
        self.retries.get(&state).map(|b| b.count).unwrap_or(0)
    }

    /// Attach metadata to the currently open state context.
    pub fn annotate(&mut self, key: impl Into<String>, value: impl Into<String>) {
        if let Some(ctx) = self.history.last_mut() {
            if ctx.exited_at_epoch_ms.is_none() {
                ctx.metadata.insert(key.into(), value.into());
            }
        }
    }

    /// The static transition table. Omitted pairs are invalid transitions.
    fn next_state(&self, from: TaskState, signal: Signal) -> Option<TaskState> {
        use Signal as S;
        use TaskState::*;
        match (from, signal) {
            (Queued, S::Success) => Some(Init),
            (Init, S::Success) => Some(CloningRepo),

            (CloningRepo, S::Success) => Some(IndexingCode),
            (CloningRepo, S::Failure) => Some(Failed),

            (IndexingCode, S::Success) if self.behavioral => Some(VerifyingBugBehavior),
            (IndexingCode, S::Success) => Some(RunningTestsBeforeFix),
            (IndexingCode, S::Failure) => Some(Failed),

            (VerifyingBugBehavior, S::BugConfirmed | S::BugNotFound) => {
                Some(RunningTestsBeforeFix)
            }

            (RunningTestsBeforeFix, S::TestsFail) => Some(GeneratingFix),
            // Tests passing before the fix means no bug was observed.
            (RunningTestsBeforeFix, S::TestsPass) => Some(Failed),
            (RunningTestsBeforeFix, S::Failure) => Some(Failed),

            (GeneratingFix, S::Success) => Some(RunningTestsAfterFix),
            (GeneratingFix, S::Failure) => Some(Retry),
            (GeneratingFix, S::RetryExhausted) => Some(Failed),

            (RunningTestsAfterFix, S::TestsPass) if self.behavioral => {
                Some(VerifyingFixBehavior)
            }
            (RunningTestsAfterFix, S::TestsPass) => Some(CreatingPrBranch),
            (RunningTestsAfterFix, S::TestsFail) => Some(Retry),
            (RunningTestsAfterFix, S::RetryExhausted) => Some(Failed),

            (VerifyingFixBehavior, S::FixValidated | S::FixInvalid) => Some(CreatingPrBranch),

            // PR publication failure does not demote a successful fix.
            (CreatingPrBranch, S::Success | S::Failure) => Some(Completed),

            _ => None,
        }
    }

    /// Transition on a signal, recording history.
    ///
    /// Returns the new current state. A transition that targets `Retry`
    /// resolves immediately: the budget of the emitting state decides
    /// between re-entry and `Failed`.
    pub fn transition(
        &mut self,
        signal: Signal,
        error: Option<String>,
        now_ms: u64,
    ) -> Result<TaskState, TransitionError> {
        let from = self.current;
        let next = self
            .next_state(from, signal)
            .ok_or(TransitionError { from, signal })?;

        self.finalize_open(signal, error, now_ms);

        if next == TaskState::Retry {
            return Ok(self.resolve_retry(from, now_ms));
        }

        // Counters reset only when the state is exited non-retry.
        if let Some(budget) = self.retries.get_mut(&from) {
            budget.count = 0;
        }

        self.enter(next, now_ms);
        Ok(next)
    }

    /// Force the `Timeout` terminal (task wall-clock budget exceeded).
    pub fn timeout(&mut self, now_ms: u64) {
        self.finalize_open(
            Signal::Timeout,
            Some("task wall-clock budget exceeded".to_string()),
            now_ms,
        );
        self.enter(TaskState::Timeout, now_ms);
    }

    /// Force the `Cancelled` terminal (cooperative cancellation observed).
    pub fn cancel(&mut self, now_ms: u64) {
        self.finalize_open(Signal::Failure, Some("cancelled".to_string()), now_ms);
        self.enter(TaskState::Cancelled, now_ms);
    }

    /// Force the `Failed` terminal (unrecoverable orchestration error).
    pub fn fail(&mut self, error: impl Into<String>, now_ms: u64) {
        self.finalize_open(Signal::Failure, Some(error.into()), now_ms);
        self.enter(TaskState::Failed, now_ms);
    }

    fn resolve_retry(&mut self, failing: TaskState, now_ms: u64) -> TaskState {
        let can_retry = self
            .retries
            .get(&failing)
            .map(|b| b.count < b.max)
            .unwrap_or(false);

        if can_retry {
            if let Some(budget) = self.retries.get_mut(&failing) {
                budget.count += 1;
            }
            let attempt = self.retry_count(failing);
            let mut ctx = StateContext::new(TaskState::Retry, now_ms);
            ctx.exited_at_epoch_ms = Some(now_ms);
            ctx.signal = Some(Signal::Success);
            ctx.metadata
                .insert("retry_of".to_string(), failing.to_string());
            ctx.metadata
                .insert("attempt".to_string(), attempt.to_string());
            self.history.push(ctx);
            self.enter(failing, now_ms);
            failing
        } else {
            let mut ctx = StateContext::new(TaskState::Retry, now_ms);
            ctx.exited_at_epoch_ms = Some(now_ms);
            ctx.signal = Some(Signal::RetryExhausted);
            ctx.error = Some(format!("retry budget exhausted for {failing}"));
            self.history.push(ctx);
            self.enter(TaskState::Failed, now_ms);
            TaskState::Failed
        }
    }

    fn finalize_open(&mut self, signal: Signal, error: Option<String>, now_ms: u64) {
        if let Some(ctx) = self.history.last_mut() {
            if ctx.exited_at_epoch_ms.is_none() {
                ctx.exited_at_epoch_ms = Some(now_ms);
                ctx.signal = Some(signal);
                ctx.error = error;
            }
        }
    }

    fn enter(&mut self, state: TaskState, now_ms: u64) {
        self.current = state;
        self.history.push(StateContext::new(state, now_ms));
    }

    /// Workflow summary for reporting.
    pub fn summary(&self, now_ms: u64) -> MachineSummary {
        let total_duration_ms = self
            .history
            .first()
            .map(|first| {
                let end = self
                    .history
                    .last()
                    .and_then(|c| c.exited_at_epoch_ms)
                    .unwrap_or(now_ms);
                end.saturating_sub(first.entered_at_epoch_ms)
            })
            .unwrap_or(0);

        MachineSummary {
            current_state: self.current,
            is_terminal: self.is_terminal(),
            is_successful: self.current.is_successful(),
            total_states: self.history.len(),
            total_duration_ms,
            retry_counts: self
                .retries
                .iter()
                .filter(|(_, b)| b.count > 0)
                .map(|(s, b)| (s.to_string(), b.count))
                .collect(),
        }
    }

    /// Text visualization of the state flow, appended to the task log on
    /// completion.
    pub fn visualize(&self) -> String {
        let mut lines = vec!["Workflow state trace".to_string(), "=".repeat(50)];

        for (i, ctx) in self.history.iter().enumerate() {
            let duration = ctx
                .duration_ms()
                .map(format_elapsed_ms)
                .unwrap_or_else(|| "ongoing".to_string());
            let icon = match ctx.signal {
                Some(Signal::Success | Signal::TestsPass | Signal::BugConfirmed
                | Signal::FixValidated) => '+',
                Some(_) => '-',
                None => '*',
            };
            lines.push(format!("{}. {} {} ({})", i + 1, icon, ctx.state, duration));
            if let Some(err) = &ctx.error {
                let mut err = err.as_str();
                if err.len() > 100 {
                    err = &err[..100];
                }
                lines.push(format!("   error: {err}"));
            }
        }

        lines.push("=".repeat(50));
        lines.push(format!("Final state: {}", self.current));
        lines.join("\n")
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
