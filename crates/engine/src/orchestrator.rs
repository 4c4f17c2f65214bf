// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! State machine orchestrator.
//!
//! Drives one task through the fix pipeline: each state executes an
//! effect, the effect's outcome is reduced to a transition signal, and the
//! machine's static table picks the next state. Effects never leak raw
//! errors across state boundaries. The cancel probe is consulted on every
//! state entry and before every long-running effect.

use crate::applicator::PatchApplicator;
use crate::config::EngineConfig;
use crate::workspace::allocate_workspace;
use asa_adapters::{CodeIndex, Forge, Git, GitError, LexicalIndex, LlmProvider, Sandbox};
use asa_core::{
    format_elapsed_ms, Clock, Event, PatchSet, Purpose, Signal, StateMachine, Task, TaskId,
    TaskState,
};
use asa_gateway::{BudgetLimits, Gateway, PromptStore};
use asa_storage::{Store, StoreError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Behavioral tests generated for verification land here, inside the
/// workspace so they are cleaned up with it.
const BEHAVIORAL_TEST_DIR: &str = ".asa_tests";

/// Errors that abort orchestration outside the state machine.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("task not found: {0}")]
    TaskNotFound(String),
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

/// Cooperative cancellation probe, closed over a handle's cancel flag.
#[derive(Clone)]
pub struct CancelProbe(Arc<AtomicBool>);

impl CancelProbe {
    pub fn new(flag: Arc<AtomicBool>) -> Self {
        Self(flag)
    }

    /// Probe that never fires (tasks run outside the queue).
    pub fn never() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything an orchestrator needs to execute effects.
pub struct OrchestratorDeps<P, S, G, F, I, C> {
    pub store: Store,
    pub provider: P,
    pub sandbox: S,
    pub git: G,
    pub forge: F,
    pub index: I,
    pub prompts: Arc<PromptStore>,
    pub budget: BudgetLimits,
    pub config: EngineConfig,
    pub clock: C,
}

impl<P: Clone, S: Clone, G: Clone, F: Clone, I: Clone, C: Clone> Clone
    for OrchestratorDeps<P, S, G, F, I, C>
{
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            provider: self.provider.clone(),
            sandbox: self.sandbox.clone(),
            git: self.git.clone(),
            forge: self.forge.clone(),
            index: self.index.clone(),
            prompts: Arc::clone(&self.prompts),
            budget: self.budget.clone(),
            config: self.config.clone(),
            clock: self.clock.clone(),
        }
    }
}

/// Which index answers context queries for this task.
enum ActiveIndex {
    None,
    Primary,
    Fallback(LexicalIndex),
}

/// Outcome of one state's effect.
enum EffectOutcome {
    Signal {
        signal: Signal,
        error: Option<String>,
    },
    Cancelled,
}

impl EffectOutcome {
    fn ok(signal: Signal) -> Self {
        Self::Signal {
            signal,
            error: None,
        }
    }

    fn fail(error: impl Into<String>) -> Self {
        Self::Signal {
            signal: Signal::Failure,
            error: Some(error.into()),
        }
    }

    fn signal_err(signal: Signal, error: impl Into<String>) -> Self {
        Self::Signal {
            signal,
            error: Some(error.into()),
        }
    }
}

/// Drives one task to a terminal state.
pub struct Orchestrator<P, S, G, F, I, C>
where
    P: LlmProvider,
    S: Sandbox,
    G: Git,
    F: Forge,
    I: CodeIndex,
    C: Clock,
{
    deps: OrchestratorDeps<P, S, G, F, I, C>,
    task_id: TaskId,
    probe: CancelProbe,
    index: ActiveIndex,
}

impl<P, S, G, F, I, C> Orchestrator<P, S, G, F, I, C>
where
    P: LlmProvider,
    S: Sandbox,
    G: Git,
    F: Forge,
    I: CodeIndex,
    C: Clock,
{
    pub fn new(deps: OrchestratorDeps<P, S, G, F, I, C>, task_id: TaskId, probe: CancelProbe) -> Self {
        Self {
            deps,
            task_id,
            probe,
            index: ActiveIndex::None,
        }
    }

    /// Execute the pipeline to a terminal state. Returns the final state.
    pub async fn run(mut self) -> Result<TaskState, OrchestratorError> {
        let task = self
            .deps
            .store
            .task(self.task_id.as_str())
            .ok_or_else(|| OrchestratorError::TaskNotFound(self.task_id.to_string()))?;
        if task.is_terminal() {
            return Ok(task.status);
        }

        let gateway = Gateway::new(
            self.deps.provider.clone(),
            self.deps.store.clone(),
            Arc::clone(&self.deps.prompts),
            self.deps.budget.clone(),
            self.task_id.clone(),
            task.principal.clone(),
            self.deps.clock.clone(),
        );

        let mut machine = StateMachine::new(self.deps.config.behavioral_verification, self.now());
        let deadline_ms = self
            .deps
            .config
            .task_timeout
            .map(|t| self.now() + t.as_millis() as u64);

        self.log("starting autonomous workflow")?;
        if let Ok(state) = machine.transition(Signal::Success, None, self.now()) {
            self.commit_status(state)?;
        }

        while !machine.is_terminal() {
            if self.probe.cancelled() {
                machine.cancel(self.now());
                self.log("cancellation observed, stopping")?;
                self.commit_status(TaskState::Cancelled)?;
                break;
            }
            if let Some(deadline) = deadline_ms {
                if self.now() >= deadline {
                    machine.timeout(self.now());
                    self.log("task wall-clock budget exceeded")?;
                    self.commit_status(TaskState::Timeout)?;
                    break;
                }
            }

            let current = machine.current();
            let task = self
                .deps
                .store
                .task(self.task_id.as_str())
                .ok_or_else(|| OrchestratorError::TaskNotFound(self.task_id.to_string()))?;

            tracing::info!(state = %current, task = %self.task_id, "executing state effect");
            let outcome = self.execute_state(current, &task, &gateway).await;

            match outcome {
                EffectOutcome::Cancelled => {
                    machine.cancel(self.now());
                    self.log("cancellation observed, stopping")?;
                    self.commit_status(TaskState::Cancelled)?;
                    break;
                }
                EffectOutcome::Signal { signal, error } => {
                    if let Some(error) = &error {
                        self.log(&format!("error in {current}: {error}"))?;
                    }
                    match machine.transition(signal, error, self.now()) {
                        Ok(next) => {
                            self.commit_status(next)?;
                            self.log(&format!("transitioned: {current} -> {next} ({signal})"))?;
                        }
                        Err(invalid) => {
                            tracing::error!(error = %invalid, "invalid transition");
                            machine.fail(invalid.to_string(), self.now());
                            self.commit_status(TaskState::Failed)?;
                        }
                    }
                }
            }
        }

        let final_state = machine.current();
        let summary = machine.summary(self.now());
        self.log(&format!(
            "workflow complete: {final_state} ({} states visited, {})",
            summary.total_states,
            format_elapsed_ms(summary.total_duration_ms)
        ))?;
        self.log(&machine.visualize())?;

        Ok(final_state)
    }

    async fn execute_state(
        &mut self,
        state: TaskState,
        task: &Task,
        gateway: &Gateway<P, C>,
    ) -> EffectOutcome {
        match state {
            TaskState::Init => self.effect_init(task).await,
            TaskState::CloningRepo => self.effect_clone(task).await,
            TaskState::IndexingCode => self.effect_index(task).await,
            TaskState::VerifyingBugBehavior => self.effect_verify_bug(task, gateway).await,
            TaskState::RunningTestsBeforeFix => self.effect_run_tests(task, true).await,
            TaskState::GeneratingFix => self.effect_generate_fix(task, gateway).await,
            TaskState::RunningTestsAfterFix => self.effect_run_tests(task, false).await,
            TaskState::VerifyingFixBehavior => self.effect_verify_fix(task).await,
            TaskState::CreatingPrBranch => self.effect_create_branch(task).await,
            other => EffectOutcome::fail(format!("no effect defined for state {other}")),
        }
    }

    // ── Effects ──────────────────────────────────────────────────────────────

    async fn effect_init(&mut self, task: &Task) -> EffectOutcome {
        self.try_log(&format!("initializing task for {}", task.repo_url));
        EffectOutcome::ok(Signal::Success)
    }

    async fn effect_clone(&mut self, task: &Task) -> EffectOutcome {
        let workspace = match allocate_workspace(&self.deps.config.workspace_root, &self.task_id) {
            Ok(path) => path,
            Err(e) => return EffectOutcome::fail(format!("workspace allocation failed: {e}")),
        };

        if self.probe.cancelled() {
            return EffectOutcome::Cancelled;
        }

        let result = self
            .deps
            .git
            .clone_repo(
                &task.repo_url,
                &workspace,
                Some(self.deps.config.clone_depth),
                self.deps.config.git_token.as_deref(),
                self.deps.config.git_clone_timeout,
            )
            .await;

        match result {
            Ok(()) => {
                if let Err(e) = self.deps.store.commit(Event::TaskWorkspace {
                    id: self.task_id.clone(),
                    path: workspace.clone(),
                    epoch_ms: self.now(),
                }) {
                    return EffectOutcome::fail(format!("failed to persist workspace: {e}"));
                }
                self.try_log(&format!(
                    "cloned {} to {}",
                    task.repo_url,
                    workspace.display()
                ));
                EffectOutcome::ok(Signal::Success)
            }
            Err(GitError::Authentication(msg)) => EffectOutcome::fail(format!(
                "git_authentication_failed: {msg}"
            )),
            Err(e) => EffectOutcome::fail(format!("clone failed: {e}")),
        }
    }

    async fn effect_index(&mut self, task: &Task) -> EffectOutcome {
        let Some(workspace) = task.workspace_path.clone() else {
            return EffectOutcome::fail("no workspace to index");
        };

        match self.deps.index.build(&workspace).await {
            Ok(stats) => {
                self.try_log(&format!(
                    "code index built: {} files, {} lines",
                    stats.files, stats.lines
                ));
                self.index = ActiveIndex::Primary;
                EffectOutcome::ok(Signal::Success)
            }
            Err(primary_err) => {
                self.try_log(&format!(
                    "semantic indexing unavailable ({primary_err}), falling back to lexical index"
                ));
                let fallback = LexicalIndex::new();
                match fallback.build(&workspace).await {
                    Ok(stats) => {
                        self.try_log(&format!("lexical index built: {} files", stats.files));
                        self.index = ActiveIndex::Fallback(fallback);
                        EffectOutcome::ok(Signal::Success)
                    }
                    Err(fallback_err) => EffectOutcome::fail(format!(
                        "indexing failed: {primary_err}; lexical fallback failed: {fallback_err}"
                    )),
                }
            }
        }
    }

    async fn effect_verify_bug(&mut self, task: &Task, gateway: &Gateway<P, C>) -> EffectOutcome {
        let Some(workspace) = task.workspace_path.clone() else {
            return EffectOutcome::fail("no workspace for behavioral verification");
        };
        if self.probe.cancelled() {
            return EffectOutcome::Cancelled;
        }

        let context = self.code_context(&task.bug_description).await;
        let mut vars = HashMap::new();
        vars.insert("bug_description".to_string(), task.bug_description.clone());
        vars.insert("code_context".to_string(), context);

        let value = match gateway
            .chat_with_prompt(Purpose::BehavioralTestGeneration, "v1", &vars)
            .await
        {
            Ok(value) => value,
            Err(e) => {
                self.try_log(&format!(
                    "behavioral test generation failed (non-fatal): {e}"
                ));
                return EffectOutcome::ok(Signal::BugNotFound);
            }
        };

        let Some(test_code) = value.get("test_code").and_then(|v| v.as_str()) else {
            self.try_log("behavioral test response missing test_code (non-fatal)");
            return EffectOutcome::ok(Signal::BugNotFound);
        };
        let file_name = value
            .get("test_name")
            .and_then(|v| v.as_str())
            .map(sanitize_test_name)
            .unwrap_or_else(|| "behavioral_test.py".to_string());

        let test_dir = workspace.join(BEHAVIORAL_TEST_DIR);
        let test_path = test_dir.join(&file_name);
        if let Err(e) =
            std::fs::create_dir_all(&test_dir).and_then(|()| std::fs::write(&test_path, test_code))
        {
            self.try_log(&format!("could not write behavioral test (non-fatal): {e}"));
            return EffectOutcome::ok(Signal::BugNotFound);
        }
        if let Err(e) = self.deps.store.commit(Event::TaskBehavioralTest {
            id: self.task_id.clone(),
            path: test_path.clone(),
            epoch_ms: self.now(),
        }) {
            return EffectOutcome::fail(format!("failed to persist behavioral test: {e}"));
        }

        if self.probe.cancelled() {
            return EffectOutcome::Cancelled;
        }

        match self.run_behavioral_test(&workspace, &test_path).await {
            Some(true) => {
                self.try_log("behavioral test fails: bug confirmed");
                EffectOutcome::ok(Signal::BugConfirmed)
            }
            Some(false) => {
                self.try_log("behavioral test passes: bug not reproduced");
                EffectOutcome::ok(Signal::BugNotFound)
            }
            None => EffectOutcome::ok(Signal::BugNotFound),
        }
    }

    /// Run the user's test command. `before_fix` selects the signal
    /// mapping: a pre-fix pass means no bug was observed, a post-fix
    /// failure feeds the retry path.
    async fn effect_run_tests(&mut self, task: &Task, before_fix: bool) -> EffectOutcome {
        let Some(workspace) = task.workspace_path.clone() else {
            return EffectOutcome::fail("no workspace to test in");
        };
        if self.probe.cancelled() {
            return EffectOutcome::Cancelled;
        }

        let command = task
            .test_command
            .clone()
            .unwrap_or_else(|| self.deps.config.default_test_command.clone());

        let result = self
            .deps
            .sandbox
            .run_command(
                &workspace,
                &command,
                self.deps.config.test_run_timeout,
                &self.deps.config.sandbox_limits,
            )
            .await;

        let output = match result {
            Ok(output) => output,
            Err(e) if before_fix => {
                return EffectOutcome::fail(format!("test execution failed: {e}"));
            }
            Err(e) => {
                // Post-fix: a sandbox hiccup consumes a retry rather than
                // aborting a task whose fix may be sound.
                return EffectOutcome::signal_err(
                    Signal::TestsFail,
                    format!("test execution failed: {e}"),
                );
            }
        };

        let tail = tail_chars(&output.combined(), self.deps.config.test_output_tail_chars);
        if let Err(e) = self.deps.store.commit(Event::TaskTestOutput {
            id: self.task_id.clone(),
            output: tail,
            epoch_ms: self.now(),
        }) {
            return EffectOutcome::fail(format!("failed to persist test output: {e}"));
        }

        if output.success() {
            self.try_log(if before_fix {
                "tests pass - no bug observed"
            } else {
                "tests pass after fix"
            });
            EffectOutcome::ok(Signal::TestsPass)
        } else {
            self.try_log(if before_fix {
                "tests fail - bug confirmed"
            } else {
                "tests still failing after fix"
            });
            EffectOutcome::ok(Signal::TestsFail)
        }
    }

    async fn effect_generate_fix(&mut self, task: &Task, gateway: &Gateway<P, C>) -> EffectOutcome {
        let Some(workspace) = task.workspace_path.clone() else {
            return EffectOutcome::fail("no workspace to patch");
        };
        if self.probe.cancelled() {
            return EffectOutcome::Cancelled;
        }

        let context = self.code_context(&task.bug_description).await;
        let mut vars = HashMap::new();
        vars.insert("bug_description".to_string(), task.bug_description.clone());
        vars.insert(
            "test_failure_log".to_string(),
            task.test_output.clone().unwrap_or_default(),
        );
        vars.insert("code_context".to_string(), context);

        let value = match gateway
            .chat_with_prompt(Purpose::FixGeneration, "v1", &vars)
            .await
        {
            Ok(value) => value,
            Err(e) => return EffectOutcome::fail(format!("fix generation failed: {e}")),
        };

        let patch_set: PatchSet = match serde_json::from_value(value) {
            Ok(set) => set,
            Err(e) => return EffectOutcome::fail(format!("patch set does not parse: {e}")),
        };

        self.try_log(&format!(
            "generated {} patches (confidence: {:.2})",
            patch_set.patches.len(),
            patch_set.confidence
        ));

        let mut applicator = PatchApplicator::new(&workspace, self.deps.clock.clone());
        let report = applicator.apply_set(&patch_set, true);

        if report.success {
            self.try_log(&format!("applied {} patches", report.applied));
            EffectOutcome::ok(Signal::Success)
        } else {
            applicator.rollback();
            EffectOutcome::fail(format!(
                "patch application failed: {}",
                report.errors.join("; ")
            ))
        }
    }

    async fn effect_verify_fix(&mut self, task: &Task) -> EffectOutcome {
        let (Some(workspace), Some(test_path)) = (
            task.workspace_path.clone(),
            task.behavioral_test_path.clone(),
        ) else {
            self.try_log("no behavioral test to verify fix against");
            return EffectOutcome::ok(Signal::FixInvalid);
        };

        if self.probe.cancelled() {
            return EffectOutcome::Cancelled;
        }

        match self.run_behavioral_test(&workspace, &test_path).await {
            Some(false) => {
                self.try_log("behavioral test passes: fix validated");
                EffectOutcome::ok(Signal::FixValidated)
            }
            Some(true) => {
                self.try_log("behavioral test still fails after fix");
                EffectOutcome::ok(Signal::FixInvalid)
            }
            None => EffectOutcome::ok(Signal::FixInvalid),
        }
    }

    async fn effect_create_branch(&mut self, task: &Task) -> EffectOutcome {
        let Some(workspace) = task.workspace_path.clone() else {
            return EffectOutcome::fail("no workspace to branch in");
        };
        if self.probe.cancelled() {
            return EffectOutcome::Cancelled;
        }

        let branch = format!("{}fix-{}", self.deps.config.branch_prefix, self.task_id);
        let message = format!("asa: automated fix for task {}", self.task_id);

        if let Err(e) = self.deps.git.create_branch(&workspace, &branch).await {
            return EffectOutcome::fail(format!("branch creation failed: {e}"));
        }
        if let Err(e) = self.deps.git.commit_all(&workspace, &message).await {
            return EffectOutcome::fail(format!("commit failed: {e}"));
        }
        if let Err(e) = self.deps.store.commit(Event::TaskBranch {
            id: self.task_id.clone(),
            branch: branch.clone(),
            epoch_ms: self.now(),
        }) {
            return EffectOutcome::fail(format!("failed to persist branch: {e}"));
        }
        self.try_log(&format!("created branch {branch}"));

        // Publication is best-effort: a push or PR failure never demotes a
        // successful fix.
        if self.deps.config.publish_branch {
            if let Err(e) = self.deps.git.push(&workspace, &branch).await {
                self.try_log(&format!("branch push failed (non-fatal): {e}"));
                return EffectOutcome::ok(Signal::Success);
            }

            let title = format!("Fix: {}", first_line(&task.bug_description));
            let body = format!(
                "Automated fix for task {}.\n\nBug report:\n{}",
                self.task_id, task.bug_description
            );
            match self
                .deps
                .forge
                .create_pull_request(&branch, "main", &title, &body)
                .await
            {
                Ok(url) => {
                    if let Err(e) = self.deps.store.commit(Event::TaskPr {
                        id: self.task_id.clone(),
                        url: url.clone(),
                        epoch_ms: self.now(),
                    }) {
                        return EffectOutcome::fail(format!("failed to persist PR url: {e}"));
                    }
                    self.try_log(&format!("opened pull request {url}"));
                }
                Err(GitError::ForgeNotConfigured) => {
                    self.try_log("no forge configured, skipping pull request");
                }
                Err(e) => {
                    self.try_log(&format!("pull request failed (non-fatal): {e}"));
                }
            }
        }

        EffectOutcome::ok(Signal::Success)
    }

    // ── Helpers ──────────────────────────────────────────────────────────────

    /// Run the stored behavioral test. Some(true) means the test failed
    /// (bug present), Some(false) means it passed; None means it could not
    /// be executed (treated as non-fatal by callers).
    async fn run_behavioral_test(&mut self, workspace: &Path, test_path: &PathBuf) -> Option<bool> {
        let command = format!("python {}", test_path.display());
        match self
            .deps
            .sandbox
            .run_command(
                workspace,
                &command,
                self.deps.config.test_run_timeout,
                &self.deps.config.sandbox_limits,
            )
            .await
        {
            Ok(output) => Some(!output.success()),
            Err(e) => {
                self.try_log(&format!("behavioral test run failed (non-fatal): {e}"));
                None
            }
        }
    }

    async fn code_context(&self, query: &str) -> String {
        let result = match &self.index {
            ActiveIndex::Primary => {
                self.deps
                    .index
                    .context(query, self.deps.config.max_context_results)
                    .await
            }
            ActiveIndex::Fallback(lexical) => {
                lexical
                    .context(query, self.deps.config.max_context_results)
                    .await
            }
            ActiveIndex::None => {
                return "No code context available (index not built)".to_string()
            }
        };
        result.unwrap_or_else(|e| format!("No code context available ({e})"))
    }

    fn now(&self) -> u64 {
        self.deps.clock.epoch_ms()
    }

    fn commit_status(&self, status: TaskState) -> Result<(), StoreError> {
        self.deps.store.commit(Event::TaskStatus {
            id: self.task_id.clone(),
            status,
            epoch_ms: self.now(),
        })
    }

    fn log(&self, message: &str) -> Result<(), StoreError> {
        tracing::info!(task = %self.task_id, "{message}");
        self.deps.store.commit(Event::TaskLog {
            id: self.task_id.clone(),
            line: message.to_string(),
            epoch_ms: self.now(),
        })
    }

    /// Log variant for effect internals, where a storage failure should
    /// not mask the effect's own outcome.
    fn try_log(&self, message: &str) {
        if let Err(e) = self.log(message) {
            tracing::warn!(error = %e, "failed to persist log line");
        }
    }
}

/// Last `n` characters of `s`, on a char boundary.
fn tail_chars(s: &str, n: usize) -> String {
    if s.len() <= n {
        return s.to_string();
    }
    let mut idx = s.len() - n;
    while !s.is_char_boundary(idx) {
        idx += 1;
    }
    s[idx..].to_string()
}

fn first_line(s: &str) -> &str {
    s.lines().next().unwrap_or(s)
}

fn sanitize_test_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.ends_with(".py") {
        cleaned
    } else {
        format!("{cleaned}.py")
    }
}

#[cfg(test)]
#[path = "orchestrator_tests/mod.rs"]
mod tests;
