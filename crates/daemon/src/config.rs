// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration, composed from the environment.

use crate::env;
use asa_engine::{EngineConfig, QueueLimits};
use asa_gateway::BudgetLimits;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that prevent the daemon from configuring itself.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot determine state directory (set ASA_STATE_DIR or HOME)")]
    NoStateDir,
    #[error("OPENAI_API_KEY environment variable required")]
    NoApiKey,
}

/// Resolved daemon configuration.
pub struct Config {
    pub state_dir: PathBuf,
    pub log_path: PathBuf,
    pub lock_path: PathBuf,
    pub workers: usize,
    pub queue_limits: QueueLimits,
    pub budget: BudgetLimits,
    pub engine: EngineConfig,
    pub api_key: String,
    pub api_base_url: String,
    pub prompts_dir: Option<PathBuf>,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let state_dir = env::state_dir().ok_or(ConfigError::NoStateDir)?;
        let api_key = env::openai_api_key().ok_or(ConfigError::NoApiKey)?;

        let mut queue_limits = QueueLimits::default();
        if let Some(v) = env::max_queue_size() {
            queue_limits.max_queue_size = v;
        }
        if let Some(v) = env::max_concurrent_jobs() {
            queue_limits.max_concurrent_jobs = v;
        }
        if let Some(v) = env::max_per_user_concurrent() {
            queue_limits.max_per_user_concurrent = v;
        }
        if let Some(v) = env::job_result_ttl() {
            queue_limits.result_ttl = v;
        }
        if let Some(v) = env::job_failure_ttl() {
            queue_limits.failure_ttl = v;
        }

        let mut budget = BudgetLimits::default();
        if let Some(v) = env::max_tokens_per_task() {
            budget.max_tokens_per_task = v;
        }
        if let Some(v) = env::max_cost_per_task_usd() {
            budget.max_cost_per_task_usd = v;
        }
        if let Some(v) = env::max_cost_per_user_per_day_usd() {
            budget.max_cost_per_principal_per_day_usd = v;
        }
        if let Some(v) = env::llm_call_timeout() {
            budget.llm_call_timeout = v;
        }

        let mut engine = EngineConfig {
            workspace_root: env::workspace_dir().unwrap_or_else(|| state_dir.join("workspaces")),
            behavioral_verification: env::behavioral_verification_enabled(),
            git_token: env::github_token(),
            publish_branch: env::github_token().is_some(),
            ..Default::default()
        };
        if let Some(v) = env::test_run_timeout() {
            engine.test_run_timeout = v;
        }
        if let Some(v) = env::git_clone_timeout() {
            engine.git_clone_timeout = v;
        }
        engine.task_timeout = env::task_timeout();

        Ok(Self {
            log_path: state_dir.join("asad.log"),
            lock_path: state_dir.join("asad.lock"),
            state_dir,
            workers: env::workers(),
            queue_limits,
            budget,
            engine,
            api_key,
            api_base_url: env::openai_base_url(),
            prompts_dir: env::prompts_dir(),
        })
    }
}
