// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;
use std::time::Duration;

fn parse_var<T: std::str::FromStr>(var: &str) -> Option<T> {
    std::env::var(var).ok().and_then(|s| s.parse::<T>().ok())
}

fn parse_secs(var: &str) -> Option<Duration> {
    parse_var::<u64>(var).map(Duration::from_secs)
}

/// Resolve state directory: ASA_STATE_DIR > XDG_STATE_HOME/asa > ~/.local/state/asa
pub fn state_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("ASA_STATE_DIR") {
        return Some(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Some(PathBuf::from(xdg).join("asa"));
    }
    std::env::var("HOME")
        .ok()
        .map(|home| PathBuf::from(home).join(".local/state/asa"))
}

/// Workspace root: ASA_WORKSPACE_DIR, else `<state>/workspaces`.
pub fn workspace_dir() -> Option<PathBuf> {
    std::env::var("ASA_WORKSPACE_DIR").ok().map(PathBuf::from)
}

/// Number of workers (default 2).
pub fn workers() -> usize {
    parse_var("ASA_WORKERS").unwrap_or(2)
}

// ── Queue limits ─────────────────────────────────────────────────────────────

pub fn max_queue_size() -> Option<usize> {
    parse_var("MAX_QUEUE_SIZE")
}

pub fn max_concurrent_jobs() -> Option<usize> {
    parse_var("MAX_CONCURRENT_JOBS")
}

pub fn max_per_user_concurrent() -> Option<usize> {
    parse_var("MAX_PER_USER_CONCURRENT")
}

pub fn job_result_ttl() -> Option<Duration> {
    parse_secs("JOB_RESULT_TTL")
}

pub fn job_failure_ttl() -> Option<Duration> {
    parse_secs("JOB_FAILURE_TTL")
}

// ── Budgets ──────────────────────────────────────────────────────────────────

pub fn max_tokens_per_task() -> Option<u64> {
    parse_var("MAX_TOKENS_PER_TASK")
}

pub fn max_cost_per_task_usd() -> Option<f64> {
    parse_var("MAX_COST_PER_TASK_USD")
}

pub fn max_cost_per_user_per_day_usd() -> Option<f64> {
    parse_var("MAX_COST_PER_USER_PER_DAY_USD")
}

// ── Timeouts ─────────────────────────────────────────────────────────────────

pub fn llm_call_timeout() -> Option<Duration> {
    parse_secs("LLM_CALL_TIMEOUT_SECONDS")
}

pub fn test_run_timeout() -> Option<Duration> {
    parse_secs("TEST_RUN_TIMEOUT_SECONDS")
}

pub fn git_clone_timeout() -> Option<Duration> {
    parse_secs("GIT_CLONE_TIMEOUT_SECONDS")
}

pub fn task_timeout() -> Option<Duration> {
    parse_secs("TASK_TIMEOUT_SECONDS")
}

// ── Features and credentials ─────────────────────────────────────────────────

pub fn behavioral_verification_enabled() -> bool {
    std::env::var("ENABLE_BEHAVIORAL_VERIFICATION")
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
        .unwrap_or(false)
}

pub fn openai_api_key() -> Option<String> {
    std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty())
}

pub fn openai_base_url() -> String {
    std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com".to_string())
}

pub fn github_token() -> Option<String> {
    std::env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty())
}

pub fn prompts_dir() -> Option<PathBuf> {
    std::env::var("ASA_PROMPTS_DIR").ok().map(PathBuf::from)
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
