// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine configuration.

use asa_adapters::SandboxLimits;
use std::path::PathBuf;
use std::time::Duration;

/// Tunables for the orchestrator and its effects. Production values come
/// from the environment (see the daemon's config).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory under which per-task workspaces are allocated.
    pub workspace_root: PathBuf,
    /// Branch prefix for fix branches, e.g. `asa/` -> `asa/fix-<task_id>`.
    pub branch_prefix: String,
    /// Whether the behavioral verification states are enabled.
    pub behavioral_verification: bool,
    /// Shallow-clone depth.
    pub clone_depth: u32,
    /// Token injected into HTTPS clone/push URLs.
    pub git_token: Option<String>,
    /// Test command used when the submission omits one.
    pub default_test_command: String,
    /// Captured test output is truncated to this many trailing characters.
    pub test_output_tail_chars: usize,
    /// Snippets requested from the code index per query.
    pub max_context_results: usize,
    pub git_clone_timeout: Duration,
    pub test_run_timeout: Duration,
    /// Optional wall-clock budget for a whole task.
    pub task_timeout: Option<Duration>,
    pub sandbox_limits: SandboxLimits,
    /// Whether to push the fix branch and open a pull request.
    pub publish_branch: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workspace_root: PathBuf::from("/tmp/asa/workspaces"),
            branch_prefix: "asa/".to_string(),
            behavioral_verification: false,
            clone_depth: 1,
            git_token: None,
            default_test_command: "pytest".to_string(),
            test_output_tail_chars: 5_000,
            max_context_results: 10,
            git_clone_timeout: Duration::from_secs(300),
            test_run_timeout: Duration::from_secs(600),
            task_timeout: None,
            sandbox_limits: SandboxLimits::default(),
            publish_branch: false,
        }
    }
}
