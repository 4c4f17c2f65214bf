// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task model and submission validation.

use crate::error::{AsaError, ErrorKind};
use crate::handle::{JobHandleId, Priority};
use crate::state::TaskState;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

crate::define_id! {
    /// Unique identifier for a submitted task.
    pub struct TaskId;
}

/// A validated submission, ready for admission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub repo_url: String,
    pub bug_description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal: Option<String>,
    #[serde(default)]
    pub priority: Priority,
}

impl Submission {
    /// Validate and normalize raw inputs: both text fields are trimmed and
    /// must be non-empty, and the repository URL must carry a clonable
    /// scheme.
    pub fn validate(
        repo_url: &str,
        bug_description: &str,
        test_command: Option<&str>,
        principal: Option<&str>,
        priority: Priority,
    ) -> Result<Self, AsaError> {
        let repo_url = repo_url.trim();
        let bug_description = bug_description.trim();

        if repo_url.is_empty() {
            return Err(AsaError::new(ErrorKind::InvalidInput, "repo_url is required"));
        }
        if bug_description.is_empty() {
            return Err(AsaError::new(
                ErrorKind::InvalidInput,
                "bug_description is required",
            ));
        }
        if !(repo_url.starts_with("https://")
            || repo_url.starts_with("http://")
            || repo_url.starts_with("git@")
            || repo_url.starts_with("file://"))
        {
            return Err(AsaError::new(
                ErrorKind::InvalidRepoUrl,
                format!("not a clonable repository URL: {repo_url}"),
            )
            .with_detail("repo_url", repo_url));
        }

        Ok(Self {
            repo_url: repo_url.to_string(),
            bug_description: bug_description.to_string(),
            test_command: test_command
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string),
            principal: principal
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string),
            priority,
        })
    }
}

/// A user-submitted bug-fix request, persisted with lifecycle status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub repo_url: String,
    pub bug_description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal: Option<String>,
    pub status: TaskState,
    /// Set once the clone succeeds; immutable for the task's lifetime.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_url: Option<String>,
    /// Append-only log text.
    #[serde(default)]
    pub logs: String,
    /// Tail of the last test run's captured output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub behavioral_test_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle_id: Option<JobHandleId>,
    pub created_at_epoch_ms: u64,
    pub updated_at_epoch_ms: u64,
}

impl Task {
    pub fn new(id: TaskId, submission: Submission, now_ms: u64) -> Self {
        Self {
            id,
            repo_url: submission.repo_url,
            bug_description: submission.bug_description,
            test_command: submission.test_command,
            principal: submission.principal,
            status: TaskState::Queued,
            workspace_path: None,
            branch_name: None,
            pr_url: None,
            logs: String::new(),
            test_output: None,
            behavioral_test_path: None,
            handle_id: None,
            created_at_epoch_ms: now_ms,
            updated_at_epoch_ms: now_ms,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Bump `updated_at` so it strictly increases even under a frozen clock.
    pub fn touch(&mut self, now_ms: u64) {
        self.updated_at_epoch_ms = now_ms.max(self.updated_at_epoch_ms + 1);
    }

    /// Append a timestamped line to the task log.
    pub fn append_log(&mut self, line: &str, now_ms: u64) {
        if !self.logs.is_empty() {
            self.logs.push('\n');
        }
        self.logs.push_str(&format!("[{now_ms}] {line}"));
        self.touch(now_ms);
    }

    /// Set the workspace path. The first write wins; later writes are
    /// ignored (the path is immutable once set).
    pub fn set_workspace_path(&mut self, path: PathBuf, now_ms: u64) {
        if self.workspace_path.is_none() {
            self.workspace_path = Some(path);
            self.touch(now_ms);
        }
    }

    /// Last `tail` lines of the log, or the whole log when `tail` is None.
    pub fn log_tail(&self, tail: Option<usize>) -> String {
        match tail {
            None => self.logs.clone(),
            Some(n) => {
                let lines: Vec<&str> = self.logs.lines().collect();
                let start = lines.len().saturating_sub(n);
                lines[start..].join("\n")
            }
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Task {
    /// Minimal task for tests.
    pub fn test_task(id: impl Into<String>) -> Self {
        Self::new(
            TaskId::new(id),
            Submission {
                repo_url: "https://example.com/repo.git".to_string(),
                bug_description: "off-by-one in sum()".to_string(),
                test_command: Some("pytest".to_string()),
                principal: None,
                priority: Priority::Normal,
            },
            1_000_000,
        )
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
