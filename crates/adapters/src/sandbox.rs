// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sandbox command runner.
//!
//! Contract: read-only root filesystem except for workspace and scratch,
//! process and capability drop by default, network disabled unless
//! explicitly requested. `LocalSandbox` is the process-level runner used
//! outside containerized deployments; the container runner implements the
//! same trait behind this boundary.

use crate::subprocess::run_with_timeout;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors from sandbox execution. A non-zero exit is NOT an error; it is
/// reported through [`CommandOutput::exit_code`].
#[derive(Debug, Clone, Error)]
pub enum SandboxError {
    #[error("command timed out after {0:?}")]
    Timeout(Duration),
    #[error("sandbox failure: {0}")]
    Failed(String),
}

/// Network access mode for a sandboxed command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkMode {
    #[default]
    None,
    Bridge,
}

/// Resource limits for a sandboxed command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxLimits {
    pub network: NetworkMode,
    /// e.g. "512m"
    pub mem_limit: String,
    /// Fraction of one CPU, e.g. 50 for half
    pub cpu_quota_pct: u32,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            network: NetworkMode::None,
            mem_limit: "512m".to_string(),
            cpu_quota_pct: 50,
        }
    }
}

/// Captured output of a sandboxed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Combined output, stdout then stderr.
    pub fn combined(&self) -> String {
        let mut out = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&self.stderr);
        }
        out
    }
}

/// Adapter for running untrusted commands in an isolated environment.
#[async_trait]
pub trait Sandbox: Clone + Send + Sync + 'static {
    async fn run_command(
        &self,
        workspace: &Path,
        command: &str,
        timeout: Duration,
        limits: &SandboxLimits,
    ) -> Result<CommandOutput, SandboxError>;
}

/// Process-level sandbox: runs the command under `bash -c` in the
/// workspace with a hard wall-clock timeout.
#[derive(Clone, Default)]
pub struct LocalSandbox;

#[async_trait]
impl Sandbox for LocalSandbox {
    async fn run_command(
        &self,
        workspace: &Path,
        command: &str,
        timeout: Duration,
        _limits: &SandboxLimits,
    ) -> Result<CommandOutput, SandboxError> {
        tracing::info!(
            cwd = %workspace.display(),
            %command,
            timeout_s = timeout.as_secs(),
            "running sandboxed command"
        );

        let wrapped = format!("set -euo pipefail\n{command}");
        let mut cmd = tokio::process::Command::new("bash");
        cmd.arg("-c").arg(&wrapped).current_dir(workspace);

        let output = run_with_timeout(cmd, timeout, "sandbox command")
            .await
            .map_err(|msg| {
                if msg.contains("timed out") {
                    SandboxError::Timeout(timeout)
                } else {
                    SandboxError::Failed(msg)
                }
            })?;

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

// ── Fake sandbox (test support) ──────────────────────────────────────────────

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeSandbox, SandboxCall};

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::path::PathBuf;
    use std::sync::Arc;

    /// Recorded call made against the fake sandbox.
    #[derive(Debug, Clone)]
    pub struct SandboxCall {
        pub workspace: PathBuf,
        pub command: String,
    }

    struct ScriptedRun {
        delay: Option<Duration>,
        result: Result<CommandOutput, SandboxError>,
    }

    /// Scripted sandbox: pops one result per call, records every call.
    /// An empty script yields exit code 0 with no output.
    #[derive(Clone, Default)]
    pub struct FakeSandbox {
        script: Arc<Mutex<VecDeque<ScriptedRun>>>,
        calls: Arc<Mutex<Vec<SandboxCall>>>,
    }

    impl FakeSandbox {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue a completed run with the given exit code and stdout.
        pub fn push_exit(&self, exit_code: i32, stdout: impl Into<String>) {
            self.script.lock().push_back(ScriptedRun {
                delay: None,
                result: Ok(CommandOutput {
                    exit_code,
                    stdout: stdout.into(),
                    stderr: String::new(),
                }),
            });
        }

        /// Queue a run that sleeps before completing, for cancellation
        /// timing tests.
        pub fn push_delayed(&self, delay: Duration, exit_code: i32) {
            self.script.lock().push_back(ScriptedRun {
                delay: Some(delay),
                result: Ok(CommandOutput {
                    exit_code,
                    stdout: String::new(),
                    stderr: String::new(),
                }),
            });
        }

        /// Queue an execution error.
        pub fn push_error(&self, error: SandboxError) {
            self.script.lock().push_back(ScriptedRun {
                delay: None,
                result: Err(error),
            });
        }

        pub fn calls(&self) -> Vec<SandboxCall> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl Sandbox for FakeSandbox {
        async fn run_command(
            &self,
            workspace: &Path,
            command: &str,
            _timeout: Duration,
            _limits: &SandboxLimits,
        ) -> Result<CommandOutput, SandboxError> {
            self.calls.lock().push(SandboxCall {
                workspace: workspace.to_path_buf(),
                command: command.to_string(),
            });

            let run = self.script.lock().pop_front();
            match run {
                Some(run) => {
                    if let Some(delay) = run.delay {
                        tokio::time::sleep(delay).await;
                    }
                    run.result
                }
                None => Ok(CommandOutput {
                    exit_code: 0,
                    stdout: String::new(),
                    stderr: String::new(),
                }),
            }
        }
    }
}

#[cfg(test)]
#[path = "sandbox_tests.rs"]
mod tests;
