// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Version-control and forge adapters.
//!
//! `CommandGit` shells out to the git CLI with timeouts. Authentication is
//! injected by URL-embedding a token when the remote is HTTPS. The forge
//! (pull-request) side is a separate trait; `NoopForge` stands in when no
//! forge is configured and PR publication is skipped.

use crate::subprocess::run_with_timeout;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors from git and forge operations.
#[derive(Debug, Clone, Error)]
pub enum GitError {
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("clone failed: {0}")]
    CloneFailed(String),
    #[error("git command failed: {0}")]
    CommandFailed(String),
    #[error("forge rate limit: {0}")]
    ForgeRateLimit(String),
    #[error("forge not configured")]
    ForgeNotConfigured,
}

/// Adapter for repository operations.
#[async_trait]
pub trait Git: Clone + Send + Sync + 'static {
    /// Shallow-clone `url` into `dest`. A token, when present, is embedded
    /// into HTTPS URLs for authentication.
    async fn clone_repo(
        &self,
        url: &str,
        dest: &Path,
        depth: Option<u32>,
        token: Option<&str>,
        timeout: Duration,
    ) -> Result<(), GitError>;

    async fn create_branch(&self, repo: &Path, branch: &str) -> Result<(), GitError>;

    async fn commit_all(&self, repo: &Path, message: &str) -> Result<(), GitError>;

    async fn push(&self, repo: &Path, branch: &str) -> Result<(), GitError>;
}

/// Adapter for pull-request publication.
#[async_trait]
pub trait Forge: Clone + Send + Sync + 'static {
    async fn create_pull_request(
        &self,
        head: &str,
        base: &str,
        title: &str,
        body: &str,
    ) -> Result<String, GitError>;
}

/// Embed a token into an HTTPS remote URL. Non-HTTPS URLs pass through.
pub fn authenticated_url(url: &str, token: Option<&str>) -> String {
    match token {
        Some(token) if url.starts_with("https://") => {
            format!("https://x-access-token:{token}@{}", &url["https://".len()..])
        }
        _ => url.to_string(),
    }
}

/// Git CLI adapter.
#[derive(Clone, Default)]
pub struct CommandGit;

impl CommandGit {
    async fn run_git(
        repo: Option<&Path>,
        args: &[&str],
        timeout: Duration,
        description: &str,
    ) -> Result<String, GitError> {
        let mut cmd = tokio::process::Command::new("git");
        cmd.args(args);
        if let Some(repo) = repo {
            cmd.current_dir(repo);
        }
        // Never let git prompt for credentials
        cmd.env("GIT_TERMINAL_PROMPT", "0");

        let output = run_with_timeout(cmd, timeout, description)
            .await
            .map_err(GitError::CommandFailed)?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            let lowered = stderr.to_lowercase();
            if lowered.contains("authentication")
                || lowered.contains("permission denied")
                || lowered.contains("could not read username")
                || lowered.contains("403")
            {
                Err(GitError::Authentication(stderr))
            } else {
                Err(GitError::CommandFailed(format!("{description}: {stderr}")))
            }
        }
    }
}

#[async_trait]
impl Git for CommandGit {
    async fn clone_repo(
        &self,
        url: &str,
        dest: &Path,
        depth: Option<u32>,
        token: Option<&str>,
        timeout: Duration,
    ) -> Result<(), GitError> {
        let url = authenticated_url(url, token);
        let dest_str = dest.display().to_string();
        let depth_str;

        let mut args = vec!["clone"];
        if let Some(depth) = depth {
            depth_str = depth.to_string();
            args.push("--depth");
            args.push(&depth_str);
        }
        args.push(&url);
        args.push(&dest_str);

        tracing::info!(dest = %dest.display(), "cloning repository");

        Self::run_git(None, &args, timeout, "git clone")
            .await
            .map_err(|e| match e {
                GitError::Authentication(_) => e,
                GitError::CommandFailed(msg) => GitError::CloneFailed(msg),
                other => other,
            })?;
        Ok(())
    }

    async fn create_branch(&self, repo: &Path, branch: &str) -> Result<(), GitError> {
        Self::run_git(
            Some(repo),
            &["checkout", "-b", branch],
            crate::subprocess::GIT_LOCAL_TIMEOUT,
            "git checkout -b",
        )
        .await?;
        Ok(())
    }

    async fn commit_all(&self, repo: &Path, message: &str) -> Result<(), GitError> {
        Self::run_git(
            Some(repo),
            &["add", "-A"],
            crate::subprocess::GIT_LOCAL_TIMEOUT,
            "git add",
        )
        .await?;
        Self::run_git(
            Some(repo),
            &[
                "-c",
                "user.email=asa@localhost",
                "-c",
                "user.name=asa",
                "commit",
                "-m",
                message,
            ],
            crate::subprocess::GIT_LOCAL_TIMEOUT,
            "git commit",
        )
        .await?;
        Ok(())
    }

    async fn push(&self, repo: &Path, branch: &str) -> Result<(), GitError> {
        Self::run_git(
            Some(repo),
            &["push", "-u", "origin", branch],
            crate::subprocess::GIT_CLONE_TIMEOUT,
            "git push",
        )
        .await?;
        Ok(())
    }
}

/// Forge stand-in for deployments without PR integration.
#[derive(Clone, Default)]
pub struct NoopForge;

#[async_trait]
impl Forge for NoopForge {
    async fn create_pull_request(
        &self,
        _head: &str,
        _base: &str,
        _title: &str,
        _body: &str,
    ) -> Result<String, GitError> {
        Err(GitError::ForgeNotConfigured)
    }
}

// ── Fakes (test support) ─────────────────────────────────────────────────────

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeForge, FakeGit};

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::path::PathBuf;
    use std::sync::Arc;

    /// Scripted git adapter. By default every operation succeeds; a clone
    /// materializes `seed_files` into the destination so downstream file
    /// operations have something to work on.
    #[derive(Clone, Default)]
    pub struct FakeGit {
        inner: Arc<Mutex<FakeGitState>>,
    }

    #[derive(Default)]
    struct FakeGitState {
        seed_files: Vec<(String, String)>,
        clone_error: Option<GitError>,
        clone_delay: Option<Duration>,
        cloned_to: Vec<PathBuf>,
        branches: Vec<String>,
        commits: Vec<String>,
        pushes: Vec<String>,
    }

    impl FakeGit {
        pub fn new() -> Self {
            Self::default()
        }

        /// Seed a file (relative path, contents) to be written on clone.
        pub fn seed_file(&self, path: impl Into<String>, contents: impl Into<String>) {
            self.inner
                .lock()
                .seed_files
                .push((path.into(), contents.into()));
        }

        /// Make the next clone fail with the given error.
        pub fn fail_clone(&self, error: GitError) {
            self.inner.lock().clone_error = Some(error);
        }

        /// Make every clone sleep first, for cancellation timing tests.
        pub fn set_clone_delay(&self, delay: Duration) {
            self.inner.lock().clone_delay = Some(delay);
        }

        /// Destinations of completed clones.
        pub fn cloned_to(&self) -> Vec<PathBuf> {
            self.inner.lock().cloned_to.clone()
        }

        pub fn branches(&self) -> Vec<String> {
            self.inner.lock().branches.clone()
        }

        pub fn commits(&self) -> Vec<String> {
            self.inner.lock().commits.clone()
        }

        pub fn pushes(&self) -> Vec<String> {
            self.inner.lock().pushes.clone()
        }
    }

    #[async_trait]
    impl Git for FakeGit {
        async fn clone_repo(
            &self,
            _url: &str,
            dest: &Path,
            _depth: Option<u32>,
            _token: Option<&str>,
            _timeout: Duration,
        ) -> Result<(), GitError> {
            let (seed_files, delay) = {
                let mut state = self.inner.lock();
                if let Some(error) = state.clone_error.take() {
                    return Err(error);
                }
                state.cloned_to.push(dest.to_path_buf());
                (state.seed_files.clone(), state.clone_delay)
            };

            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            std::fs::create_dir_all(dest)
                .map_err(|e| GitError::CloneFailed(e.to_string()))?;
            for (rel, contents) in seed_files {
                let path = dest.join(rel);
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| GitError::CloneFailed(e.to_string()))?;
                }
                std::fs::write(&path, contents)
                    .map_err(|e| GitError::CloneFailed(e.to_string()))?;
            }
            Ok(())
        }

        async fn create_branch(&self, _repo: &Path, branch: &str) -> Result<(), GitError> {
            self.inner.lock().branches.push(branch.to_string());
            Ok(())
        }

        async fn commit_all(&self, _repo: &Path, message: &str) -> Result<(), GitError> {
            self.inner.lock().commits.push(message.to_string());
            Ok(())
        }

        async fn push(&self, _repo: &Path, branch: &str) -> Result<(), GitError> {
            self.inner.lock().pushes.push(branch.to_string());
            Ok(())
        }
    }

    /// Scripted forge adapter.
    #[derive(Clone, Default)]
    pub struct FakeForge {
        inner: Arc<Mutex<FakeForgeState>>,
    }

    #[derive(Default)]
    struct FakeForgeState {
        error: Option<GitError>,
        created: Vec<(String, String)>,
    }

    impl FakeForge {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn fail_next(&self, error: GitError) {
            self.inner.lock().error = Some(error);
        }

        /// (head, title) pairs of created pull requests.
        pub fn created(&self) -> Vec<(String, String)> {
            self.inner.lock().created.clone()
        }
    }

    #[async_trait]
    impl Forge for FakeForge {
        async fn create_pull_request(
            &self,
            head: &str,
            _base: &str,
            title: &str,
            _body: &str,
        ) -> Result<String, GitError> {
            let mut state = self.inner.lock();
            if let Some(error) = state.error.take() {
                return Err(error);
            }
            state.created.push((head.to_string(), title.to_string()));
            Ok(format!("https://forge.example.com/pr/{head}"))
        }
    }
}

#[cfg(test)]
#[path = "git_tests.rs"]
mod tests;
