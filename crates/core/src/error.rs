// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy and retry policies.
//!
//! Every failure that crosses a layer boundary carries an [`ErrorKind`].
//! Each kind maps to a category and a static [`RetryPolicy`]; the map is
//! read-only after startup and new kinds are additive.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// High-level error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Temporary failures, safe to retry
    Transient,
    /// Cannot be fixed by retry
    Permanent,
    /// Policy/security violation
    Policy,
    /// User input error
    User,
    /// Resource limits exceeded
    Resource,
}

crate::simple_display! {
    ErrorCategory {
        Transient => "transient",
        Permanent => "permanent",
        Policy => "policy",
        User => "user",
        Resource => "resource",
    }
}

/// Specific error kinds with retry policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    // Transient (retry with backoff)
    NetworkTimeout,
    NetworkConnection,
    LlmRateLimit,
    LlmTimeout,
    SandboxTimeout,
    ForgeRateLimit,

    // Permanent (do not retry)
    LlmInvalidResponse,
    ParseError,
    FileNotFound,
    GitAuthenticationFailed,
    SandboxFailed,

    // Policy violations (do not retry, require human review)
    GuardianRejected,
    SecretExposed,
    UnsafeCode,

    // User errors (do not retry, need user fix)
    InvalidInput,
    InvalidRepoUrl,

    // Resource limits
    TokenBudgetExceeded,
    CostBudgetExceeded,
    TimeBudgetExceeded,
    QueueFull,
}

crate::simple_display! {
    ErrorKind {
        NetworkTimeout => "network_timeout",
        NetworkConnection => "network_connection",
        LlmRateLimit => "llm_rate_limit",
        LlmTimeout => "llm_timeout",
        SandboxTimeout => "sandbox_timeout",
        ForgeRateLimit => "forge_rate_limit",
        LlmInvalidResponse => "llm_invalid_response",
        ParseError => "parse_error",
        FileNotFound => "file_not_found",
        SandboxFailed => "sandbox_failed",
        GuardianRejected => "guardian_rejected",
        SecretExposed => "secret_exposed",
        UnsafeCode => "unsafe_code",
        GitAuthenticationFailed => "git_authentication_failed",
        InvalidInput => "invalid_input",
        InvalidRepoUrl => "invalid_repo_url",
        TokenBudgetExceeded => "token_budget_exceeded",
        CostBudgetExceeded => "cost_budget_exceeded",
        TimeBudgetExceeded => "time_budget_exceeded",
        QueueFull => "queue_full",
    }
}

/// Retry behavior for an error kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub should_retry: bool,
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: f64,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    const fn none() -> Self {
        Self {
            should_retry: false,
            max_attempts: 0,
            initial_backoff: Duration::ZERO,
            multiplier: 1.0,
            max_backoff: Duration::ZERO,
        }
    }

    const fn backoff(max_attempts: u32, initial_ms: u64, multiplier: f64, cap_ms: u64) -> Self {
        Self {
            should_retry: true,
            max_attempts,
            initial_backoff: Duration::from_millis(initial_ms),
            multiplier,
            max_backoff: Duration::from_millis(cap_ms),
        }
    }

    /// Backoff before the given attempt (1-based): `min(initial * multiplier^(attempt-1), cap)`.
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1);
        let ms = self.initial_backoff.as_millis() as f64 * self.multiplier.powi(exp as i32);
        Duration::from_millis((ms as u64).min(self.max_backoff.as_millis() as u64))
    }
}

impl ErrorKind {
    /// Category for this kind. Static, total.
    pub fn category(&self) -> ErrorCategory {
        use ErrorKind::*;
        match self {
            NetworkTimeout | NetworkConnection | LlmRateLimit | LlmTimeout | SandboxTimeout
            | ForgeRateLimit => ErrorCategory::Transient,
            LlmInvalidResponse | ParseError | FileNotFound | GitAuthenticationFailed
            | SandboxFailed => ErrorCategory::Permanent,
            GuardianRejected | SecretExposed | UnsafeCode => ErrorCategory::Policy,
            InvalidInput | InvalidRepoUrl => ErrorCategory::User,
            TokenBudgetExceeded | CostBudgetExceeded | TimeBudgetExceeded | QueueFull => {
                ErrorCategory::Resource
            }
        }
    }

    /// Retry policy for this kind. Static, total.
    pub fn retry_policy(&self) -> RetryPolicy {
        use ErrorKind::*;
        match self {
            NetworkTimeout => RetryPolicy::backoff(3, 2_000, 2.0, 30_000),
            NetworkConnection => RetryPolicy::backoff(3, 1_000, 2.0, 10_000),
            LlmRateLimit => RetryPolicy::backoff(5, 10_000, 2.0, 120_000),
            LlmTimeout => RetryPolicy::backoff(2, 5_000, 1.5, 15_000),
            SandboxTimeout => RetryPolicy::backoff(2, 3_000, 1.0, 3_000),
            ForgeRateLimit => RetryPolicy::backoff(3, 60_000, 1.0, 60_000),
            _ => RetryPolicy::none(),
        }
    }

    pub fn should_retry(&self) -> bool {
        self.retry_policy().should_retry
    }
}

/// Classify a raw failure into an [`ErrorKind`] by inspecting the error's
/// type name and message fragments. Defaults to `SandboxFailed` when no
/// rule matches.
pub fn classify(type_name: &str, message: &str) -> ErrorKind {
    let msg = message.to_lowercase();

    if msg.contains("rate limit") || msg.contains("429") {
        return ErrorKind::LlmRateLimit;
    }
    if msg.contains("timeout") || msg.contains("timed out") || type_name.contains("Timeout") {
        return ErrorKind::NetworkTimeout;
    }
    if msg.contains("connection") || type_name.contains("Connection") {
        return ErrorKind::NetworkConnection;
    }
    if msg.contains("json") || type_name.contains("JsonError") {
        return ErrorKind::LlmInvalidResponse;
    }
    if msg.contains("no such file") || msg.contains("not found") || type_name.contains("NotFound") {
        return ErrorKind::FileNotFound;
    }
    if msg.contains("authentication") || msg.contains("401") || msg.contains("permission denied") {
        return ErrorKind::GitAuthenticationFailed;
    }

    ErrorKind::SandboxFailed
}

/// Domain error: a taxonomy kind plus a message and a details map.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct AsaError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub details: HashMap<String, String>,
}

impl AsaError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: HashMap::new(),
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn category(&self) -> ErrorCategory {
        self.kind.category()
    }

    pub fn should_retry(&self) -> bool {
        self.kind.should_retry()
    }

    /// Wrap an arbitrary error by classifying its message.
    pub fn classified(type_name: &str, source: impl std::fmt::Display) -> Self {
        let message = source.to_string();
        Self::new(classify(type_name, &message), message)
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
