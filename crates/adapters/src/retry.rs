// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Policy-driven retry wrapper, shared by the gateway and the engine's
//! retry-eligible effects.
//!
//! Transient kinds retry with exponential backoff
//! `min(initial * multiplier^(attempt-1), cap)`; every other category
//! propagates immediately. Exhaustion is a distinguished error so callers
//! can emit `retry_exhausted`.

use asa_core::AsaError;
use std::future::Future;
use thiserror::Error;

/// Outcome of a retried operation that did not succeed.
#[derive(Debug, Clone, Error)]
pub enum RetryError {
    /// The error's policy forbids retrying (permanent, policy, user,
    /// resource categories).
    #[error("{0}")]
    Aborted(AsaError),
    /// The retry budget was consumed without success.
    #[error("retry exhausted after {attempts} attempts: {error}")]
    Exhausted { attempts: u32, error: AsaError },
}

impl RetryError {
    /// The underlying domain error.
    pub fn error(&self) -> &AsaError {
        match self {
            RetryError::Aborted(error) => error,
            RetryError::Exhausted { error, .. } => error,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }
}

/// Run `op` under the retry policy of whatever error kind it produces.
///
/// `op` receives the 1-based attempt number. The policy consulted is the
/// failing error's own, so a call that alternates between kinds is bounded
/// by whichever policy its latest failure carries.
pub async fn with_policy<T, F, Fut>(mut op: F) -> Result<T, RetryError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, AsaError>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) => {
                let policy = error.kind.retry_policy();
                if !policy.should_retry {
                    tracing::warn!(
                        kind = %error.kind,
                        category = %error.category(),
                        "error is not retryable"
                    );
                    return Err(RetryError::Aborted(error));
                }
                if attempt >= policy.max_attempts {
                    tracing::error!(
                        kind = %error.kind,
                        attempts = attempt,
                        "retry exhausted"
                    );
                    return Err(RetryError::Exhausted { attempts: attempt, error });
                }

                let backoff = policy.backoff_for_attempt(attempt);
                tracing::info!(
                    kind = %error.kind,
                    attempt,
                    max_attempts = policy.max_attempts,
                    backoff_ms = backoff.as_millis() as u64,
                    "retrying after transient error"
                );
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
