// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use asa_core::ErrorKind;
use parking_lot::Mutex;
use std::sync::Arc;

fn transient(msg: &str) -> AsaError {
    AsaError::new(ErrorKind::NetworkTimeout, msg)
}

#[tokio::test(start_paused = true)]
async fn succeeds_first_try_without_sleeping() {
    let result: Result<u32, _> = with_policy(|_| async { Ok(7) }).await;
    assert_eq!(result.unwrap(), 7);
}

#[tokio::test(start_paused = true)]
async fn transient_error_retries_until_success() {
    let attempts = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&attempts);

    let result = with_policy(move |attempt| {
        let recorded = Arc::clone(&recorded);
        async move {
            recorded.lock().push(attempt);
            if attempt < 3 {
                Err(transient("flaky"))
            } else {
                Ok("done")
            }
        }
    })
    .await;

    assert_eq!(result.unwrap(), "done");
    assert_eq!(*attempts.lock(), vec![1, 2, 3]);
}

#[tokio::test(start_paused = true)]
async fn exhausts_after_policy_budget() {
    // network_timeout allows 3 attempts
    let err = with_policy::<(), _, _>(|_| async { Err(transient("always down")) })
        .await
        .unwrap_err();

    assert!(err.is_exhausted());
    match err {
        RetryError::Exhausted { attempts, error } => {
            assert_eq!(attempts, 3);
            assert_eq!(error.kind, ErrorKind::NetworkTimeout);
        }
        other => panic!("expected Exhausted, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn permanent_error_aborts_immediately() {
    let calls = Arc::new(Mutex::new(0u32));
    let counted = Arc::clone(&calls);

    let err = with_policy::<(), _, _>(move |_| {
        let counted = Arc::clone(&counted);
        async move {
            *counted.lock() += 1;
            Err(AsaError::new(ErrorKind::LlmInvalidResponse, "bad json"))
        }
    })
    .await
    .unwrap_err();

    assert!(!err.is_exhausted());
    assert_eq!(err.error().kind, ErrorKind::LlmInvalidResponse);
    assert_eq!(*calls.lock(), 1);
}

#[tokio::test(start_paused = true)]
async fn resource_error_aborts_immediately() {
    let err = with_policy::<(), _, _>(|_| async {
        Err(AsaError::new(ErrorKind::CostBudgetExceeded, "over"))
    })
    .await
    .unwrap_err();
    assert!(matches!(err, RetryError::Aborted(_)));
}

#[tokio::test(start_paused = true)]
async fn rate_limit_gets_five_attempts() {
    let calls = Arc::new(Mutex::new(0u32));
    let counted = Arc::clone(&calls);

    let err = with_policy::<(), _, _>(move |_| {
        let counted = Arc::clone(&counted);
        async move {
            *counted.lock() += 1;
            Err(AsaError::new(ErrorKind::LlmRateLimit, "429"))
        }
    })
    .await
    .unwrap_err();

    assert!(err.is_exhausted());
    assert_eq!(*calls.lock(), 5);
}
