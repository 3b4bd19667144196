use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use searchbridge::error::UpstreamError;
use searchbridge::retry::{Attempt, RetryExecutor, RetryPolicy};
use tokio::time::Instant;

mod test_helpers {
    use super::*;

    pub fn executor(max_retries: u32) -> RetryExecutor {
        RetryExecutor::new(RetryPolicy {
            max_retries,
            base_delay: Duration::from_secs(1),
            max_concurrency: 1,
        })
    }

    pub fn transient() -> UpstreamError {
        UpstreamError::Call("connection reset by peer".to_string())
    }
}

use test_helpers::*;

#[tokio::test(start_paused = true)]
async fn test_succeeds_after_transient_failures() {
    let executor = executor(5);
    let attempts = Mutex::new(Vec::<Attempt>::new());
    let resets = AtomicUsize::new(0);
    let start = Instant::now();

    let result = executor
        .execute(
            |attempt| {
                attempts.lock().unwrap().push(attempt);
                async move {
                    if attempt.index < 2 {
                        Err(transient())
                    } else {
                        Ok("items")
                    }
                }
            },
            || {
                resets.fetch_add(1, Ordering::SeqCst);
            },
        )
        .await;

    assert_eq!(result, Ok("items"));
    let attempts = attempts.into_inner().unwrap();
    assert_eq!(attempts.len(), 3);
    assert!(!attempts[0].fresh_connection);
    assert!(attempts[1].fresh_connection);
    assert!(attempts[2].fresh_connection);
    assert_eq!(resets.load(Ordering::SeqCst), 2);

    // backoff of 1s then 2s
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(3), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(4), "{elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn test_fatal_error_not_retried() {
    let executor = executor(5);
    let calls = AtomicUsize::new(0);

    let result: Result<(), _> = executor
        .execute(
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(UpstreamError::Call("HTTP 403 Forbidden".to_string())) }
            },
            || {},
        )
        .await;

    assert_eq!(
        result,
        Err(UpstreamError::Call("HTTP 403 Forbidden".to_string()))
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_not_configured_not_retried() {
    let executor = executor(5);
    let calls = AtomicUsize::new(0);

    let result: Result<(), _> = executor
        .execute(
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(UpstreamError::NotConfigured("missing key".to_string())) }
            },
            || {},
        )
        .await;

    assert!(matches!(result, Err(UpstreamError::NotConfigured(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_return_last_error() {
    let executor = executor(5);
    let calls = AtomicUsize::new(0);
    let start = Instant::now();

    let result: Result<(), _> = executor
        .execute(
            |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    Err(UpstreamError::Call(format!(
                        "HTTP 429 Too Many Requests (attempt {})",
                        attempt.index
                    )))
                }
            },
            || {},
        )
        .await;

    assert_eq!(calls.load(Ordering::SeqCst), 5);
    assert_eq!(
        result,
        Err(UpstreamError::Call(
            "HTTP 429 Too Many Requests (attempt 4)".to_string()
        ))
    );

    // 1 + 2 + 4 + 8 seconds, no sleep after the last attempt
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(15), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(16), "{elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn test_single_attempt_policy() {
    let executor = executor(1);
    let calls = AtomicUsize::new(0);

    let result: Result<(), _> = executor
        .execute(
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(transient()) }
            },
            || {},
        )
        .await;

    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_limiter_serializes_calls() {
    let executor = Arc::new(executor(5));
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let executor = executor.clone();
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            tokio::spawn(async move {
                executor
                    .execute(
                        |_| {
                            let in_flight = in_flight.clone();
                            let peak = peak.clone();
                            async move {
                                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                                peak.fetch_max(now, Ordering::SeqCst);
                                tokio::time::sleep(Duration::from_millis(100)).await;
                                in_flight.fetch_sub(1, Ordering::SeqCst);
                                Ok::<_, UpstreamError>(())
                            }
                        },
                        || {},
                    )
                    .await
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap().unwrap();
    }
    assert_eq!(peak.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_wider_limiter_allows_parallel_calls() {
    let executor = Arc::new(RetryExecutor::new(RetryPolicy {
        max_concurrency: 2,
        ..RetryPolicy::default()
    }));
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let run = |executor: Arc<RetryExecutor>| {
        let in_flight = in_flight.clone();
        let peak = peak.clone();
        async move {
            executor
                .execute(
                    |_| {
                        let in_flight = in_flight.clone();
                        let peak = peak.clone();
                        async move {
                            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                            peak.fetch_max(now, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(100)).await;
                            in_flight.fetch_sub(1, Ordering::SeqCst);
                            Ok::<_, UpstreamError>(())
                        }
                    },
                    || {},
                )
                .await
        }
    };

    let (a, b) = tokio::join!(run(executor.clone()), run(executor.clone()));
    assert!(a.is_ok() && b.is_ok());
    assert_eq!(peak.load(Ordering::SeqCst), 2);
}
