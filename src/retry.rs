//! Bounded exponential-backoff retry for upstream calls that are not safe to
//! run concurrently.
//!
//! Every call made through a [`RetryExecutor`] holds a permit from the
//! executor's semaphore for its whole retry loop, so with the default limit of
//! one the upstream never sees two requests in flight.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

use crate::error::UpstreamError;

/// Substrings of error messages that indicate a transient failure.
const RETRYABLE_SIGNATURES: &[&str] = &[
    "ssl",
    "tls",
    "record layer failure",
    "connection reset",
    "connection aborted",
    "broken pipe",
    "timed out",
    "timeout",
    "429",
    "rate limit",
    "quota exceeded",
];

const RATE_LIMIT_SIGNATURES: &[&str] = &["429", "rate limit", "quota"];

pub fn is_retryable_message(message: &str) -> bool {
    let message = message.to_lowercase();
    RETRYABLE_SIGNATURES.iter().any(|sig| message.contains(sig))
}

pub fn is_rate_limit_message(message: &str) -> bool {
    let message = message.to_lowercase();
    RATE_LIMIT_SIGNATURES.iter().any(|sig| message.contains(sig))
}

impl UpstreamError {
    pub fn is_retryable(&self) -> bool {
        match self {
            UpstreamError::NotConfigured(_) => false,
            UpstreamError::Call(message) => is_retryable_message(message),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_concurrency: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_secs(1),
            max_concurrency: 1,
        }
    }
}

impl RetryPolicy {
    /// `base_delay * 2^attempt`, attempt counted from zero.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Passed to the wrapped call on every try.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
    pub index: u32,
    /// Set on every retry: the call must not reuse a cached connection.
    pub fresh_connection: bool,
}

pub struct RetryExecutor {
    policy: RetryPolicy,
    limiter: Arc<Semaphore>,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        RetryExecutor {
            limiter: Arc::new(Semaphore::new(policy.max_concurrency.max(1))),
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Runs `call` until it succeeds, fails with a non-retryable error, or the
    /// attempts run out. `on_retry` runs before each backoff sleep and is where
    /// the caller drops its cached session.
    pub async fn execute<T, F, Fut, R>(&self, mut call: F, mut on_retry: R) -> Result<T, UpstreamError>
    where
        F: FnMut(Attempt) -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
        R: FnMut(),
    {
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| UpstreamError::Call("upstream limiter closed".to_string()))?;

        let max_retries = self.policy.max_retries.max(1);
        let mut attempt = 0u32;
        loop {
            let err = match call(Attempt {
                index: attempt,
                fresh_connection: attempt > 0,
            })
            .await
            {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let remaining = attempt + 1 < max_retries;
            if !err.is_retryable() || !remaining {
                return Err(err);
            }

            let delay = self.policy.backoff_delay(attempt);
            if is_rate_limit_message(err.message()) {
                tracing::warn!(
                    "Rate limit error on attempt {}/{}, retrying in {:.1}s: {}",
                    attempt + 1,
                    max_retries,
                    delay.as_secs_f64(),
                    err
                );
            } else {
                tracing::warn!(
                    "Transient error on attempt {}/{}, retrying in {:.1}s: {}",
                    attempt + 1,
                    max_retries,
                    delay.as_secs_f64(),
                    err
                );
            }

            on_retry();
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_from_base() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(500),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff_delay(0), Duration::from_millis(500));
        assert_eq!(policy.backoff_delay(1), Duration::from_secs(1));
        assert_eq!(policy.backoff_delay(2), Duration::from_secs(2));
        assert_eq!(policy.backoff_delay(3), Duration::from_secs(4));
    }

    #[test]
    fn test_retryable_signatures() {
        assert!(is_retryable_message("SSL: record layer failure"));
        assert!(is_retryable_message("Connection reset by peer"));
        assert!(is_retryable_message("request timed out"));
        assert!(is_retryable_message("HTTP 429 Too Many Requests"));
        assert!(is_retryable_message("Quota exceeded for quota metric"));
        assert!(is_retryable_message("User Rate Limit Exceeded"));

        assert!(!is_retryable_message("HTTP 403 Forbidden"));
        assert!(!is_retryable_message("HTTP 400 Invalid Value"));
        assert!(!is_retryable_message("dns error: failed to lookup address"));
    }

    #[test]
    fn test_not_configured_is_never_retryable() {
        let err = UpstreamError::NotConfigured("timeout in key name".into());
        assert!(!err.is_retryable());
    }
}
