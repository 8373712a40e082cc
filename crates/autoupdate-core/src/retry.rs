//! Bounded retry with a fixed delay between attempts.
//!
//! Only errors whose [`Retryable::is_retryable`] returns `true` are retried;
//! anything else is surfaced on the attempt that produced it.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::config::UpdateConfig;
use crate::error::Retryable;
use crate::metrics::METRICS;
use crate::obs;

/// Retry settings for a single fetch or download operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first (0 = run once).
    pub max_retry: u32,
    /// Fixed pause between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retry: 3,
            delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retry: u32, delay: Duration) -> Self {
        Self { max_retry, delay }
    }

    pub fn from_config(config: &UpdateConfig) -> Self {
        Self::new(config.max_retry, config.retry_delay)
    }

    /// Total number of attempts this policy allows.
    pub fn max_attempts(&self) -> u32 {
        self.max_retry.saturating_add(1)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent. Returns the last error in the latter cases.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        let max_attempts = self.max_attempts();
        let mut attempt = 1;

        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(op = label, attempt, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if !err.is_retryable() => {
                    debug!(op = label, attempt, error = %err, "non-retryable failure");
                    return Err(err);
                }
                Err(err) if attempt >= max_attempts => {
                    tracing::warn!(
                        op = label,
                        attempts = attempt,
                        error = %err,
                        "giving up after exhausting retries"
                    );
                    return Err(err);
                }
                Err(err) => {
                    obs::emit_retry_scheduled(label, attempt, max_attempts, self.delay, &err);
                    METRICS.inc_retries();
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Convenience wrapper: `RetryPolicy::new(max_retry, delay).run(label, op)`.
pub async fn with_retry<T, E, F, Fut>(
    max_retry: u32,
    delay: Duration,
    label: &str,
    op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    RetryPolicy::new(max_retry, delay).run(label, op).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DownloadError, FetchError};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast(max_retry: u32) -> RetryPolicy {
        RetryPolicy::new(max_retry, Duration::from_millis(5))
    }

    #[test]
    fn test_default_policy() {
        let p = RetryPolicy::default();
        assert_eq!(p.max_retry, 3);
        assert_eq!(p.max_attempts(), 4);
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let out: Result<u32, FetchError> = fast(3)
            .run("fetch", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(7)
            })
            .await;
        assert_eq!(out.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let out = fast(3)
            .run("fetch", || {
                let calls = calls.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err(FetchError::BadStatus { status: 503 })
                    } else {
                        Ok("manifest")
                    }
                }
            })
            .await;
        assert_eq!(out.unwrap(), "manifest");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_stops_immediately() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let out: Result<(), DownloadError> = fast(5)
            .run("download", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(DownloadError::TooLarge {
                    limit: 10,
                    received: 11,
                })
            })
            .await;
        assert!(matches!(out, Err(DownloadError::TooLarge { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_retries_runs_once() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let out: Result<(), FetchError> = fast(0)
            .run("fetch", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(FetchError::Timeout { limit_ms: 1 })
            })
            .await;
        assert!(out.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
