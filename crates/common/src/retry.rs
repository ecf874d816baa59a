//! Bounded-attempt retry with exponential backoff.
//!
//! Wraps a fallible asynchronous operation and re-invokes it on
//! failure with a deterministic delay schedule. Used for the initial
//! ephemeral-credential fetch; mid-session refreshes deliberately use
//! a single attempt so that the caller decides what a failure means.
//!
//! # Example
//!
//! ```rust,ignore
//! use common::retry::{retry, RetryConfig};
//!
//! let config = RetryConfig::default();
//! let value = retry(|| async { fetch_credential().await }, &config).await?;
//! ```

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Default number of attempts (total, including the first).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base delay between attempts.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(1);

/// Retry policy for [`retry`].
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total number of attempts. `1` means no retry at all.
    pub max_attempts: u32,

    /// Delay before the second attempt.
    pub initial_delay: Duration,

    /// When `true`, the delay before attempt `n + 1` is
    /// `initial_delay * 2^(n - 1)`; when `false` the delay is flat.
    /// No jitter is applied.
    pub backoff: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: DEFAULT_INITIAL_DELAY,
            backoff: true,
        }
    }
}

impl RetryConfig {
    /// A policy that performs exactly one attempt.
    #[must_use]
    pub fn single_attempt() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            backoff: false,
        }
    }

    /// Delay to wait after the given failed attempt (1-based).
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        if self.backoff {
            // Saturate rather than overflow on absurd attempt counts.
            let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
            self.initial_delay.saturating_mul(factor)
        } else {
            self.initial_delay
        }
    }
}

/// Invoke `operation` until it succeeds or the attempt budget is spent.
///
/// Returns the first successful result. On exhaustion, fails with the
/// error from the final attempt, unchanged. Each failed attempt is
/// logged at warning level with its index.
///
/// # Errors
///
/// Returns the last observed error once `max_attempts` invocations
/// have all failed.
pub async fn retry<T, E, F, Fut>(mut operation: F, config: &RetryConfig) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                warn!(
                    target: "common.retry",
                    attempt,
                    max_attempts,
                    error = %e,
                    "Attempt failed"
                );

                if attempt >= max_attempts {
                    return Err(e);
                }

                tokio::time::sleep(config.delay_after(attempt)).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    /// Operation that fails its first `fail_first` invocations, then
    /// succeeds with the invocation index.
    fn flaky(
        fail_first: u32,
    ) -> (
        Arc<AtomicU32>,
        impl FnMut() -> std::pin::Pin<Box<dyn Future<Output = Result<u32, String>>>>,
    ) {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);
        let op = move || {
            let calls = Arc::clone(&calls_clone);
            Box::pin(async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n <= fail_first {
                    Err(format!("boom {n}"))
                } else {
                    Ok(n)
                }
            }) as std::pin::Pin<Box<dyn Future<Output = Result<u32, String>>>>
        };
        (calls, op)
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_k_failures_with_k_plus_one_invocations() {
        let (calls, op) = flaky(2);
        let config = RetryConfig {
            max_attempts: 5,
            initial_delay: Duration::from_millis(10),
            backoff: true,
        };

        let result = retry(op, &config).await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn does_not_retry_after_success() {
        let (calls, op) = flaky(0);
        let result = retry(op, &RetryConfig::default()).await;

        assert_eq!(result.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_returns_final_error() {
        let (calls, op) = flaky(u32::MAX);
        let config = RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            backoff: true,
        };

        let result = retry(op, &config).await;

        assert_eq!(result.unwrap_err(), "boom 3");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_doubles_between_attempts() {
        let (_, op) = flaky(3);
        let config = RetryConfig {
            max_attempts: 4,
            initial_delay: Duration::from_secs(1),
            backoff: true,
        };

        let start = Instant::now();
        let result = retry(op, &config).await;

        // Waits: 1s + 2s + 4s = 7s before the 4th (successful) attempt.
        assert!(result.is_ok());
        assert_eq!(start.elapsed(), Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn flat_delay_when_backoff_disabled() {
        let (_, op) = flaky(3);
        let config = RetryConfig {
            max_attempts: 4,
            initial_delay: Duration::from_secs(1),
            backoff: false,
        };

        let start = Instant::now();
        let result = retry(op, &config).await;

        assert!(result.is_ok());
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[test]
    fn delay_schedule_is_deterministic() {
        let config = RetryConfig {
            max_attempts: 5,
            initial_delay: Duration::from_millis(500),
            backoff: true,
        };

        assert_eq!(config.delay_after(1), Duration::from_millis(500));
        assert_eq!(config.delay_after(2), Duration::from_secs(1));
        assert_eq!(config.delay_after(3), Duration::from_secs(2));
    }

    #[test]
    fn single_attempt_policy() {
        let config = RetryConfig::single_attempt();
        assert_eq!(config.max_attempts, 1);
    }
}
