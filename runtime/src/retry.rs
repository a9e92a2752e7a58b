//! Retry with exponential backoff for transient storage failures.
//!
//! Only errors for which [`RsvpError::is_retryable`](wedding_rsvp_core::RsvpError::is_retryable) holds are retried;
//! domain decisions (duplicates, validation, closed RSVPs) are returned at once.
//!
//! # Example
//!
//! ```rust
//! use wedding_rsvp_runtime::retry::{RetryPolicy, retry_transient};
//! use wedding_rsvp_core::Result;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<()> {
//! let policy = RetryPolicy {
//!     max_retries: 5,
//!     initial_delay: Duration::from_millis(50),
//!     ..RetryPolicy::default()
//! };
//!
//! let value = retry_transient(&policy, "load counters", || async { Ok(42) }).await?;
//! assert_eq!(value, 42);
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use wedding_rsvp_core::Result;

/// Backoff configuration.
///
/// # Default Values
///
/// - `max_retries`: 3
/// - `initial_delay`: 100ms
/// - `max_delay`: 5 seconds
/// - `multiplier`: 2.0
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Cap on any single delay.
    pub max_delay: Duration,
    /// Growth factor between retries.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    /// Delay before retry number `attempt` (0-based), capped at `max_delay`.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let factor = self.multiplier.powi(exponent);
        if !factor.is_finite() {
            return self.max_delay;
        }
        self.initial_delay.mul_f64(factor).min(self.max_delay)
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// the policy's retries are used up. The last error is returned.
///
/// # Errors
///
/// Whatever the final attempt returned.
pub async fn retry_transient<F, Fut, T>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::info!(operation = operation_name, attempt, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if !err.is_retryable() => return Err(err),
            Err(err) => {
                if attempt >= policy.max_retries {
                    tracing::error!(
                        operation = operation_name,
                        attempt,
                        error = %err,
                        "Giving up after max retries"
                    );
                    return Err(err);
                }

                let delay = policy.delay_for_attempt(attempt);
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "Transient failure, retrying"
                );
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use wedding_rsvp_core::RsvpError;

    fn transient(context: &str) -> RsvpError {
        RsvpError::storage(context, "transient failure")
    }

    fn fast() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            multiplier: 2.0,
        }
    }

    #[test]
    fn delays_grow_and_cap() {
        let policy = fast();
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(1));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(2));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(4));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_millis(4));
    }

    #[tokio::test]
    async fn retries_storage_errors_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let seen = calls.clone();
        let result = retry_transient(&fast(), "flaky", move || {
            let seen = seen.clone();
            async move {
                if seen.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(transient("flaky"))
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn domain_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let seen = calls.clone();
        let result: Result<()> = retry_transient(&fast(), "dup", move || {
            seen.fetch_add(1, Ordering::SeqCst);
            async { Err(RsvpError::DuplicateRsvp("email".into())) }
        })
        .await;

        assert!(matches!(result, Err(RsvpError::DuplicateRsvp(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let seen = calls.clone();
        let result: Result<()> = retry_transient(&fast(), "down", move || {
            seen.fetch_add(1, Ordering::SeqCst);
            async { Err(transient("down")) }
        })
        .await;

        assert!(matches!(result, Err(RsvpError::Storage(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }
}
