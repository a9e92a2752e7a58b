//! Per-operation deadlines.
//!
//! Every service call runs under a deadline: 5 seconds by default, 15 seconds
//! for long reads (export, statistics). A call that starts inside another call
//! does not get a fresh budget, so deadlines are only ever applied at the
//! outermost service entry point.
//!
//! When the deadline elapses the in-flight storage future is dropped, which
//! cancels it. Writes already committed stay committed.

use std::future::Future;
use std::time::Duration;
use wedding_rsvp_core::{Result, RsvpError};

/// Deadline budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Budget for ordinary operations.
    pub operation: Duration,
    /// Budget for exports and statistics.
    pub long_operation: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            operation: Duration::from_secs(5),
            long_operation: Duration::from_secs(15),
        }
    }
}

/// Run `fut` with a deadline of `budget`.
///
/// # Errors
///
/// Returns [`RsvpError::Storage`] if the deadline elapses, otherwise whatever
/// `fut` returns.
pub async fn with_deadline<T>(
    budget: Duration,
    operation: &'static str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(budget, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(operation, budget_ms = u64::try_from(budget.as_millis()).unwrap_or(u64::MAX), "Deadline exceeded");
            Err(RsvpError::storage(
                operation,
                format!("deadline of {budget:?} exceeded"),
            ))
        }
    }
}
