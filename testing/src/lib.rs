//! # Wedding RSVP Testing
//!
//! Test doubles and helpers for the wedding RSVP service.
//!
//! This crate provides:
//! - [`InMemoryStore`]: every store trait over `HashMap`s, with the same
//!   uniqueness rules as the Postgres backend
//! - [`FixedClock`]: a clock that only moves when told to
//! - [`fixtures`]: ready-made inputs for weddings, guests and RSVPs
//! - [`ReducerTest`]: Given-When-Then checks for a single reducer step
//!
//! ## Example
//!
//! ```ignore
//! use wedding_rsvp_testing::{InMemoryStore, test_clock};
//!
//! #[tokio::test]
//! async fn submit_then_reconcile() {
//!     let store = InMemoryStore::new();
//!     let services = Services::new(store.stores(), Arc::new(test_clock()), RuntimeSettings::default());
//!     // ...
//! }
//! ```

mod memory;

pub mod fixtures;

pub use memory::InMemoryStore;
pub use reducer_test::ReducerTest;

use chrono::{DateTime, Utc};
use wedding_rsvp_core::environment::Clock;

/// Mock implementations of environment traits.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::{Arc, RwLock};

    /// Deterministic clock for tests.
    ///
    /// Returns the same instant until [`advance`](Self::advance) or
    /// [`set`](Self::set) is called. Clones share the same time, so a test can
    /// keep a handle while services hold another.
    ///
    /// # Example
    ///
    /// ```
    /// use wedding_rsvp_testing::mocks::FixedClock;
    /// use wedding_rsvp_core::environment::Clock;
    /// use chrono::{Duration, Utc};
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let before = clock.now();
    /// assert_eq!(before, clock.now());
    ///
    /// clock.advance(Duration::hours(25));
    /// assert_eq!(clock.now() - before, Duration::hours(25));
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: Arc<RwLock<DateTime<Utc>>>,
    }

    impl FixedClock {
        /// Create a clock stopped at `time`.
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(RwLock::new(time)),
            }
        }

        /// Move the clock forward.
        ///
        /// # Panics
        ///
        /// Panics if the lock is poisoned.
        #[allow(clippy::unwrap_used)]
        pub fn advance(&self, by: chrono::Duration) {
            let mut time = self.time.write().unwrap();
            *time += by;
        }

        /// Jump to `time`.
        ///
        /// # Panics
        ///
        /// Panics if the lock is poisoned.
        #[allow(clippy::unwrap_used)]
        pub fn set(&self, time: DateTime<Utc>) {
            *self.time.write().unwrap() = time;
        }
    }

    impl Clock for FixedClock {
        #[allow(clippy::unwrap_used)]
        fn now(&self) -> DateTime<Utc> {
            *self.time.read().unwrap()
        }
    }

    /// Clock stopped at 2026-03-01 09:00:00 UTC, a few months before the
    /// fixture weddings.
    ///
    /// # Panics
    ///
    /// Never in practice; the timestamp is hardcoded.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2026-03-01T09:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

/// Install a test-friendly tracing subscriber honouring `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use mocks::{FixedClock, test_clock};
