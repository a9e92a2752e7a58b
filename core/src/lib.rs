//! # Wedding RSVP Core
//!
//! Domain types and persistence seams for the wedding RSVP service.
//!
//! This crate has no I/O of its own. It defines:
//!
//! - **Identifiers**: 96-bit time-prefixed [`id::ObjectId`] and the typed ids built on it
//! - **Slugs**: validated, normalized public addresses for weddings ([`slug::Slug`])
//! - **Documents**: [`wedding::Wedding`], [`guest::Guest`], [`rsvp::Rsvp`] and their inputs
//! - **Errors**: the contract-level taxonomy in [`error::RsvpError`]
//! - **Stores**: dyn-compatible storage traits implemented by the Postgres and in-memory backends
//! - **Reducers**: the [`reducer::Reducer`] trait that keeps business rules free of I/O
//! - **Environment**: the [`environment::Clock`] abstraction used for deterministic tests
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ WeddingStore │   │  GuestStore  │   │  RsvpStore   │   ← traits (this crate)
//! └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!        │                  │                  │
//!        ├──────────────────┴──────────────────┤
//!        ▼                                     ▼
//!  PostgresStore (postgres crate)     InMemoryStore (testing crate)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod guest;
pub mod id;
pub mod paging;
pub mod reducer;
pub mod rsvp;
pub mod slug;
pub mod store;
pub mod wedding;

// Re-export commonly used types
pub use chrono::{DateTime, NaiveDate, Utc};
pub use error::{Result, RsvpError};
pub use guest::{
    BulkImportReport, BulkRowError, Guest, GuestFilter, GuestPatch, InvitationStatus, NewGuest,
    RsvpLink, Side,
};
pub use id::{GuestId, ImportBatchId, ObjectId, RsvpId, UserId, WeddingId};
pub use paging::{Page, PageRequest};
pub use reducer::Reducer;
pub use rsvp::{
    CustomAnswer, PlusOne, Rsvp, RsvpFilter, RsvpPatch, RsvpSource, RsvpStatus, RsvpSubmission,
};
pub use slug::Slug;
pub use store::{
    GuestStore, MaintenanceStore, RsvpStore, RsvpTally, StoreFuture, Stores, WeddingStore,
};
pub use wedding::{
    CounterSnapshot, Couple, CustomQuestion, EventDetails, NewWedding, Partner, QuestionKind,
    RsvpSettings, Theme, Wedding, WeddingCounters, WeddingFilter, WeddingPatch, WeddingStatus,
};

/// Environment module - injected dependencies that make services testable.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```ignore
    /// // Production - uses system clock
    /// let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    ///
    /// // Test - fixed time for deterministic tests
    /// let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(submitted_at));
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

/// Normalize an optional e-mail address for storage and uniqueness checks.
///
/// Trims whitespace and lowercases. Empty input becomes `None`, so it never
/// participates in the per-wedding uniqueness rule.
///
/// # Errors
///
/// Returns [`RsvpError::Validation`] on `field` when the address is not of the
/// form `local@domain`.
pub fn normalize_email(field: &str, email: Option<&str>) -> Result<Option<String>> {
    let Some(raw) = email.map(str::trim).filter(|e| !e.is_empty()) else {
        return Ok(None);
    };

    let normalized = raw.to_lowercase();
    let valid = match normalized.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !normalized.chars().any(char::is_whitespace)
        }
        None => false,
    };

    if valid {
        Ok(Some(normalized))
    } else {
        Err(RsvpError::validation(field, "must be a valid e-mail address"))
    }
}

/// Trim an optional free-text value, mapping blank input to `None`.
#[must_use]
pub fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
