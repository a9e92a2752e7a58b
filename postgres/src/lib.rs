//! `PostgreSQL` stores for the wedding RSVP service.
//!
//! Each collection is a table holding the serialized document in a `doc`
//! JSONB column, next to plain columns for the fields that are filtered,
//! sorted or unique-indexed. Both are written in the same statement, so they
//! never disagree.
//!
//! Uniqueness is left to the indexes created by `migrations/0001_init.sql`;
//! violations are translated by index name:
//!
//! | Index                      | Error                      |
//! |----------------------------|----------------------------|
//! | `weddings_slug_key`        | `SLUG_TAKEN`               |
//! | `guests_wedding_email_key` | `DUPLICATE_GUEST`          |
//! | `rsvps_wedding_email_key`  | `DUPLICATE_RSVP` (email)   |
//! | `rsvps_guest_key`          | `DUPLICATE_RSVP` (guest)   |
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use wedding_rsvp_core::Stores;
//! use wedding_rsvp_postgres::PostgresStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = sqlx::PgPool::connect("postgres://localhost/weddings").await?;
//! let store = PostgresStore::new(pool);
//! store.migrate().await?;
//! let stores = Stores::from_backend(Arc::new(store));
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod guests;
mod maintenance;
mod rsvps;
mod weddings;

use sqlx::PgPool;
use wedding_rsvp_core::{Result, RsvpError};

/// Unique index on `weddings.slug`.
pub const WEDDING_SLUG_KEY: &str = "weddings_slug_key";
/// Partial unique index on `guests (wedding_id, email)`.
pub const GUEST_EMAIL_KEY: &str = "guests_wedding_email_key";
/// Partial unique index on `rsvps (wedding_id, email)`.
pub const RSVP_EMAIL_KEY: &str = "rsvps_wedding_email_key";
/// Partial unique index on `rsvps.guest_id`.
pub const RSVP_GUEST_KEY: &str = "rsvps_guest_key";

/// Every store trait over one connection pool.
#[derive(Clone, Debug)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Wrap an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create tables and indexes.
    ///
    /// # Errors
    ///
    /// `STORAGE` if a migration fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| RsvpError::storage("run migrations", e))?;
        tracing::info!("Database migrations applied");
        Ok(())
    }
}

/// Name of the unique index a statement violated, if that is why it failed.
fn violated_index(err: &sqlx::Error) -> Option<&str> {
    match err {
        sqlx::Error::Database(db) if db.is_unique_violation() => db.constraint(),
        _ => None,
    }
}

/// Map a backend error that is not a known unique violation.
fn storage(context: &'static str) -> impl FnOnce(sqlx::Error) -> RsvpError {
    move |err| {
        tracing::error!(operation = context, error = %err, "Database operation failed");
        RsvpError::storage(context, err)
    }
}

/// Whether a listing has a free-text term, which is matched in memory.
fn searching(term: Option<&str>) -> bool {
    term.is_some_and(|t| !t.trim().is_empty())
}

/// Stored counts are never negative.
fn count(n: i64) -> u64 {
    u64::try_from(n).unwrap_or_default()
}

/// Bind value for `LIMIT`/`OFFSET`.
fn bind_len(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}
