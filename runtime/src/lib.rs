//! # Wedding RSVP Runtime
//!
//! Services on top of the storage seams defined in `wedding-rsvp-core`.
//!
//! ## Components
//!
//! - **[`weddings::WeddingService`]**: wedding lifecycle and public lookup
//! - **[`guests::GuestService`]**: guest list, bulk import, rollback
//! - **[`engine::RsvpEngine`]**: RSVP intake, edits and exports
//! - **[`aggregator::Aggregator`]**: statistics computed from the RSVP collection
//! - **[`reconciler::CounterReconciler`]**: debounced rewrite of wedding counters
//! - **[`sweeper::OrphanSweeper`]**: periodic repair of dangling state and expiry of past events
//!
//! Wedding and RSVP writes go through the reducers in [`aggregates`]; the
//! services load state, call [`dispatch::dispatch`] and execute the effects.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use wedding_rsvp_core::environment::SystemClock;
//! use wedding_rsvp_runtime::{RuntimeSettings, Services};
//!
//! let services = Services::new(stores, Arc::new(SystemClock), RuntimeSettings::default());
//! let rsvp = services.rsvps.submit_public("j-and-j-2026", submission).await?;
//! ```

pub mod aggregates;
pub mod aggregator;
pub mod deadline;
pub mod dispatch;
pub mod engine;
pub mod guests;
pub mod health;
pub mod metrics;
pub mod reconciler;
pub mod retry;
pub mod sweeper;
pub mod weddings;

pub use aggregator::{Aggregator, DailyCount, RsvpStatistics};
pub use deadline::Timeouts;
pub use engine::RsvpEngine;
pub use guests::GuestService;
pub use health::{HealthCheck, HealthReport, HealthStatus};
pub use reconciler::CounterReconciler;
pub use retry::RetryPolicy;
pub use sweeper::{OrphanSweeper, SweepReport};
pub use weddings::WeddingService;

use std::sync::Arc;
use std::time::Duration;
use wedding_rsvp_core::environment::Clock;
use wedding_rsvp_core::{Result, RsvpError, Stores, UserId, Wedding, WeddingId};

/// Load a wedding and check the caller owns it.
///
/// Not found wins over unauthorized, so existence is only revealed to callers
/// who could have created the id.
pub(crate) async fn load_owned(stores: &Stores, id: WeddingId, user: &UserId) -> Result<Wedding> {
    let wedding = stores
        .weddings
        .get(id)
        .await?
        .ok_or_else(|| RsvpError::not_found("wedding", id))?;
    if !wedding.is_owned_by(user) {
        return Err(RsvpError::Unauthorized);
    }
    Ok(wedding)
}

/// Tunables for the services.
///
/// # Default Values
///
/// - `edit_window`: 24 hours
/// - `reconcile_debounce`: 500ms
/// - `timeouts`: 5s / 15s
/// - `reconcile_retry`: [`RetryPolicy::default`]
/// - `sweep_interval`: 5 minutes
#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    /// How long a non-owner may edit a response after submitting it.
    pub edit_window: chrono::Duration,
    /// Quiet period before counters are rewritten.
    pub reconcile_debounce: Duration,
    /// Deadline budgets.
    pub timeouts: Timeouts,
    /// Backoff for counter writes.
    pub reconcile_retry: RetryPolicy,
    /// Time between orphan sweeps.
    pub sweep_interval: Duration,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            edit_window: chrono::Duration::hours(24),
            reconcile_debounce: Duration::from_millis(500),
            timeouts: Timeouts::default(),
            reconcile_retry: RetryPolicy::default(),
            sweep_interval: Duration::from_secs(300),
        }
    }
}

/// Every service, wired to one set of stores and one clock.
#[derive(Clone)]
pub struct Services {
    /// Wedding lifecycle.
    pub weddings: WeddingService,
    /// Guest list.
    pub guests: GuestService,
    /// RSVP intake and edits.
    pub rsvps: RsvpEngine,
    /// Statistics.
    pub aggregator: Aggregator,
    /// Counter reconciliation.
    pub reconciler: CounterReconciler,
    /// Orphan sweeping.
    pub sweeper: OrphanSweeper,
    stores: Stores,
    timeouts: Timeouts,
    clock: Arc<dyn Clock>,
}

impl Services {
    /// Wire the services.
    #[must_use]
    pub fn new(stores: Stores, clock: Arc<dyn Clock>, settings: RuntimeSettings) -> Self {
        let reconciler = CounterReconciler::new(
            stores.clone(),
            settings.reconcile_debounce,
            settings.reconcile_retry,
        );
        Self {
            weddings: WeddingService::new(stores.clone(), clock.clone(), settings.timeouts),
            guests: GuestService::new(stores.clone(), clock.clone(), settings.timeouts, reconciler.clone()),
            rsvps: RsvpEngine::new(
                stores.clone(),
                clock.clone(),
                settings.timeouts,
                reconciler.clone(),
                settings.edit_window,
            ),
            aggregator: Aggregator::new(stores.clone(), clock.clone(), settings.timeouts),
            reconciler,
            sweeper: OrphanSweeper::new(stores.clone(), clock.clone(), settings.sweep_interval),
            stores,
            timeouts: settings.timeouts,
            clock,
        }
    }

    /// Check the backing store. Backs `/ready`.
    pub async fn readiness(&self) -> HealthReport {
        let storage = health::check_storage(
            &self.stores,
            self.timeouts.operation / 5,
            self.timeouts.operation,
        )
        .await;
        HealthReport::new(vec![storage], self.clock.now())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use wedding_rsvp_testing::fixtures::{new_wedding, owner, stranger};
    use wedding_rsvp_testing::{InMemoryStore, test_clock};

    fn services() -> Services {
        Services::new(
            InMemoryStore::new().stores(),
            Arc::new(test_clock()),
            RuntimeSettings {
                reconcile_debounce: Duration::ZERO,
                ..RuntimeSettings::default()
            },
        )
    }

    #[tokio::test]
    async fn ownership_is_checked_after_existence() {
        let services = services();
        let wedding = services.weddings.create(&owner(), new_wedding("j-and-j-2026")).await.unwrap();

        assert_eq!(
            load_owned(&services.stores, wedding.id, &stranger()).await,
            Err(RsvpError::Unauthorized)
        );
        let missing = WeddingId::new();
        assert_eq!(
            load_owned(&services.stores, missing, &stranger()).await.unwrap_err().kind(),
            "NOT_FOUND"
        );
    }

    #[tokio::test]
    async fn readiness_reports_storage() {
        let report = services().readiness().await;
        assert!(report.is_ready());
        assert_eq!(report.checks[0].component, "storage");
        assert_eq!(report.timestamp, test_clock().now());
    }
}
