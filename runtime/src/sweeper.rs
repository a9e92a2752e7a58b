//! Periodic repair of documents and references left behind by partial
//! failures.
//!
//! Multi-document writes are not transactional everywhere: a process that
//! dies between inserting an RSVP and patching its guest, or between deleting
//! a wedding and deleting its children, leaves dangling state. A sweep:
//!
//! 1. deletes RSVPs and guests whose wedding is gone,
//! 2. clears references to RSVPs or guests that are gone,
//! 3. re-points guests at the RSVP that names them.
//!
//! It then moves published weddings whose event date has passed to
//! `expired`, which takes them off the public path.
//!
//! Every step is idempotent; a sweep over consistent data changes nothing.

use crate::metrics::SweepMetrics;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use wedding_rsvp_core::environment::Clock;
use wedding_rsvp_core::{Result, Stores};

/// What one sweep changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// RSVPs deleted because their wedding is gone.
    pub orphaned_rsvps: u64,
    /// Guests deleted because their wedding is gone.
    pub orphaned_guests: u64,
    /// Guest back-references to missing RSVPs cleared.
    pub dangling_guest_links: u64,
    /// RSVP references to missing guests cleared.
    pub dangling_rsvp_links: u64,
    /// Guest back-references restored.
    pub repaired_backrefs: u64,
    /// Published weddings whose event date passed.
    pub expired_weddings: u64,
}

impl SweepReport {
    /// Total number of changes.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.orphaned_rsvps
            + self.orphaned_guests
            + self.dangling_guest_links
            + self.dangling_rsvp_links
            + self.repaired_backrefs
            + self.expired_weddings
    }
}

/// Background sweeper.
#[derive(Clone)]
pub struct OrphanSweeper {
    stores: Stores,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl OrphanSweeper {
    /// Create a sweeper that runs every `interval` once spawned.
    #[must_use]
    pub fn new(stores: Stores, clock: Arc<dyn Clock>, interval: Duration) -> Self {
        Self {
            stores,
            clock,
            interval,
        }
    }

    /// Run one sweep.
    ///
    /// Orphans are deleted before links are cleared, so a guest removed in
    /// step 1 is not first patched in step 2.
    ///
    /// # Errors
    ///
    /// `STORAGE` from the first failing step; earlier steps stay applied.
    pub async fn sweep_once(&self) -> Result<SweepReport> {
        let maintenance = &self.stores.maintenance;
        let now = self.clock.now();
        let report = SweepReport {
            orphaned_rsvps: maintenance.delete_orphaned_rsvps().await?,
            orphaned_guests: maintenance.delete_orphaned_guests().await?,
            dangling_guest_links: maintenance.clear_dangling_guest_links().await?,
            dangling_rsvp_links: maintenance.clear_dangling_rsvp_links().await?,
            repaired_backrefs: maintenance.repair_guest_backrefs().await?,
            expired_weddings: maintenance.expire_past_weddings(now.date_naive(), now).await?,
        };

        SweepMetrics::record("rsvps", report.orphaned_rsvps);
        SweepMetrics::record("guests", report.orphaned_guests);
        SweepMetrics::record("guest_links", report.dangling_guest_links);
        SweepMetrics::record("rsvp_links", report.dangling_rsvp_links);
        SweepMetrics::record("guest_backrefs", report.repaired_backrefs);
        SweepMetrics::record("expired_weddings", report.expired_weddings);

        if report.total() > 0 {
            info!(
                orphaned_rsvps = report.orphaned_rsvps,
                orphaned_guests = report.orphaned_guests,
                dangling_guest_links = report.dangling_guest_links,
                dangling_rsvp_links = report.dangling_rsvp_links,
                repaired_backrefs = report.repaired_backrefs,
                expired_weddings = report.expired_weddings,
                "Sweep changed documents"
            );
        } else {
            debug!("Sweep found nothing to change");
        }
        Ok(report)
    }

    /// Sweep every interval until `shutdown` fires or its sender is dropped.
    ///
    /// The first sweep runs one interval after spawning.
    pub fn spawn(self, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            info!(interval_secs = self.interval.as_secs(), "Orphan sweeper started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.sweep_once().await {
                            warn!(error = %e, "Sweep failed; will retry next interval");
                        }
                    }
                    _ = shutdown.recv() => {
                        info!("Orphan sweeper stopping");
                        break;
                    }
                }
            }
        })
    }
}

impl std::fmt::Debug for OrphanSweeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrphanSweeper")
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}
