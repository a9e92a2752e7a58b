//! Counter reconciler.
//!
//! Recomputes a wedding's `rsvp_count`, `total_attending` and `guest_count`
//! from the authoritative collections and writes them onto the wedding.
//!
//! # Scheduling
//!
//! Mutations call [`CounterReconciler::schedule`], which never fails and never
//! blocks the caller. Requests for the same wedding arriving while one is
//! already waiting out the debounce window are coalesced into it:
//!
//! ```text
//! submit ──schedule──┐
//! update ──schedule──┤ (coalesced)   ┌──────────┐    ┌──────────────────┐
//! delete ──schedule──┴──────────────▶│ debounce │───▶│ tally + write    │
//!                                    └──────────┘    └──────────────────┘
//! ```
//!
//! At most one pass per wedding runs at a time. A request that arrives while
//! a pass is tallying marks the wedding dirty, and the same task runs another
//! pass once the current one has written, so the last write always reflects
//! the latest mutation. Storage failures are retried with backoff; if retries
//! run out the error is logged and the next mutation for that wedding tries
//! again.

use crate::metrics::ReconcileMetrics;
use crate::retry::{RetryPolicy, retry_transient};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use wedding_rsvp_core::{CounterSnapshot, Result, Stores, WeddingId};

/// Where a wedding's reconciliation task is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    /// Waiting out the debounce window.
    Queued,
    /// Tallying or writing. `rerun` is set by requests that arrived meanwhile.
    Running { rerun: bool },
}

struct Inner {
    stores: Stores,
    debounce: Duration,
    retry: RetryPolicy,
    slots: Mutex<HashMap<WeddingId, Slot>>,
    in_flight: watch::Sender<usize>,
}

/// Debounced, coalescing writer of wedding counters.
#[derive(Clone)]
pub struct CounterReconciler {
    inner: Arc<Inner>,
}

impl CounterReconciler {
    /// Create a reconciler.
    #[must_use]
    pub fn new(stores: Stores, debounce: Duration, retry: RetryPolicy) -> Self {
        let (in_flight, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                stores,
                debounce,
                retry,
                slots: Mutex::new(HashMap::new()),
                in_flight,
            }),
        }
    }

    /// Queue a reconciliation for `wedding_id` after the debounce window.
    ///
    /// Returns the task handle, or `None` if the wedding's existing task will
    /// cover this request, either because it is still debouncing or because it
    /// will run another pass after the current one. Must be called from within
    /// a Tokio runtime.
    pub fn schedule(&self, wedding_id: WeddingId) -> Option<JoinHandle<()>> {
        {
            let mut slots = self.slots();
            match slots.get_mut(&wedding_id) {
                Some(Slot::Queued) => {
                    debug!(wedding_id = %wedding_id, "Reconciliation already queued");
                    return None;
                }
                Some(Slot::Running { rerun }) => {
                    debug!(wedding_id = %wedding_id, "Reconciliation running; will run again");
                    *rerun = true;
                    return None;
                }
                None => {
                    slots.insert(wedding_id, Slot::Queued);
                }
            }
        }

        self.inner.in_flight.send_modify(|n| *n += 1);
        let this = self.clone();
        Some(tokio::spawn(async move {
            tokio::time::sleep(this.inner.debounce).await;
            this.slots().insert(wedding_id, Slot::Running { rerun: false });

            loop {
                if let Err(e) = this.reconcile(wedding_id).await {
                    warn!(
                        wedding_id = %wedding_id,
                        error = %e,
                        "Counter reconciliation failed; next mutation will retry"
                    );
                }
                if !this.finish_pass(wedding_id) {
                    break;
                }
            }
            this.inner.in_flight.send_modify(|n| *n = n.saturating_sub(1));
        }))
    }

    /// Close a pass. Returns `true` if another was requested while it ran,
    /// otherwise releases the wedding's slot.
    fn finish_pass(&self, wedding_id: WeddingId) -> bool {
        let mut slots = self.slots();
        match slots.get_mut(&wedding_id) {
            Some(Slot::Running { rerun }) if *rerun => {
                *rerun = false;
                true
            }
            _ => {
                slots.remove(&wedding_id);
                false
            }
        }
    }

    fn slots(&self) -> std::sync::MutexGuard<'_, HashMap<WeddingId, Slot>> {
        self.inner.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Recompute and write the counters now.
    ///
    /// This bypasses the per-wedding queue; mutation paths go through
    /// [`schedule`](Self::schedule). A wedding deleted in the meantime is not
    /// an error.
    ///
    /// # Errors
    ///
    /// `STORAGE` once retries are exhausted.
    pub async fn reconcile(&self, wedding_id: WeddingId) -> Result<CounterSnapshot> {
        let started = Instant::now();
        let stores = &self.inner.stores;

        let result = retry_transient(&self.inner.retry, "reconcile counters", || async move {
            let tally = stores.rsvps.tally(wedding_id).await?;
            let guest_count = stores.guests.count_by_wedding(wedding_id).await?;
            let snapshot = CounterSnapshot {
                rsvp_count: tally.rsvp_count,
                guest_count,
                total_attending: tally.total_attending,
            };
            let written = stores.weddings.set_counters(wedding_id, snapshot).await?;
            Ok((snapshot, written))
        })
        .await;

        match result {
            Ok((snapshot, true)) => {
                ReconcileMetrics::record("ok", started.elapsed());
                debug!(
                    wedding_id = %wedding_id,
                    rsvp_count = snapshot.rsvp_count,
                    guest_count = snapshot.guest_count,
                    total_attending = snapshot.total_attending,
                    "Counters reconciled"
                );
                Ok(snapshot)
            }
            Ok((snapshot, false)) => {
                ReconcileMetrics::record("missing", started.elapsed());
                debug!(wedding_id = %wedding_id, "Wedding gone; nothing to reconcile");
                Ok(snapshot)
            }
            Err(e) => {
                ReconcileMetrics::record("error", started.elapsed());
                Err(e)
            }
        }
    }

    /// Wait until every scheduled reconciliation has finished.
    pub async fn settle(&self) {
        let mut rx = self.inner.in_flight.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

impl std::fmt::Debug for CounterReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CounterReconciler")
            .field("debounce", &self.inner.debounce)
            .finish_non_exhaustive()
    }
}
