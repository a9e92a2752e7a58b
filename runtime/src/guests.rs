//! Guest list management, including bulk import and rollback.

use crate::deadline::{Timeouts, with_deadline};
use crate::load_owned;
use crate::reconciler::CounterReconciler;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use wedding_rsvp_core::environment::Clock;
use wedding_rsvp_core::{
    BulkImportReport, BulkRowError, Guest, GuestFilter, GuestId, GuestPatch, ImportBatchId,
    NewGuest, Page, PageRequest, Result, RsvpError, Stores, UserId, WeddingId,
};

/// Owner operations on a wedding's guest list.
#[derive(Clone)]
pub struct GuestService {
    stores: Stores,
    clock: Arc<dyn Clock>,
    timeouts: Timeouts,
    reconciler: CounterReconciler,
}

impl GuestService {
    /// Create the service.
    #[must_use]
    pub fn new(
        stores: Stores,
        clock: Arc<dyn Clock>,
        timeouts: Timeouts,
        reconciler: CounterReconciler,
    ) -> Self {
        Self {
            stores,
            clock,
            timeouts,
            reconciler,
        }
    }

    /// Add one guest.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND`, `UNAUTHORIZED`, `VALIDATION`, or `DUPLICATE_GUEST` when
    /// another guest of the wedding has the same e-mail.
    #[instrument(skip_all, fields(user_id = %owner, wedding_id = %wedding_id))]
    pub async fn create(&self, owner: &UserId, wedding_id: WeddingId, input: NewGuest) -> Result<Guest> {
        with_deadline(self.timeouts.operation, "create guest", async {
            load_owned(&self.stores, wedding_id, owner).await?;
            let input = input.normalized("")?;
            let guest = Guest::from_new(GuestId::new(), wedding_id, owner.clone(), input, None, self.clock.now());
            self.stores.guests.insert(guest.clone()).await?;
            self.reconciler.schedule(wedding_id);
            info!(guest_id = %guest.id, "Guest added");
            Ok(guest)
        })
        .await
    }

    /// Import many guests under one batch id.
    ///
    /// Each row is validated and inserted on its own: a bad or duplicate row
    /// is reported and the rest still go in. Duplicates within the request
    /// are caught by the same unique index as duplicates against stored
    /// guests.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND`, `UNAUTHORIZED`, `VALIDATION` for an empty request, or
    /// `STORAGE` when the backend fails (rows inserted so far stay and can be
    /// removed with [`GuestService::rollback_import_batch`]).
    #[instrument(skip_all, fields(user_id = %owner, wedding_id = %wedding_id, rows = rows.len()))]
    pub async fn bulk_create(
        &self,
        owner: &UserId,
        wedding_id: WeddingId,
        rows: Vec<NewGuest>,
    ) -> Result<BulkImportReport> {
        if rows.is_empty() {
            return Err(RsvpError::validation("guests", "must contain at least one guest"));
        }

        with_deadline(self.timeouts.long_operation, "bulk create guests", async {
            load_owned(&self.stores, wedding_id, owner).await?;
            let batch = ImportBatchId::new();
            let now = self.clock.now();
            let mut report = BulkImportReport {
                import_batch_id: batch,
                inserted: 0,
                guest_ids: Vec::with_capacity(rows.len()),
                errors: Vec::new(),
            };

            for (row, input) in rows.into_iter().enumerate() {
                let input = match input.normalized(&format!("guests[{row}]")) {
                    Ok(input) => input,
                    Err(e) => {
                        report.errors.push(row_error(row, &e));
                        continue;
                    }
                };
                let guest = Guest::from_new(GuestId::new(), wedding_id, owner.clone(), input, Some(batch), now);
                let id = guest.id;
                match self.stores.guests.insert(guest).await {
                    Ok(()) => {
                        report.inserted += 1;
                        report.guest_ids.push(id);
                    }
                    Err(e @ RsvpError::DuplicateGuest(_)) => report.errors.push(row_error(row, &e)),
                    Err(e) => {
                        if report.inserted > 0 {
                            self.reconciler.schedule(wedding_id);
                        }
                        return Err(e);
                    }
                }
            }

            if report.inserted > 0 {
                self.reconciler.schedule(wedding_id);
            }
            info!(
                import_batch_id = %batch,
                inserted = report.inserted,
                rejected = report.errors.len(),
                "Guest import finished"
            );
            Ok(report)
        })
        .await
    }

    /// Read one guest.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND` or `UNAUTHORIZED`.
    pub async fn get(&self, owner: &UserId, id: GuestId) -> Result<Guest> {
        with_deadline(self.timeouts.operation, "get guest", self.load_owned_guest(owner, id)).await
    }

    /// Apply a partial update.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND`, `UNAUTHORIZED`, `VALIDATION`, or `DUPLICATE_GUEST`.
    #[instrument(skip_all, fields(user_id = %owner, guest_id = %id))]
    pub async fn update(&self, owner: &UserId, id: GuestId, patch: GuestPatch) -> Result<Guest> {
        with_deadline(self.timeouts.operation, "update guest", async {
            let mut guest = self.load_owned_guest(owner, id).await?;
            patch.apply(&mut guest)?;
            guest.updated_at = self.clock.now();
            if !self.stores.guests.update_profile(guest.clone()).await? {
                return Err(RsvpError::not_found("guest", id));
            }
            debug!("Guest updated");
            Ok(guest)
        })
        .await
    }

    /// Remove a guest. A response linked to the guest is kept but unlinked.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND` or `UNAUTHORIZED`.
    #[instrument(skip_all, fields(user_id = %owner, guest_id = %id))]
    pub async fn delete(&self, owner: &UserId, id: GuestId) -> Result<()> {
        with_deadline(self.timeouts.operation, "delete guest", async {
            let guest = self.load_owned_guest(owner, id).await?;
            let unlinked = self.stores.rsvps.clear_guest(id).await?;
            if !self.stores.guests.delete(id).await? {
                return Err(RsvpError::not_found("guest", id));
            }
            self.reconciler.schedule(guest.wedding_id);
            info!(unlinked_rsvps = unlinked, "Guest deleted");
            Ok(())
        })
        .await
    }

    /// A page of a wedding's guests in insertion order.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND` or `UNAUTHORIZED`.
    pub async fn list(
        &self,
        owner: &UserId,
        wedding_id: WeddingId,
        filter: GuestFilter,
        page: PageRequest,
    ) -> Result<Page<Guest>> {
        with_deadline(self.timeouts.operation, "list guests", async {
            load_owned(&self.stores, wedding_id, owner).await?;
            self.stores.guests.list_by_wedding(wedding_id, filter, page).await
        })
        .await
    }

    /// Every guest created by one import.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND` or `UNAUTHORIZED`.
    pub async fn list_import_batch(
        &self,
        owner: &UserId,
        wedding_id: WeddingId,
        batch: ImportBatchId,
    ) -> Result<Vec<Guest>> {
        with_deadline(self.timeouts.long_operation, "list import batch", async {
            load_owned(&self.stores, wedding_id, owner).await?;
            self.stores.guests.list_by_import_batch(wedding_id, batch).await
        })
        .await
    }

    /// Undo an import: delete every guest it created. Responses linked to
    /// those guests are kept but unlinked.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND` or `UNAUTHORIZED`.
    #[instrument(skip_all, fields(user_id = %owner, wedding_id = %wedding_id, import_batch_id = %batch))]
    pub async fn rollback_import_batch(
        &self,
        owner: &UserId,
        wedding_id: WeddingId,
        batch: ImportBatchId,
    ) -> Result<u64> {
        with_deadline(self.timeouts.long_operation, "rollback import batch", async {
            load_owned(&self.stores, wedding_id, owner).await?;
            for guest in self.stores.guests.list_by_import_batch(wedding_id, batch).await? {
                self.stores.rsvps.clear_guest(guest.id).await?;
            }
            let removed = self.stores.guests.delete_by_import_batch(wedding_id, batch).await?;
            if removed > 0 {
                self.reconciler.schedule(wedding_id);
            }
            info!(removed, "Import rolled back");
            Ok(removed)
        })
        .await
    }

    async fn load_owned_guest(&self, owner: &UserId, id: GuestId) -> Result<Guest> {
        let guest = self
            .stores
            .guests
            .get(id)
            .await?
            .ok_or_else(|| RsvpError::not_found("guest", id))?;
        load_owned(&self.stores, guest.wedding_id, owner).await?;
        Ok(guest)
    }
}

fn row_error(row: usize, err: &RsvpError) -> BulkRowError {
    BulkRowError {
        row,
        kind: err.kind(),
        message: err.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use chrono::Duration;
    use wedding_rsvp_core::{Rsvp, RsvpId, RsvpSource, Wedding};
    use wedding_rsvp_testing::fixtures::{new_guest, new_wedding, owner, stranger, submission};
    use wedding_rsvp_testing::{FixedClock, InMemoryStore, test_clock};

    struct Harness {
        store: InMemoryStore,
        clock: FixedClock,
        guests: GuestService,
        reconciler: CounterReconciler,
        wedding: Wedding,
    }

    async fn harness() -> Harness {
        let store = InMemoryStore::new();
        let clock = test_clock();
        let stores = store.stores();
        let reconciler =
            CounterReconciler::new(stores.clone(), std::time::Duration::ZERO, RetryPolicy::none());
        let wedding = Wedding::draft(WeddingId::new(), owner(), new_wedding("guests-here"), clock.now());
        stores.weddings.insert(wedding.clone()).await.unwrap();
        let guests = GuestService::new(stores, Arc::new(clock.clone()), Timeouts::default(), reconciler.clone());
        Harness {
            store,
            clock,
            guests,
            reconciler,
            wedding,
        }
    }

    #[tokio::test]
    async fn create_normalizes_and_counts() {
        let h = harness().await;
        let guest = h
            .guests
            .create(&owner(), h.wedding.id, new_guest(" Ana ", Some(" ANA@Example.com")))
            .await
            .unwrap();
        assert_eq!(guest.first_name, "Ana");
        assert_eq!(guest.email.as_deref(), Some("ana@example.com"));
        assert_eq!(guest.created_by, owner());

        h.reconciler.settle().await;
        assert_eq!(h.store.wedding(h.wedding.id).unwrap().counters.guest_count, 1);
    }

    #[tokio::test]
    async fn duplicate_email_is_refused() {
        let h = harness().await;
        h.guests
            .create(&owner(), h.wedding.id, new_guest("Ana", Some("ana@example.com")))
            .await
            .unwrap();
        let err = h
            .guests
            .create(&owner(), h.wedding.id, new_guest("Other", Some("ANA@example.com")))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "DUPLICATE_GUEST");

        // Guests without e-mail never collide.
        for name in ["A", "B"] {
            h.guests.create(&owner(), h.wedding.id, new_guest(name, None)).await.unwrap();
        }
    }

    #[tokio::test]
    async fn strangers_cannot_touch_the_list() {
        let h = harness().await;
        let guest = h.guests.create(&owner(), h.wedding.id, new_guest("Ana", None)).await.unwrap();
        assert_eq!(
            h.guests.create(&stranger(), h.wedding.id, new_guest("B", None)).await,
            Err(RsvpError::Unauthorized)
        );
        assert_eq!(h.guests.get(&stranger(), guest.id).await, Err(RsvpError::Unauthorized));
        assert_eq!(h.guests.delete(&stranger(), guest.id).await, Err(RsvpError::Unauthorized));
    }

    #[tokio::test]
    async fn bulk_import_reports_bad_rows_and_keeps_the_rest() {
        let h = harness().await;
        let mut rows: Vec<NewGuest> = (0..10)
            .map(|i| new_guest(&format!("G{i}"), Some(&format!("g{i}@example.com"))))
            .collect();
        rows[4].email = Some("not-an-email".into());
        rows[7].email = Some("G1@example.com".into());

        let report = h.guests.bulk_create(&owner(), h.wedding.id, rows).await.unwrap();
        assert_eq!(report.inserted, 8);
        assert_eq!(report.guest_ids.len(), 8);
        let rejected: Vec<(usize, &str)> = report.errors.iter().map(|e| (e.row, e.kind)).collect();
        assert_eq!(rejected, vec![(4, "VALIDATION"), (7, "DUPLICATE_GUEST")]);
        assert!(report.errors[0].message.starts_with("guests[4].email"));

        let batch = h
            .guests
            .list_import_batch(&owner(), h.wedding.id, report.import_batch_id)
            .await
            .unwrap();
        assert_eq!(batch.len(), 8);
        assert!(batch.iter().all(|g| g.import_batch_id == Some(report.import_batch_id)));
    }

    #[tokio::test]
    async fn empty_import_is_rejected() {
        let h = harness().await;
        let err = h.guests.bulk_create(&owner(), h.wedding.id, vec![]).await.unwrap_err();
        assert_eq!(err.kind(), "VALIDATION");
    }

    #[tokio::test]
    async fn rollback_removes_only_the_batch() {
        let h = harness().await;
        let keep = h.guests.create(&owner(), h.wedding.id, new_guest("Keep", None)).await.unwrap();
        let rows = vec![new_guest("A", None), new_guest("B", None)];
        let report = h.guests.bulk_create(&owner(), h.wedding.id, rows).await.unwrap();

        let removed = h
            .guests
            .rollback_import_batch(&owner(), h.wedding.id, report.import_batch_id)
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert!(h.store.guest(keep.id).is_some());

        h.reconciler.settle().await;
        assert_eq!(h.store.wedding(h.wedding.id).unwrap().counters.guest_count, 1);
    }

    #[tokio::test]
    async fn update_bumps_timestamp_and_validates() {
        let h = harness().await;
        let guest = h.guests.create(&owner(), h.wedding.id, new_guest("Ana", None)).await.unwrap();
        h.clock.advance(Duration::minutes(3));

        let patch = GuestPatch {
            last_name: Some("Smith".into()),
            ..GuestPatch::default()
        };
        let updated = h.guests.update(&owner(), guest.id, patch).await.unwrap();
        assert_eq!(updated.last_name, "Smith");
        assert_eq!(updated.updated_at, h.clock.now());

        let bad = GuestPatch {
            max_plus_ones: Some(9),
            ..GuestPatch::default()
        };
        assert_eq!(h.guests.update(&owner(), guest.id, bad).await.unwrap_err().kind(), "VALIDATION");
    }

    #[tokio::test]
    async fn deleting_a_guest_unlinks_its_rsvp() {
        let h = harness().await;
        let guest = h.guests.create(&owner(), h.wedding.id, new_guest("Ana", None)).await.unwrap();
        let rsvp = Rsvp::from_submission(
            RsvpId::new(),
            h.wedding.id,
            Some(guest.id),
            submission("Ana", None, 0),
            RsvpSource::Web,
            h.clock.now(),
        );
        h.store.put_rsvp(rsvp.clone());

        h.guests.delete(&owner(), guest.id).await.unwrap();
        assert!(h.store.guest(guest.id).is_none());
        assert_eq!(h.store.rsvp(rsvp.id).unwrap().guest_id, None);
        assert_eq!(h.guests.get(&owner(), guest.id).await.unwrap_err().kind(), "NOT_FOUND");
    }
}
