//! Storage traits.
//!
//! Each document collection has its own trait. Implementations enforce the
//! uniqueness rules themselves (unique and partial-unique indexes in Postgres,
//! explicit checks in the in-memory store) and report violations with the
//! matching [`RsvpError`](crate::RsvpError) kind, never as `Storage`.
//!
//! # Dyn compatibility
//!
//! Methods return [`StoreFuture`] (a boxed future) rather than using
//! `async fn`, so stores can be shared as `Arc<dyn WeddingStore>` across
//! services and handlers. Arguments are owned so the futures only borrow
//! `self`.
//!
//! # Implementations
//!
//! - `PostgresStore` (in `wedding-rsvp-postgres`): production
//! - `InMemoryStore` (in `wedding-rsvp-testing`): fast, deterministic tests

use crate::error::Result;
use crate::guest::{Guest, GuestFilter, RsvpLink};
use crate::id::{GuestId, ImportBatchId, RsvpId, UserId, WeddingId};
use crate::paging::{Page, PageRequest};
use crate::rsvp::{Rsvp, RsvpFilter};
use crate::slug::Slug;
use crate::wedding::{CounterSnapshot, Wedding, WeddingFilter, WeddingStatus};
use chrono::{DateTime, NaiveDate, Utc};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Boxed future returned by every store method.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Authoritative RSVP totals for one wedding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RsvpTally {
    /// Number of RSVPs.
    pub rsvp_count: u64,
    /// Sum of `attendance_count` over attending RSVPs.
    pub total_attending: u64,
}

/// Wedding documents.
pub trait WeddingStore: Send + Sync {
    /// Insert a new wedding.
    ///
    /// Fails with `SlugTaken` if another wedding uses the slug.
    fn insert(&self, wedding: Wedding) -> StoreFuture<'_, ()>;

    /// Load a wedding by id.
    fn get(&self, id: WeddingId) -> StoreFuture<'_, Option<Wedding>>;

    /// Load a wedding by slug, whatever its status.
    fn get_by_slug(&self, slug: Slug) -> StoreFuture<'_, Option<Wedding>>;

    /// Weddings owned by `owner`, newest first.
    fn list_for_user(
        &self,
        owner: UserId,
        filter: WeddingFilter,
        page: PageRequest,
    ) -> StoreFuture<'_, Page<Wedding>>;

    /// Published public weddings, by event date ascending. `filter.status` is ignored.
    fn list_public(&self, filter: WeddingFilter, page: PageRequest) -> StoreFuture<'_, Page<Wedding>>;

    /// Overwrite the owner-editable fields and `updated_at`.
    ///
    /// Status, counters, `published_at` and view tracking are left as stored.
    /// Returns `false` if the wedding no longer exists. Fails with `SlugTaken`
    /// on a slug collision.
    fn update_content(&self, wedding: Wedding) -> StoreFuture<'_, bool>;

    /// Set the lifecycle state.
    ///
    /// Moving to `published` sets `published_at` to `at` only if it was unset.
    /// Returns the stored document, or `None` if it no longer exists.
    fn update_status(
        &self,
        id: WeddingId,
        status: WeddingStatus,
        at: DateTime<Utc>,
    ) -> StoreFuture<'_, Option<Wedding>>;

    /// Delete the wedding with its guests and RSVPs. Returns `false` if absent.
    fn delete(&self, id: WeddingId) -> StoreFuture<'_, bool>;

    /// `view_count += 1` and `last_viewed_at = at`.
    fn increment_views(&self, id: WeddingId, at: DateTime<Utc>) -> StoreFuture<'_, ()>;

    /// Overwrite the reconciled counters. Returns `false` if the wedding is gone.
    fn set_counters(&self, id: WeddingId, counters: CounterSnapshot) -> StoreFuture<'_, bool>;
}

/// Guest documents.
pub trait GuestStore: Send + Sync {
    /// Insert a guest. Fails with `DuplicateGuest` on an e-mail collision.
    fn insert(&self, guest: Guest) -> StoreFuture<'_, ()>;

    /// Load a guest by id.
    fn get(&self, id: GuestId) -> StoreFuture<'_, Option<Guest>>;

    /// Overwrite the owner-editable fields and `updated_at`; the RSVP link is
    /// left as stored. Fails with `DuplicateGuest` on an e-mail collision.
    fn update_profile(&self, guest: Guest) -> StoreFuture<'_, bool>;

    /// Delete a guest. Returns `false` if absent.
    fn delete(&self, id: GuestId) -> StoreFuture<'_, bool>;

    /// Guests of a wedding in creation order.
    fn list_by_wedding(
        &self,
        wedding_id: WeddingId,
        filter: GuestFilter,
        page: PageRequest,
    ) -> StoreFuture<'_, Page<Guest>>;

    /// Guests created by one bulk import, in creation order.
    fn list_by_import_batch(
        &self,
        wedding_id: WeddingId,
        batch: ImportBatchId,
    ) -> StoreFuture<'_, Vec<Guest>>;

    /// Delete the guests created by one bulk import. Returns the number removed.
    fn delete_by_import_batch(
        &self,
        wedding_id: WeddingId,
        batch: ImportBatchId,
    ) -> StoreFuture<'_, u64>;

    /// Find a guest of the wedding by normalized e-mail.
    fn find_by_email(&self, wedding_id: WeddingId, email: String) -> StoreFuture<'_, Option<Guest>>;

    /// Number of guests of the wedding.
    fn count_by_wedding(&self, wedding_id: WeddingId) -> StoreFuture<'_, u64>;

    /// Set or clear the RSVP mirror on a guest. Returns `false` if absent.
    fn set_rsvp_link(&self, id: GuestId, link: Option<RsvpLink>) -> StoreFuture<'_, bool>;
}

/// RSVP documents.
pub trait RsvpStore: Send + Sync {
    /// Insert a response.
    ///
    /// Fails with `DuplicateRsvp` if the wedding already has a response with the
    /// same e-mail, or the guest already has a response.
    fn insert(&self, rsvp: Rsvp) -> StoreFuture<'_, ()>;

    /// Load a response by id.
    fn get(&self, id: RsvpId) -> StoreFuture<'_, Option<Rsvp>>;

    /// Overwrite a response's answers (last writer wins). The stored guest
    /// link is kept as is, so an edit cannot re-link a guest that was unlinked
    /// meanwhile. Returns the stored document, or `None` if absent.
    fn replace(&self, rsvp: Rsvp) -> StoreFuture<'_, Option<Rsvp>>;

    /// Delete a response. Returns `false` if absent.
    fn delete(&self, id: RsvpId) -> StoreFuture<'_, bool>;

    /// Find the wedding's response with this normalized e-mail.
    fn find_by_email(&self, wedding_id: WeddingId, email: String) -> StoreFuture<'_, Option<Rsvp>>;

    /// Find the response linked to a guest.
    fn find_by_guest(&self, guest_id: GuestId) -> StoreFuture<'_, Option<Rsvp>>;

    /// Responses of a wedding, newest submission first.
    fn list_by_wedding(
        &self,
        wedding_id: WeddingId,
        filter: RsvpFilter,
        page: PageRequest,
    ) -> StoreFuture<'_, Page<Rsvp>>;

    /// Every matching response of a wedding, newest submission first.
    fn export(&self, wedding_id: WeddingId, filter: RsvpFilter) -> StoreFuture<'_, Vec<Rsvp>>;

    /// Count responses and attending headcount straight from the collection.
    fn tally(&self, wedding_id: WeddingId) -> StoreFuture<'_, RsvpTally>;

    /// Unlink every response from a guest. Returns the number changed.
    fn clear_guest(&self, guest_id: GuestId) -> StoreFuture<'_, u64>;
}

/// Whole-database housekeeping used by readiness checks and the orphan sweeper.
pub trait MaintenanceStore: Send + Sync {
    /// Check the backend is reachable.
    fn ping(&self) -> StoreFuture<'_, ()>;

    /// Delete RSVPs whose wedding no longer exists.
    fn delete_orphaned_rsvps(&self) -> StoreFuture<'_, u64>;

    /// Delete guests whose wedding no longer exists.
    fn delete_orphaned_guests(&self) -> StoreFuture<'_, u64>;

    /// Clear guest back-references to RSVPs that no longer exist.
    fn clear_dangling_guest_links(&self) -> StoreFuture<'_, u64>;

    /// Clear RSVP references to guests that no longer exist.
    fn clear_dangling_rsvp_links(&self) -> StoreFuture<'_, u64>;

    /// Point guests back at the RSVP that references them where the
    /// back-reference is missing or stale.
    fn repair_guest_backrefs(&self) -> StoreFuture<'_, u64>;

    /// Move published weddings whose event date is before `today` to
    /// `expired`, stamping `updated_at` with `at`. Weddings without an event
    /// are left alone. Returns the number changed.
    fn expire_past_weddings(&self, today: NaiveDate, at: DateTime<Utc>) -> StoreFuture<'_, u64>;
}

/// The four stores, shared behind trait objects.
#[derive(Clone)]
pub struct Stores {
    /// Wedding documents.
    pub weddings: Arc<dyn WeddingStore>,
    /// Guest documents.
    pub guests: Arc<dyn GuestStore>,
    /// RSVP documents.
    pub rsvps: Arc<dyn RsvpStore>,
    /// Housekeeping.
    pub maintenance: Arc<dyn MaintenanceStore>,
}

impl Stores {
    /// Share one backend that implements every store.
    #[must_use]
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: WeddingStore + GuestStore + RsvpStore + MaintenanceStore + 'static,
    {
        let weddings: Arc<dyn WeddingStore> = backend.clone();
        let guests: Arc<dyn GuestStore> = backend.clone();
        let rsvps: Arc<dyn RsvpStore> = backend.clone();
        let maintenance: Arc<dyn MaintenanceStore> = backend;
        Self {
            weddings,
            guests,
            rsvps,
            maintenance,
        }
    }
}

impl std::fmt::Debug for Stores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stores").finish_non_exhaustive()
    }
}
