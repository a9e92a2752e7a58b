//! In-memory store for fast, deterministic tests.
//!
//! All four store traits are implemented over one set of `HashMap`s behind a
//! single `RwLock`, so every operation is atomic with respect to the others.
//! Uniqueness rules mirror the Postgres indexes:
//!
//! - `weddings.slug` is unique
//! - `guests.(wedding_id, email)` is unique when the e-mail is present
//! - `rsvps.(wedding_id, email)` is unique when the e-mail is present
//! - `rsvps.guest_id` is unique when present

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use wedding_rsvp_core::guest::RsvpLink;
use wedding_rsvp_core::store::RsvpTally;
use wedding_rsvp_core::{
    CounterSnapshot, Guest, GuestFilter, GuestId, GuestStore, ImportBatchId, MaintenanceStore,
    Page, PageRequest, Result, Rsvp, RsvpError, RsvpFilter, RsvpId, RsvpStore, Slug, StoreFuture,
    Stores, UserId, Wedding, WeddingFilter, WeddingId, WeddingStatus, WeddingStore,
};

#[derive(Debug, Default)]
struct Collections {
    weddings: HashMap<WeddingId, Wedding>,
    guests: HashMap<GuestId, Guest>,
    rsvps: HashMap<RsvpId, Rsvp>,
}

/// `HashMap`-backed implementation of every store trait.
#[derive(Clone, Debug, Default)]
pub struct InMemoryStore {
    data: Arc<RwLock<Collections>>,
    counter_failures: Arc<AtomicU32>,
    counter_delay: Arc<Mutex<Option<Duration>>>,
}

fn ready<'a, T: Send + 'a>(result: Result<T>) -> StoreFuture<'a, T> {
    Box::pin(std::future::ready(result))
}

impl InMemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Share this store as the four trait objects services expect.
    #[must_use]
    pub fn stores(&self) -> Stores {
        Stores::from_backend(Arc::new(self.clone()))
    }

    /// Make the next `n` counter writes fail with a storage error.
    pub fn fail_next_counter_writes(&self, n: u32) {
        self.counter_failures.store(n, Ordering::SeqCst);
    }

    /// Hold the next counter write for `by` before applying it. The values
    /// written are the ones passed in, so a held write lands stale.
    pub fn delay_next_counter_write(&self, by: Duration) {
        *self.counter_delay.lock().unwrap() = Some(by);
    }

    fn write_counters(&self, id: WeddingId, counters: CounterSnapshot) -> bool {
        let mut data = self.data.write().unwrap();
        let Some(w) = data.weddings.get_mut(&id) else {
            return false;
        };
        w.counters.rsvp_count = counters.rsvp_count;
        w.counters.guest_count = counters.guest_count;
        w.counters.total_attending = counters.total_attending;
        true
    }

    /// Snapshot of a wedding document, bypassing the traits.
    #[must_use]
    pub fn wedding(&self, id: WeddingId) -> Option<Wedding> {
        self.data.read().unwrap().weddings.get(&id).cloned()
    }

    /// Snapshot of a guest document.
    #[must_use]
    pub fn guest(&self, id: GuestId) -> Option<Guest> {
        self.data.read().unwrap().guests.get(&id).cloned()
    }

    /// Snapshot of an RSVP document.
    #[must_use]
    pub fn rsvp(&self, id: RsvpId) -> Option<Rsvp> {
        self.data.read().unwrap().rsvps.get(&id).cloned()
    }

    /// Overwrite or insert a document without any checks, for arranging
    /// inconsistent states in tests.
    pub fn put_rsvp(&self, rsvp: Rsvp) {
        self.data.write().unwrap().rsvps.insert(rsvp.id, rsvp);
    }

    /// See [`put_rsvp`](Self::put_rsvp).
    pub fn put_guest(&self, guest: Guest) {
        self.data.write().unwrap().guests.insert(guest.id, guest);
    }

    /// Remove a wedding document without cascading, leaving orphans behind.
    pub fn remove_wedding_only(&self, id: WeddingId) {
        self.data.write().unwrap().weddings.remove(&id);
    }

    /// Number of RSVP documents for a wedding.
    #[must_use]
    pub fn rsvp_count(&self, wedding_id: WeddingId) -> usize {
        let data = self.data.read().unwrap();
        data.rsvps.values().filter(|r| r.wedding_id == wedding_id).count()
    }

    /// Number of guest documents for a wedding.
    #[must_use]
    pub fn guest_count(&self, wedding_id: WeddingId) -> usize {
        let data = self.data.read().unwrap();
        data.guests.values().filter(|g| g.wedding_id == wedding_id).count()
    }
}

fn slug_taken(data: &Collections, slug: &Slug, except: Option<WeddingId>) -> bool {
    data.weddings
        .values()
        .any(|w| &w.slug == slug && Some(w.id) != except)
}

fn guest_email_taken(data: &Collections, guest: &Guest) -> bool {
    let Some(email) = guest.email.as_deref() else {
        return false;
    };
    data.guests.values().any(|g| {
        g.id != guest.id && g.wedding_id == guest.wedding_id && g.email.as_deref() == Some(email)
    })
}

fn usize_to_u64(n: usize) -> u64 {
    u64::try_from(n).unwrap_or(u64::MAX)
}

impl WeddingStore for InMemoryStore {
    fn insert(&self, wedding: Wedding) -> StoreFuture<'_, ()> {
        let mut data = self.data.write().unwrap();
        if slug_taken(&data, &wedding.slug, None) {
            return ready(Err(RsvpError::SlugTaken(wedding.slug.to_string())));
        }
        data.weddings.insert(wedding.id, wedding);
        ready(Ok(()))
    }

    fn get(&self, id: WeddingId) -> StoreFuture<'_, Option<Wedding>> {
        ready(Ok(self.wedding(id)))
    }

    fn get_by_slug(&self, slug: Slug) -> StoreFuture<'_, Option<Wedding>> {
        let data = self.data.read().unwrap();
        ready(Ok(data.weddings.values().find(|w| w.slug == slug).cloned()))
    }

    fn list_for_user(
        &self,
        owner: UserId,
        filter: WeddingFilter,
        page: PageRequest,
    ) -> StoreFuture<'_, Page<Wedding>> {
        let data = self.data.read().unwrap();
        let mut items: Vec<Wedding> = data
            .weddings
            .values()
            .filter(|w| w.user_id == owner && filter.matches(w))
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        ready(Ok(page.slice(items)))
    }

    fn list_public(&self, filter: WeddingFilter, page: PageRequest) -> StoreFuture<'_, Page<Wedding>> {
        let filter = WeddingFilter {
            status: None,
            ..filter
        };
        let data = self.data.read().unwrap();
        let mut items: Vec<Wedding> = data
            .weddings
            .values()
            .filter(|w| w.is_publicly_visible() && filter.matches(w))
            .cloned()
            .collect();
        // Weddings without an event date sort last.
        items.sort_by(|a, b| {
            let key = |w: &Wedding| (w.event.as_ref().map(|e| e.date).is_none(), w.event.as_ref().map(|e| e.date));
            key(a).cmp(&key(b)).then(a.id.cmp(&b.id))
        });
        ready(Ok(page.slice(items)))
    }

    fn update_content(&self, wedding: Wedding) -> StoreFuture<'_, bool> {
        let mut data = self.data.write().unwrap();
        if slug_taken(&data, &wedding.slug, Some(wedding.id)) {
            return ready(Err(RsvpError::SlugTaken(wedding.slug.to_string())));
        }
        let Some(stored) = data.weddings.get_mut(&wedding.id) else {
            return ready(Ok(false));
        };
        stored.title = wedding.title;
        stored.slug = wedding.slug;
        stored.couple = wedding.couple;
        stored.event = wedding.event;
        stored.theme = wedding.theme;
        stored.rsvp = wedding.rsvp;
        stored.is_public = wedding.is_public;
        stored.updated_at = wedding.updated_at;
        ready(Ok(true))
    }

    fn update_status(
        &self,
        id: WeddingId,
        status: WeddingStatus,
        at: DateTime<Utc>,
    ) -> StoreFuture<'_, Option<Wedding>> {
        let mut data = self.data.write().unwrap();
        let updated = data.weddings.get_mut(&id).map(|w| {
            w.status = status;
            w.updated_at = at;
            if status == WeddingStatus::Published && w.published_at.is_none() {
                w.published_at = Some(at);
            }
            w.clone()
        });
        ready(Ok(updated))
    }

    fn delete(&self, id: WeddingId) -> StoreFuture<'_, bool> {
        let mut data = self.data.write().unwrap();
        data.rsvps.retain(|_, r| r.wedding_id != id);
        data.guests.retain(|_, g| g.wedding_id != id);
        ready(Ok(data.weddings.remove(&id).is_some()))
    }

    fn increment_views(&self, id: WeddingId, at: DateTime<Utc>) -> StoreFuture<'_, ()> {
        let mut data = self.data.write().unwrap();
        if let Some(w) = data.weddings.get_mut(&id) {
            w.counters.view_count += 1;
            w.last_viewed_at = Some(at);
        }
        ready(Ok(()))
    }

    fn set_counters(&self, id: WeddingId, counters: CounterSnapshot) -> StoreFuture<'_, bool> {
        let injected = self
            .counter_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return ready(Err(RsvpError::storage("update counters", "injected failure")));
        }

        if let Some(delay) = self.counter_delay.lock().unwrap().take() {
            return Box::pin(async move {
                tokio::time::sleep(delay).await;
                Ok(self.write_counters(id, counters))
            });
        }
        ready(Ok(self.write_counters(id, counters)))
    }
}

impl GuestStore for InMemoryStore {
    fn insert(&self, guest: Guest) -> StoreFuture<'_, ()> {
        let mut data = self.data.write().unwrap();
        if guest_email_taken(&data, &guest) {
            return ready(Err(RsvpError::DuplicateGuest(guest.email.unwrap_or_default())));
        }
        data.guests.insert(guest.id, guest);
        ready(Ok(()))
    }

    fn get(&self, id: GuestId) -> StoreFuture<'_, Option<Guest>> {
        ready(Ok(self.guest(id)))
    }

    fn update_profile(&self, guest: Guest) -> StoreFuture<'_, bool> {
        let mut data = self.data.write().unwrap();
        if guest_email_taken(&data, &guest) {
            return ready(Err(RsvpError::DuplicateGuest(guest.email.unwrap_or_default())));
        }
        let Some(stored) = data.guests.get_mut(&guest.id) else {
            return ready(Ok(false));
        };
        stored.first_name = guest.first_name;
        stored.last_name = guest.last_name;
        stored.email = guest.email;
        stored.phone = guest.phone;
        stored.side = guest.side;
        stored.plus_one_allowed = guest.plus_one_allowed;
        stored.max_plus_ones = guest.max_plus_ones;
        stored.invitation_status = guest.invitation_status;
        stored.updated_at = guest.updated_at;
        ready(Ok(true))
    }

    fn delete(&self, id: GuestId) -> StoreFuture<'_, bool> {
        let mut data = self.data.write().unwrap();
        ready(Ok(data.guests.remove(&id).is_some()))
    }

    fn list_by_wedding(
        &self,
        wedding_id: WeddingId,
        filter: GuestFilter,
        page: PageRequest,
    ) -> StoreFuture<'_, Page<Guest>> {
        let data = self.data.read().unwrap();
        let mut items: Vec<Guest> = data
            .guests
            .values()
            .filter(|g| g.wedding_id == wedding_id && filter.matches(g))
            .cloned()
            .collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        ready(Ok(page.slice(items)))
    }

    fn list_by_import_batch(
        &self,
        wedding_id: WeddingId,
        batch: ImportBatchId,
    ) -> StoreFuture<'_, Vec<Guest>> {
        let data = self.data.read().unwrap();
        let mut items: Vec<Guest> = data
            .guests
            .values()
            .filter(|g| g.wedding_id == wedding_id && g.import_batch_id == Some(batch))
            .cloned()
            .collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        ready(Ok(items))
    }

    fn delete_by_import_batch(
        &self,
        wedding_id: WeddingId,
        batch: ImportBatchId,
    ) -> StoreFuture<'_, u64> {
        let mut data = self.data.write().unwrap();
        let before = data.guests.len();
        data.guests
            .retain(|_, g| !(g.wedding_id == wedding_id && g.import_batch_id == Some(batch)));
        ready(Ok(usize_to_u64(before - data.guests.len())))
    }

    fn find_by_email(&self, wedding_id: WeddingId, email: String) -> StoreFuture<'_, Option<Guest>> {
        let data = self.data.read().unwrap();
        let found = data
            .guests
            .values()
            .find(|g| g.wedding_id == wedding_id && g.email.as_deref() == Some(email.as_str()))
            .cloned();
        ready(Ok(found))
    }

    fn count_by_wedding(&self, wedding_id: WeddingId) -> StoreFuture<'_, u64> {
        ready(Ok(usize_to_u64(self.guest_count(wedding_id))))
    }

    fn set_rsvp_link(&self, id: GuestId, link: Option<RsvpLink>) -> StoreFuture<'_, bool> {
        let mut data = self.data.write().unwrap();
        let Some(guest) = data.guests.get_mut(&id) else {
            return ready(Ok(false));
        };
        guest.set_rsvp_link(link);
        ready(Ok(true))
    }
}

impl RsvpStore for InMemoryStore {
    fn insert(&self, rsvp: Rsvp) -> StoreFuture<'_, ()> {
        let mut data = self.data.write().unwrap();
        if let Some(email) = rsvp.email.as_deref() {
            let taken = data
                .rsvps
                .values()
                .any(|r| r.wedding_id == rsvp.wedding_id && r.email.as_deref() == Some(email));
            if taken {
                return ready(Err(RsvpError::DuplicateRsvp("email".into())));
            }
        }
        if let Some(guest_id) = rsvp.guest_id {
            if data.rsvps.values().any(|r| r.guest_id == Some(guest_id)) {
                return ready(Err(RsvpError::DuplicateRsvp("guest".into())));
            }
        }
        data.rsvps.insert(rsvp.id, rsvp);
        ready(Ok(()))
    }

    fn get(&self, id: RsvpId) -> StoreFuture<'_, Option<Rsvp>> {
        ready(Ok(self.rsvp(id)))
    }

    fn replace(&self, mut rsvp: Rsvp) -> StoreFuture<'_, Option<Rsvp>> {
        let mut data = self.data.write().unwrap();
        let Some(stored) = data.rsvps.get_mut(&rsvp.id) else {
            return ready(Ok(None));
        };
        rsvp.guest_id = stored.guest_id;
        *stored = rsvp.clone();
        ready(Ok(Some(rsvp)))
    }

    fn delete(&self, id: RsvpId) -> StoreFuture<'_, bool> {
        let mut data = self.data.write().unwrap();
        ready(Ok(data.rsvps.remove(&id).is_some()))
    }

    fn find_by_email(&self, wedding_id: WeddingId, email: String) -> StoreFuture<'_, Option<Rsvp>> {
        let data = self.data.read().unwrap();
        let found = data
            .rsvps
            .values()
            .find(|r| r.wedding_id == wedding_id && r.email.as_deref() == Some(email.as_str()))
            .cloned();
        ready(Ok(found))
    }

    fn find_by_guest(&self, guest_id: GuestId) -> StoreFuture<'_, Option<Rsvp>> {
        let data = self.data.read().unwrap();
        let found = data
            .rsvps
            .values()
            .find(|r| r.guest_id == Some(guest_id))
            .cloned();
        ready(Ok(found))
    }

    fn list_by_wedding(
        &self,
        wedding_id: WeddingId,
        filter: RsvpFilter,
        page: PageRequest,
    ) -> StoreFuture<'_, Page<Rsvp>> {
        let data = self.data.read().unwrap();
        ready(Ok(page.slice(sorted_rsvps(&data, wedding_id, &filter))))
    }

    fn export(&self, wedding_id: WeddingId, filter: RsvpFilter) -> StoreFuture<'_, Vec<Rsvp>> {
        let data = self.data.read().unwrap();
        ready(Ok(sorted_rsvps(&data, wedding_id, &filter)))
    }

    fn tally(&self, wedding_id: WeddingId) -> StoreFuture<'_, RsvpTally> {
        let data = self.data.read().unwrap();
        let tally = data
            .rsvps
            .values()
            .filter(|r| r.wedding_id == wedding_id)
            .fold(RsvpTally::default(), |mut t, r| {
                t.rsvp_count += 1;
                t.total_attending += u64::from(r.attending_headcount());
                t
            });
        ready(Ok(tally))
    }

    fn clear_guest(&self, guest_id: GuestId) -> StoreFuture<'_, u64> {
        let mut data = self.data.write().unwrap();
        let mut changed = 0;
        for rsvp in data.rsvps.values_mut().filter(|r| r.guest_id == Some(guest_id)) {
            rsvp.guest_id = None;
            changed += 1;
        }
        ready(Ok(changed))
    }
}

fn sorted_rsvps(data: &Collections, wedding_id: WeddingId, filter: &RsvpFilter) -> Vec<Rsvp> {
    let mut items: Vec<Rsvp> = data
        .rsvps
        .values()
        .filter(|r| r.wedding_id == wedding_id && filter.matches(r))
        .cloned()
        .collect();
    items.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at).then(b.id.cmp(&a.id)));
    items
}

impl MaintenanceStore for InMemoryStore {
    fn ping(&self) -> StoreFuture<'_, ()> {
        ready(Ok(()))
    }

    fn delete_orphaned_rsvps(&self) -> StoreFuture<'_, u64> {
        let mut guard = self.data.write().unwrap();
        let data = &mut *guard;
        let before = data.rsvps.len();
        data.rsvps
            .retain(|_, r| data.weddings.contains_key(&r.wedding_id));
        ready(Ok(usize_to_u64(before - data.rsvps.len())))
    }

    fn delete_orphaned_guests(&self) -> StoreFuture<'_, u64> {
        let mut guard = self.data.write().unwrap();
        let data = &mut *guard;
        let before = data.guests.len();
        data.guests
            .retain(|_, g| data.weddings.contains_key(&g.wedding_id));
        ready(Ok(usize_to_u64(before - data.guests.len())))
    }

    fn clear_dangling_guest_links(&self) -> StoreFuture<'_, u64> {
        let mut guard = self.data.write().unwrap();
        let data = &mut *guard;
        let mut changed = 0;
        for guest in data.guests.values_mut() {
            if guest.rsvp_id.is_some_and(|id| !data.rsvps.contains_key(&id)) {
                guest.set_rsvp_link(None);
                changed += 1;
            }
        }
        ready(Ok(changed))
    }

    fn clear_dangling_rsvp_links(&self) -> StoreFuture<'_, u64> {
        let mut guard = self.data.write().unwrap();
        let data = &mut *guard;
        let mut changed = 0;
        for rsvp in data.rsvps.values_mut() {
            if rsvp.guest_id.is_some_and(|id| !data.guests.contains_key(&id)) {
                rsvp.guest_id = None;
                changed += 1;
            }
        }
        ready(Ok(changed))
    }

    fn repair_guest_backrefs(&self) -> StoreFuture<'_, u64> {
        let mut guard = self.data.write().unwrap();
        let data = &mut *guard;
        let mut changed = 0;
        for rsvp in data.rsvps.values() {
            let Some(guest) = rsvp.guest_id.and_then(|id| data.guests.get_mut(&id)) else {
                continue;
            };
            if guest.wedding_id == rsvp.wedding_id && guest.rsvp_id != Some(rsvp.id) {
                guest.set_rsvp_link(Some(RsvpLink {
                    rsvp_id: rsvp.id,
                    rsvp_status: rsvp.status,
                    rsvp_submitted_at: rsvp.submitted_at,
                }));
                changed += 1;
            }
        }
        ready(Ok(changed))
    }

    fn expire_past_weddings(&self, today: NaiveDate, at: DateTime<Utc>) -> StoreFuture<'_, u64> {
        let mut data = self.data.write().unwrap();
        let mut changed = 0;
        for wedding in data.weddings.values_mut() {
            let past = wedding.event.as_ref().is_some_and(|e| e.date < today);
            if wedding.status == WeddingStatus::Published && past {
                wedding.status = WeddingStatus::Expired;
                wedding.updated_at = at;
                changed += 1;
            }
        }
        ready(Ok(changed))
    }
}
