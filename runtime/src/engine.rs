//! The RSVP engine.
//!
//! # Public submission
//!
//! 1. Resolve the wedding by slug: `NOT_FOUND`, then `WEDDING_NOT_PUBLIC`,
//!    then `RSVP_CLOSED` (disabled or past the deadline).
//! 2. Validate against the wedding's settings (see `wedding_rsvp_core::rsvp`).
//! 3. Refuse a second response for the same e-mail (`DUPLICATE_RSVP`). This
//!    is a fast path; the store's unique index is what decides races.
//! 4. Resolve the guest: the `guest_id` from an invitation link, or else a
//!    pre-registered guest with the same e-mail and no response yet. A guest
//!    that already responded is a `DUPLICATE_RSVP`.
//! 5. Persist the response.
//! 6. Point the guest back at it.
//! 7. Queue a counter reconciliation.
//!
//! Steps 3 and 4 need the stores and run here. The rules themselves, and the
//! order of the writes in steps 5 to 7, belong to
//! [`RsvpReducer`](crate::aggregates::RsvpReducer). The response is always
//! written before the guest is patched, and on delete the guest is unlinked
//! before the response is removed. If the process dies in between, the
//! orphan sweeper repairs the link.

use crate::aggregates::{RsvpAction, RsvpEffect, RsvpEnvironment, RsvpReducer, RsvpState};
use crate::deadline::{Timeouts, with_deadline};
use crate::dispatch::{Executor, dispatch};
use crate::load_owned;
use crate::metrics::{EffectMetrics, RsvpMetrics};
use crate::reconciler::CounterReconciler;
use chrono::Duration;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use wedding_rsvp_core::environment::Clock;
use wedding_rsvp_core::{
    Guest, GuestId, Page, PageRequest, Result, Rsvp, RsvpError, RsvpFilter, RsvpId, RsvpLink,
    RsvpPatch, RsvpSource, RsvpSubmission, Slug, Stores, UserId, Wedding, WeddingId,
};

/// Accepts, updates and removes RSVP responses.
#[derive(Clone)]
pub struct RsvpEngine {
    stores: Stores,
    clock: Arc<dyn Clock>,
    timeouts: Timeouts,
    reconciler: CounterReconciler,
    env: RsvpEnvironment,
}

fn link_for(rsvp: &Rsvp) -> RsvpLink {
    RsvpLink {
        rsvp_id: rsvp.id,
        rsvp_status: rsvp.status,
        rsvp_submitted_at: rsvp.submitted_at,
    }
}

impl RsvpEngine {
    /// Create the engine. Non-owners may edit a response for `edit_window`
    /// after submitting it.
    #[must_use]
    pub fn new(
        stores: Stores,
        clock: Arc<dyn Clock>,
        timeouts: Timeouts,
        reconciler: CounterReconciler,
        edit_window: Duration,
    ) -> Self {
        Self {
            stores,
            env: RsvpEnvironment::new(clock.clone(), edit_window),
            clock,
            timeouts,
            reconciler,
        }
    }

    /// Accept a response from the public invitation page.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND`, `WEDDING_NOT_PUBLIC`, `RSVP_CLOSED`, `VALIDATION`,
    /// `TOO_MANY_PLUS_ONES`, `DUPLICATE_RSVP`, or `STORAGE`.
    #[instrument(skip_all, fields(slug = %slug))]
    pub async fn submit_public(&self, slug: &str, submission: RsvpSubmission) -> Result<Rsvp> {
        let result = with_deadline(self.timeouts.operation, "submit rsvp", async {
            let wedding = self.open_wedding(slug).await?;
            let source = submission.source.unwrap_or_default();
            self.accept(&wedding, submission, source).await
        })
        .await;

        match &result {
            Ok(rsvp) => RsvpMetrics::record_submission(rsvp.status),
            Err(e) => {
                RsvpMetrics::record_rejection(e);
                debug!(kind = e.kind(), "RSVP refused");
            }
        }
        result
    }

    /// Record a response on behalf of a guest, e.g. one who replied by phone.
    ///
    /// Skips the publication, enabled and deadline checks; every other rule
    /// applies.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND`, `UNAUTHORIZED`, `VALIDATION`, `TOO_MANY_PLUS_ONES`,
    /// `DUPLICATE_RSVP`, or `STORAGE`.
    #[instrument(skip_all, fields(user_id = %owner, wedding_id = %wedding_id))]
    pub async fn record_manual(
        &self,
        owner: &UserId,
        wedding_id: WeddingId,
        submission: RsvpSubmission,
    ) -> Result<Rsvp> {
        with_deadline(self.timeouts.operation, "record manual rsvp", async {
            let wedding = load_owned(&self.stores, wedding_id, owner).await?;
            let rsvp = self.accept(&wedding, submission, RsvpSource::Manual).await?;
            RsvpMetrics::record_submission(rsvp.status);
            Ok(rsvp)
        })
        .await
    }

    async fn open_wedding(&self, slug: &str) -> Result<Wedding> {
        let slug = Slug::parse(slug).map_err(|_| RsvpError::not_found("wedding", slug))?;
        let wedding = self
            .stores
            .weddings
            .get_by_slug(slug.clone())
            .await?
            .ok_or_else(|| RsvpError::not_found("wedding", &slug))?;

        if !wedding.is_publicly_visible() {
            return Err(RsvpError::WeddingNotPublic);
        }
        if !wedding.rsvp.enabled {
            return Err(RsvpError::RsvpClosed("responses are disabled".into()));
        }
        if !wedding.rsvp.deadline_open(self.clock.now()) {
            return Err(RsvpError::RsvpClosed("the response deadline has passed".into()));
        }
        Ok(wedding)
    }

    async fn accept(
        &self,
        wedding: &Wedding,
        submission: RsvpSubmission,
        source: RsvpSource,
    ) -> Result<Rsvp> {
        let cap = wedding.rsvp.effective_plus_one_cap();
        let mut submission = submission.normalized(&wedding.rsvp, cap)?;

        if let Some(email) = submission.email.clone() {
            if self.stores.rsvps.find_by_email(wedding.id, email).await?.is_some() {
                return Err(RsvpError::DuplicateRsvp("email".into()));
            }
        }

        let guest = self.resolve_guest(wedding, &submission).await?;
        submission.guest_id = guest.as_ref().map(|g| g.id);

        let state = RsvpState::new(RsvpId::new(), wedding.clone());
        let rsvp = self.send(state, RsvpAction::Submit { submission, source }).await?;
        info!(
            rsvp_id = %rsvp.id,
            wedding_id = %wedding.id,
            status = rsvp.status.as_str(),
            linked_guest = rsvp.guest_id.is_some(),
            "RSVP recorded"
        );
        Ok(rsvp)
    }

    /// Dispatch `action` and return the response it leaves behind.
    async fn send(&self, mut state: RsvpState, action: RsvpAction) -> Result<Rsvp> {
        dispatch(&RsvpReducer, &self.env, self, &mut state, action).await?;
        state.rsvp.ok_or_else(|| RsvpError::RsvpNotFound(state.id.to_string()))
    }

    /// The guest a submission belongs to, if any.
    async fn resolve_guest(&self, wedding: &Wedding, submission: &RsvpSubmission) -> Result<Option<Guest>> {
        if let Some(guest_id) = submission.guest_id {
            let guest = self
                .stores
                .guests
                .get(guest_id)
                .await?
                .filter(|g| g.wedding_id == wedding.id)
                .ok_or_else(|| RsvpError::not_found("guest", guest_id))?;
            if guest.rsvp_id.is_some() || self.stores.rsvps.find_by_guest(guest_id).await?.is_some() {
                return Err(RsvpError::DuplicateRsvp("guest".into()));
            }
            return Ok(Some(guest));
        }

        let Some(email) = submission.email.clone() else {
            return Ok(None);
        };
        let Some(guest) = self.stores.guests.find_by_email(wedding.id, email).await? else {
            return Ok(None);
        };
        if guest.rsvp_id.is_some() || self.stores.rsvps.find_by_guest(guest.id).await?.is_some() {
            // Already answered under another address; keep this response unlinked.
            return Ok(None);
        }
        Ok(Some(guest))
    }

    /// Best effort: the sweeper repairs links this fails to write.
    async fn mirror_onto_guest(&self, guest_id: GuestId, link: Option<RsvpLink>) {
        match self.stores.guests.set_rsvp_link(guest_id, link).await {
            Ok(true) => {}
            Ok(false) => debug!(guest_id = %guest_id, "Linked guest no longer exists"),
            Err(e) => warn!(guest_id = %guest_id, error = %e, "Failed to update guest RSVP link"),
        }
    }

    /// Update a response.
    ///
    /// The wedding owner may always edit. Anyone else may edit within the
    /// edit window after submission.
    ///
    /// # Errors
    ///
    /// `RSVP_NOT_FOUND`, `RSVP_CANNOT_MODIFY`, `VALIDATION`,
    /// `TOO_MANY_PLUS_ONES`, or `STORAGE`.
    #[instrument(skip_all, fields(rsvp_id = %id, owner_request = caller.is_some()))]
    pub async fn update(&self, caller: Option<&UserId>, id: RsvpId, patch: RsvpPatch) -> Result<Rsvp> {
        with_deadline(self.timeouts.operation, "update rsvp", async {
            let (rsvp, wedding) = self.load(id).await?;
            let action = RsvpAction::Update {
                caller: caller.cloned(),
                patch,
            };
            let rsvp = self.send(RsvpState::loaded(rsvp, wedding), action).await?;
            debug!("RSVP updated");
            Ok(rsvp)
        })
        .await
    }

    /// Delete a response. Owner only.
    ///
    /// # Errors
    ///
    /// `RSVP_NOT_FOUND`, `UNAUTHORIZED`, or `STORAGE`.
    #[instrument(skip_all, fields(user_id = %owner, rsvp_id = %id))]
    pub async fn delete(&self, owner: &UserId, id: RsvpId) -> Result<()> {
        with_deadline(self.timeouts.operation, "delete rsvp", async {
            let (rsvp, wedding) = self.load(id).await?;
            let mut state = RsvpState::loaded(rsvp, wedding);
            let action = RsvpAction::Delete { caller: owner.clone() };
            dispatch(&RsvpReducer, &self.env, self, &mut state, action).await?;
            info!("RSVP deleted");
            Ok(())
        })
        .await
    }

    /// Read one response of a wedding the caller owns.
    ///
    /// # Errors
    ///
    /// `RSVP_NOT_FOUND`, `UNAUTHORIZED`, or `STORAGE`.
    pub async fn get(&self, owner: &UserId, id: RsvpId) -> Result<Rsvp> {
        with_deadline(self.timeouts.operation, "get rsvp", async {
            let (rsvp, wedding) = self.load(id).await?;
            if !wedding.is_owned_by(owner) {
                return Err(RsvpError::Unauthorized);
            }
            Ok(rsvp)
        })
        .await
    }

    /// A page of a wedding's responses, newest first.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND`, `UNAUTHORIZED`, or `STORAGE`.
    pub async fn list(
        &self,
        owner: &UserId,
        wedding_id: WeddingId,
        filter: RsvpFilter,
        page: PageRequest,
    ) -> Result<Page<Rsvp>> {
        with_deadline(self.timeouts.operation, "list rsvps", async {
            load_owned(&self.stores, wedding_id, owner).await?;
            self.stores.rsvps.list_by_wedding(wedding_id, filter, page).await
        })
        .await
    }

    /// Every matching response of a wedding, newest first.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND`, `UNAUTHORIZED`, or `STORAGE`.
    pub async fn export(&self, owner: &UserId, wedding_id: WeddingId, filter: RsvpFilter) -> Result<Vec<Rsvp>> {
        with_deadline(self.timeouts.long_operation, "export rsvps", async {
            load_owned(&self.stores, wedding_id, owner).await?;
            self.stores.rsvps.export(wedding_id, filter).await
        })
        .await
    }

    /// A response and its wedding. A response whose wedding is gone is
    /// treated as gone too.
    async fn load(&self, id: RsvpId) -> Result<(Rsvp, Wedding)> {
        let not_found = || RsvpError::RsvpNotFound(id.to_string());
        let rsvp = self.stores.rsvps.get(id).await?.ok_or_else(not_found)?;
        let wedding = self
            .stores
            .weddings
            .get(rsvp.wedding_id)
            .await?
            .ok_or_else(not_found)?;
        Ok((rsvp, wedding))
    }
}

impl Executor<RsvpState, RsvpEffect> for RsvpEngine {
    fn execute<'a>(
        &'a self,
        state: &'a mut RsvpState,
        effect: RsvpEffect,
    ) -> impl Future<Output = Result<()>> + Send + 'a {
        async move {
            let name = effect.name();
            match effect {
                RsvpEffect::Insert(rsvp) => self.stores.rsvps.insert(rsvp).await?,
                RsvpEffect::Replace(rsvp) => {
                    // The stored guest link wins over the copy that was edited.
                    let stored = self
                        .stores
                        .rsvps
                        .replace(rsvp)
                        .await?
                        .ok_or_else(|| RsvpError::RsvpNotFound(state.id.to_string()))?;
                    state.rsvp = Some(stored);
                }
                RsvpEffect::MirrorOntoGuest => {
                    let linked = state.rsvp.as_ref().and_then(|r| r.guest_id.map(|g| (g, link_for(r))));
                    if let Some((guest_id, link)) = linked {
                        self.mirror_onto_guest(guest_id, Some(link)).await;
                    }
                }
                RsvpEffect::UnlinkGuest(guest_id) => {
                    let points_here = self
                        .stores
                        .guests
                        .get(guest_id)
                        .await?
                        .is_some_and(|g| g.rsvp_id == Some(state.id));
                    if points_here {
                        self.stores.guests.set_rsvp_link(guest_id, None).await?;
                    }
                }
                RsvpEffect::Delete(id) => {
                    if !self.stores.rsvps.delete(id).await? {
                        return Err(RsvpError::RsvpNotFound(id.to_string()));
                    }
                }
                RsvpEffect::Reconcile(wedding_id) => {
                    self.reconciler.schedule(wedding_id);
                }
            }
            EffectMetrics::record("rsvp", name);
            Ok(())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use crate::weddings::WeddingService;
    use wedding_rsvp_core::{
        CustomQuestion, NewGuest, QuestionKind, RsvpPatch, RsvpStatus, WeddingPatch, WeddingStatus,
    };
    use wedding_rsvp_testing::fixtures::{new_guest, new_wedding, owner, stranger, submission};
    use wedding_rsvp_testing::{FixedClock, InMemoryStore, test_clock};

    struct Harness {
        store: InMemoryStore,
        clock: FixedClock,
        weddings: WeddingService,
        engine: RsvpEngine,
        reconciler: CounterReconciler,
    }

    impl Harness {
        fn new() -> Self {
            let store = InMemoryStore::new();
            let clock = test_clock();
            let stores = store.stores();
            let clock_dyn: Arc<dyn Clock> = Arc::new(clock.clone());
            let reconciler =
                CounterReconciler::new(stores.clone(), std::time::Duration::ZERO, RetryPolicy::none());
            let engine = RsvpEngine::new(
                stores.clone(),
                clock_dyn.clone(),
                Timeouts::default(),
                reconciler.clone(),
                Duration::hours(24),
            );
            let weddings = WeddingService::new(stores, clock_dyn, Timeouts::default());
            Self {
                store,
                clock,
                weddings,
                engine,
                reconciler,
            }
        }

        async fn published(&self, slug: &str) -> Wedding {
            let wedding = self.weddings.create(&owner(), new_wedding(slug)).await.unwrap();
            self.weddings.publish(&owner(), wedding.id).await.unwrap()
        }

        async fn add_guest(&self, wedding_id: WeddingId, guest: NewGuest) -> Guest {
            let guest = Guest::from_new(
                GuestId::new(),
                wedding_id,
                owner(),
                guest.normalized("").unwrap(),
                None,
                self.clock.now(),
            );
            self.store.put_guest(guest.clone());
            guest
        }
    }

    #[tokio::test]
    async fn submission_is_recorded_and_counters_follow() {
        let h = Harness::new();
        let wedding = h.published("j-and-j-2026").await;

        let rsvp = h
            .engine
            .submit_public("j-and-j-2026", submission("Alex", Some("a@l.com"), 1))
            .await
            .unwrap();
        assert_eq!(rsvp.plus_one_count, 1);
        assert_eq!(rsvp.submitted_at, h.clock.now());
        assert_eq!(rsvp.source, RsvpSource::Web);

        h.reconciler.settle().await;
        let counters = h.store.wedding(wedding.id).unwrap().counters;
        assert_eq!(counters.rsvp_count, 1);
        assert_eq!(counters.total_attending, 1);
    }

    #[tokio::test]
    async fn same_email_twice_is_a_duplicate() {
        let h = Harness::new();
        h.published("j-and-j-2026").await;
        h.engine
            .submit_public("j-and-j-2026", submission("Alex", Some("a@l.com"), 0))
            .await
            .unwrap();
        let err = h
            .engine
            .submit_public("j-and-j-2026", submission("Alex", Some("A@L.com "), 0))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "DUPLICATE_RSVP");
    }

    #[tokio::test]
    async fn responses_without_email_never_collide() {
        let h = Harness::new();
        h.published("j-and-j-2026").await;
        for name in ["A", "B"] {
            h.engine
                .submit_public("j-and-j-2026", submission(name, None, 0))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn plus_one_cap_is_enforced() {
        let h = Harness::new();
        h.published("j-and-j-2026").await;
        let err = h
            .engine
            .submit_public("j-and-j-2026", submission("Alex", Some("a@l.com"), 3))
            .await
            .unwrap_err();
        assert_eq!(err, RsvpError::TooManyPlusOnes { max: 2, given: 3 });
    }

    #[tokio::test]
    async fn gate_checks_run_in_order() {
        let h = Harness::new();
        assert_eq!(
            h.engine.submit_public("nope-nope", submission("A", None, 0)).await.unwrap_err().kind(),
            "NOT_FOUND"
        );

        let draft = h.weddings.create(&owner(), new_wedding("still-draft")).await.unwrap();
        assert_eq!(
            h.engine.submit_public("still-draft", submission("A", None, 0)).await,
            Err(RsvpError::WeddingNotPublic)
        );

        h.weddings.publish(&owner(), draft.id).await.unwrap();
        let mut settings = draft.rsvp.clone();
        settings.deadline = Some(h.clock.now() - Duration::minutes(1));
        let patch = WeddingPatch {
            rsvp: Some(settings),
            ..WeddingPatch::default()
        };
        h.weddings.update(&owner(), draft.id, patch).await.unwrap();
        assert_eq!(
            h.engine.submit_public("still-draft", submission("A", None, 0)).await.unwrap_err().kind(),
            "RSVP_CLOSED"
        );
    }

    #[tokio::test]
    async fn disabled_rsvps_are_closed_but_owner_can_record() {
        let h = Harness::new();
        let wedding = h.published("j-and-j-2026").await;
        let mut settings = wedding.rsvp.clone();
        settings.enabled = false;
        let patch = WeddingPatch {
            rsvp: Some(settings),
            ..WeddingPatch::default()
        };
        h.weddings.update(&owner(), wedding.id, patch).await.unwrap();

        let err = h
            .engine
            .submit_public("j-and-j-2026", submission("A", None, 0))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "RSVP_CLOSED");

        let manual = h
            .engine
            .record_manual(&owner(), wedding.id, submission("A", None, 0))
            .await
            .unwrap();
        assert_eq!(manual.source, RsvpSource::Manual);
        assert_eq!(
            h.engine.record_manual(&stranger(), wedding.id, submission("B", None, 0)).await,
            Err(RsvpError::Unauthorized)
        );
    }

    #[tokio::test]
    async fn required_custom_questions_are_checked() {
        let h = Harness::new();
        let wedding = h.published("j-and-j-2026").await;
        let mut settings = wedding.rsvp.clone();
        settings.custom_questions = vec![CustomQuestion {
            id: "song".into(),
            question: "Song request?".into(),
            kind: QuestionKind::Text,
            required: true,
            options: vec![],
        }];
        let patch = WeddingPatch {
            rsvp: Some(settings),
            ..WeddingPatch::default()
        };
        h.weddings.update(&owner(), wedding.id, patch).await.unwrap();

        let err = h
            .engine
            .submit_public("j-and-j-2026", submission("A", None, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, RsvpError::Validation { field, .. } if field == "custom_answers.song"));
    }

    #[tokio::test]
    async fn invitation_link_links_guest_both_ways() {
        let h = Harness::new();
        let wedding = h.published("j-and-j-2026").await;
        let guest = h.add_guest(wedding.id, new_guest("Ana", Some("ana@example.com"))).await;

        let mut input = submission("Ana", Some("other@example.com"), 0);
        input.guest_id = Some(guest.id);
        let rsvp = h.engine.submit_public("j-and-j-2026", input.clone()).await.unwrap();

        assert_eq!(rsvp.guest_id, Some(guest.id));
        let stored = h.store.guest(guest.id).unwrap();
        assert_eq!(stored.rsvp_id, Some(rsvp.id));
        assert_eq!(stored.rsvp_status, Some(RsvpStatus::Attending));
        assert_eq!(stored.rsvp_submitted_at, Some(rsvp.submitted_at));

        input.email = Some("third@example.com".into());
        let err = h.engine.submit_public("j-and-j-2026", input).await.unwrap_err();
        assert_eq!(err, RsvpError::DuplicateRsvp("guest".into()));
    }

    #[tokio::test]
    async fn guest_from_another_wedding_is_not_found() {
        let h = Harness::new();
        h.published("j-and-j-2026").await;
        let other = h.published("other-wedding").await;
        let guest = h.add_guest(other.id, new_guest("Ana", None)).await;

        let mut input = submission("Ana", None, 0);
        input.guest_id = Some(guest.id);
        let err = h.engine.submit_public("j-and-j-2026", input).await.unwrap_err();
        assert_eq!(err.kind(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn email_match_links_unanswered_guest() {
        let h = Harness::new();
        let wedding = h.published("j-and-j-2026").await;
        let guest = h.add_guest(wedding.id, new_guest("Ana", Some("ana@example.com"))).await;

        let rsvp = h
            .engine
            .submit_public("j-and-j-2026", submission("Ana", Some("ANA@example.com"), 0))
            .await
            .unwrap();
        assert_eq!(rsvp.guest_id, Some(guest.id));
        assert_eq!(h.store.guest(guest.id).unwrap().rsvp_id, Some(rsvp.id));
    }

    #[tokio::test]
    async fn late_update_needs_owner() {
        let h = Harness::new();
        h.published("j-and-j-2026").await;
        let rsvp = h
            .engine
            .submit_public("j-and-j-2026", submission("Alex", Some("a@l.com"), 0))
            .await
            .unwrap();

        let patch = RsvpPatch {
            status: Some(RsvpStatus::Maybe),
            ..RsvpPatch::default()
        };
        h.clock.advance(Duration::hours(23));
        h.engine.update(None, rsvp.id, patch.clone()).await.unwrap();

        h.clock.advance(Duration::hours(2));
        assert_eq!(
            h.engine.update(None, rsvp.id, patch.clone()).await,
            Err(RsvpError::RsvpCannotModify)
        );
        assert_eq!(
            h.engine.update(Some(&stranger()), rsvp.id, patch.clone()).await,
            Err(RsvpError::RsvpCannotModify)
        );
        let updated = h.engine.update(Some(&owner()), rsvp.id, patch).await.unwrap();
        assert_eq!(updated.status, RsvpStatus::Maybe);
        assert_eq!(updated.updated_at, Some(h.clock.now()));
    }

    #[tokio::test]
    async fn update_revalidates_and_mirrors_status() {
        let h = Harness::new();
        let wedding = h.published("j-and-j-2026").await;
        let guest = h.add_guest(wedding.id, new_guest("Ana", Some("ana@example.com"))).await;
        let rsvp = h
            .engine
            .submit_public("j-and-j-2026", submission("Ana", Some("ana@example.com"), 0))
            .await
            .unwrap();

        let too_many = RsvpPatch {
            plus_ones: Some(submission("x", None, 3).plus_ones),
            ..RsvpPatch::default()
        };
        assert_eq!(
            h.engine.update(None, rsvp.id, too_many).await.unwrap_err().kind(),
            "TOO_MANY_PLUS_ONES"
        );

        let decline = RsvpPatch {
            status: Some(RsvpStatus::NotAttending),
            ..RsvpPatch::default()
        };
        h.engine.update(None, rsvp.id, decline).await.unwrap();
        assert_eq!(h.store.guest(guest.id).unwrap().rsvp_status, Some(RsvpStatus::NotAttending));

        h.reconciler.settle().await;
        let counters = h.store.wedding(wedding.id).unwrap().counters;
        assert_eq!(counters.rsvp_count, 1);
        assert_eq!(counters.total_attending, 0);
    }

    #[tokio::test]
    async fn edit_never_relinks_a_guest_removed_meanwhile() {
        let h = Harness::new();
        let wedding = h.published("j-and-j-2026").await;
        let guest = h.add_guest(wedding.id, new_guest("Ana", Some("ana@example.com"))).await;
        let rsvp = h
            .engine
            .submit_public("j-and-j-2026", submission("Ana", Some("ana@example.com"), 0))
            .await
            .unwrap();
        assert_eq!(rsvp.guest_id, Some(guest.id));

        // An edit that loaded the response before the guest was deleted.
        let mut stale = h.store.rsvp(rsvp.id).unwrap();
        let stores = h.store.stores();
        stores.rsvps.clear_guest(guest.id).await.unwrap();
        stores.guests.delete(guest.id).await.unwrap();

        stale.status = RsvpStatus::Maybe;
        let written = stores.rsvps.replace(stale).await.unwrap().unwrap();
        assert_eq!(written.status, RsvpStatus::Maybe);
        assert_eq!(written.guest_id, None);
        assert_eq!(h.store.rsvp(rsvp.id).unwrap().guest_id, None);

        let decline = RsvpPatch {
            status: Some(RsvpStatus::NotAttending),
            ..RsvpPatch::default()
        };
        let updated = h.engine.update(None, rsvp.id, decline).await.unwrap();
        assert_eq!(updated.guest_id, None);
        assert!(h.store.guest(guest.id).is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_submissions_for_one_email_record_exactly_one() {
        const ATTEMPTS: usize = 32;
        let h = Harness::new();
        let wedding = h.published("j-and-j-2026").await;

        let tasks: Vec<_> = (0..ATTEMPTS)
            .map(|i| {
                let engine = h.engine.clone();
                tokio::spawn(async move {
                    let input = submission(&format!("Alex {i}"), Some("alex@example.com"), 0);
                    engine.submit_public("j-and-j-2026", input).await
                })
            })
            .collect();

        let mut recorded = 0;
        let mut duplicates = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => recorded += 1,
                Err(e) => {
                    assert_eq!(e, RsvpError::DuplicateRsvp("email".into()));
                    duplicates += 1;
                }
            }
        }
        assert_eq!(recorded, 1);
        assert_eq!(duplicates, ATTEMPTS - 1);
        assert_eq!(h.store.rsvp_count(wedding.id), 1);

        h.reconciler.settle().await;
        assert_eq!(h.store.wedding(wedding.id).unwrap().counters.rsvp_count, 1);
    }

    #[tokio::test]
    async fn unknown_rsvp_is_rsvp_not_found() {
        let h = Harness::new();
        let id = RsvpId::new();
        assert_eq!(
            h.engine.update(None, id, RsvpPatch::default()).await,
            Err(RsvpError::RsvpNotFound(id.to_string()))
        );
        assert_eq!(h.engine.delete(&owner(), id).await.unwrap_err().kind(), "RSVP_NOT_FOUND");
    }

    #[tokio::test]
    async fn delete_is_owner_only_and_unlinks_guest() {
        let h = Harness::new();
        let wedding = h.published("j-and-j-2026").await;
        let guest = h.add_guest(wedding.id, new_guest("Ana", Some("ana@example.com"))).await;
        let rsvp = h
            .engine
            .submit_public("j-and-j-2026", submission("Ana", Some("ana@example.com"), 0))
            .await
            .unwrap();

        assert_eq!(h.engine.delete(&stranger(), rsvp.id).await, Err(RsvpError::Unauthorized));
        h.engine.delete(&owner(), rsvp.id).await.unwrap();

        let guest = h.store.guest(guest.id).unwrap();
        assert_eq!(guest.rsvp_id, None);
        assert_eq!(guest.rsvp_status, None);
        assert!(h.store.rsvp(rsvp.id).is_none());

        h.reconciler.settle().await;
        assert_eq!(h.store.wedding(wedding.id).unwrap().counters.rsvp_count, 0);
    }

    #[tokio::test]
    async fn list_and_export_are_newest_first() {
        let h = Harness::new();
        let wedding = h.published("j-and-j-2026").await;
        let first = h
            .engine
            .submit_public("j-and-j-2026", submission("A", Some("a@example.com"), 0))
            .await
            .unwrap();
        h.clock.advance(Duration::minutes(5));
        let second = h
            .engine
            .submit_public("j-and-j-2026", submission("B", Some("b@example.com"), 0))
            .await
            .unwrap();

        let page = h
            .engine
            .list(&owner(), wedding.id, RsvpFilter::default(), PageRequest::new(Some(1), Some(1)))
            .await
            .unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.data[0].id, second.id);

        let all = h.engine.export(&owner(), wedding.id, RsvpFilter::default()).await.unwrap();
        assert_eq!(all.iter().map(|r| r.id).collect::<Vec<_>>(), vec![second.id, first.id]);

        assert_eq!(
            h.engine.export(&stranger(), wedding.id, RsvpFilter::default()).await,
            Err(RsvpError::Unauthorized)
        );
        assert_eq!(wedding.status, WeddingStatus::Published);
    }
}
