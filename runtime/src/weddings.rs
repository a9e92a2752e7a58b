//! Wedding lifecycle: create, read, update, publish, archive, delete.

use crate::aggregates::{WeddingAction, WeddingEffect, WeddingEnvironment, WeddingReducer, WeddingState};
use crate::deadline::{Timeouts, with_deadline};
use crate::dispatch::{Executor, dispatch};
use crate::load_owned;
use crate::metrics::EffectMetrics;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use wedding_rsvp_core::environment::Clock;
use wedding_rsvp_core::{
    NewWedding, Page, PageRequest, Result, RsvpError, Slug, Stores, UserId, Wedding, WeddingFilter,
    WeddingId, WeddingPatch,
};

/// Owner and public operations on wedding documents.
#[derive(Clone)]
pub struct WeddingService {
    stores: Stores,
    clock: Arc<dyn Clock>,
    timeouts: Timeouts,
    env: WeddingEnvironment,
}

/// A slug that cannot be valid cannot name a wedding either.
fn lookup_slug(raw: &str) -> Result<Slug> {
    Slug::parse(raw).map_err(|_| RsvpError::not_found("wedding", raw))
}

impl WeddingService {
    /// Create the service.
    #[must_use]
    pub fn new(stores: Stores, clock: Arc<dyn Clock>, timeouts: Timeouts) -> Self {
        Self {
            stores,
            env: WeddingEnvironment::new(clock.clone()),
            clock,
            timeouts,
        }
    }

    /// Current state of a wedding. A missing wedding is an empty state.
    async fn load(&self, id: WeddingId) -> Result<WeddingState> {
        Ok(match self.stores.weddings.get(id).await? {
            Some(wedding) => WeddingState::loaded(wedding),
            None => WeddingState::new(id),
        })
    }

    /// Dispatch `action` and return the wedding it leaves behind.
    async fn send(&self, mut state: WeddingState, action: WeddingAction) -> Result<Wedding> {
        dispatch(&WeddingReducer, &self.env, self, &mut state, action).await?;
        state.wedding.ok_or_else(|| RsvpError::not_found("wedding", state.id))
    }

    /// Create a draft owned by `owner`.
    ///
    /// # Errors
    ///
    /// `VALIDATION` for bad input, `SLUG_TAKEN` if the slug is in use.
    #[instrument(skip_all, fields(user_id = %owner))]
    pub async fn create(&self, owner: &UserId, input: NewWedding) -> Result<Wedding> {
        with_deadline(self.timeouts.operation, "create wedding", async {
            let action = WeddingAction::Create {
                owner: owner.clone(),
                input,
            };
            let wedding = self.send(WeddingState::new(WeddingId::new()), action).await?;
            info!(wedding_id = %wedding.id, slug = %wedding.slug, "Wedding created");
            Ok(wedding)
        })
        .await
    }

    /// Read a wedding the caller owns.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND` or `UNAUTHORIZED`.
    pub async fn get(&self, owner: &UserId, id: WeddingId) -> Result<Wedding> {
        with_deadline(self.timeouts.operation, "get wedding", load_owned(&self.stores, id, owner)).await
    }

    /// Resolve a wedding the caller owns by slug, whatever its status.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND` or `UNAUTHORIZED`.
    pub async fn get_by_slug_for_owner(&self, owner: &UserId, slug: &str) -> Result<Wedding> {
        with_deadline(self.timeouts.operation, "get wedding by slug", async {
            let slug = lookup_slug(slug)?;
            let wedding = self
                .stores
                .weddings
                .get_by_slug(slug.clone())
                .await?
                .ok_or_else(|| RsvpError::not_found("wedding", &slug))?;
            if !wedding.is_owned_by(owner) {
                return Err(RsvpError::Unauthorized);
            }
            Ok(wedding)
        })
        .await
    }

    /// Read a published, public wedding and count the view.
    ///
    /// The view counter is bumped on a detached task; its failure never
    /// affects the read.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND` if no wedding has the slug, `WEDDING_NOT_PUBLIC` if it is
    /// not published or not public.
    pub async fn get_public(&self, slug: &str) -> Result<Wedding> {
        let wedding = with_deadline(self.timeouts.operation, "get public wedding", async {
            let slug = lookup_slug(slug)?;
            let wedding = self
                .stores
                .weddings
                .get_by_slug(slug.clone())
                .await?
                .ok_or_else(|| RsvpError::not_found("wedding", &slug))?;
            if !wedding.is_publicly_visible() {
                return Err(RsvpError::WeddingNotPublic);
            }
            Ok(wedding)
        })
        .await?;

        self.record_view(wedding.id);
        Ok(wedding)
    }

    fn record_view(&self, id: WeddingId) {
        let stores = self.stores.clone();
        let at = self.clock.now();
        let budget = self.timeouts.operation;
        tokio::spawn(async move {
            let bump = stores.weddings.increment_views(id, at);
            if let Err(e) = with_deadline(budget, "increment views", bump).await {
                debug!(wedding_id = %id, error = %e, "Failed to record view");
            }
        });
    }

    /// The caller's weddings, newest first.
    ///
    /// # Errors
    ///
    /// `STORAGE` on backend failure.
    pub async fn list_for_user(
        &self,
        owner: &UserId,
        filter: WeddingFilter,
        page: PageRequest,
    ) -> Result<Page<Wedding>> {
        let list = self.stores.weddings.list_for_user(owner.clone(), filter, page);
        with_deadline(self.timeouts.operation, "list weddings", list).await
    }

    /// Published public weddings, soonest event first.
    ///
    /// # Errors
    ///
    /// `STORAGE` on backend failure.
    pub async fn list_public(&self, filter: WeddingFilter, page: PageRequest) -> Result<Page<Wedding>> {
        let list = self.stores.weddings.list_public(filter, page);
        with_deadline(self.timeouts.operation, "list public weddings", list).await
    }

    /// Apply a partial update.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND`, `UNAUTHORIZED`, `VALIDATION`, or `SLUG_TAKEN` when the new
    /// slug belongs to another wedding.
    #[instrument(skip_all, fields(user_id = %owner, wedding_id = %id))]
    pub async fn update(&self, owner: &UserId, id: WeddingId, patch: WeddingPatch) -> Result<Wedding> {
        with_deadline(self.timeouts.operation, "update wedding", async {
            let state = self.load(id).await?;
            let action = WeddingAction::Update {
                caller: owner.clone(),
                patch,
            };
            let wedding = self.send(state, action).await?;
            debug!("Wedding updated");
            Ok(wedding)
        })
        .await
    }

    /// Move a draft to `published`. Publishing an already published wedding
    /// returns it unchanged.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND`, `UNAUTHORIZED`, or `VALIDATION` when couple or event
    /// details are missing or the wedding is archived or expired.
    #[instrument(skip_all, fields(user_id = %owner, wedding_id = %id))]
    pub async fn publish(&self, owner: &UserId, id: WeddingId) -> Result<Wedding> {
        with_deadline(self.timeouts.operation, "publish wedding", async {
            let state = self.load(id).await?;
            let published = self.send(state, WeddingAction::Publish { caller: owner.clone() }).await?;
            info!(slug = %published.slug, "Wedding published");
            Ok(published)
        })
        .await
    }

    /// Retire a wedding. Archiving twice is a no-op.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND` or `UNAUTHORIZED`.
    #[instrument(skip_all, fields(user_id = %owner, wedding_id = %id))]
    pub async fn archive(&self, owner: &UserId, id: WeddingId) -> Result<Wedding> {
        with_deadline(self.timeouts.operation, "archive wedding", async {
            let state = self.load(id).await?;
            let archived = self.send(state, WeddingAction::Archive { caller: owner.clone() }).await?;
            info!("Wedding archived");
            Ok(archived)
        })
        .await
    }

    /// Delete a wedding with all its guests and RSVPs.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND` or `UNAUTHORIZED`.
    #[instrument(skip_all, fields(user_id = %owner, wedding_id = %id))]
    pub async fn delete(&self, owner: &UserId, id: WeddingId) -> Result<()> {
        with_deadline(self.timeouts.operation, "delete wedding", async {
            let mut state = self.load(id).await?;
            let action = WeddingAction::Delete { caller: owner.clone() };
            dispatch(&WeddingReducer, &self.env, self, &mut state, action).await?;
            info!("Wedding deleted with its guests and RSVPs");
            Ok(())
        })
        .await
    }
}

impl Executor<WeddingState, WeddingEffect> for WeddingService {
    fn execute<'a>(
        &'a self,
        state: &'a mut WeddingState,
        effect: WeddingEffect,
    ) -> impl Future<Output = Result<()>> + Send + 'a {
        async move {
            let name = effect.name();
            match effect {
                WeddingEffect::Insert(wedding) => self.stores.weddings.insert(wedding).await?,
                WeddingEffect::SaveContent(wedding) => {
                    if !self.stores.weddings.update_content(wedding).await? {
                        return Err(RsvpError::not_found("wedding", state.id));
                    }
                }
                WeddingEffect::SetStatus { id, status, at } => {
                    // The store owns published_at; keep its copy.
                    let stored = self
                        .stores
                        .weddings
                        .update_status(id, status, at)
                        .await?
                        .ok_or_else(|| RsvpError::not_found("wedding", id))?;
                    state.wedding = Some(stored);
                }
                WeddingEffect::Delete(id) => {
                    if !self.stores.weddings.delete(id).await? {
                        warn!("Wedding disappeared before delete");
                        return Err(RsvpError::not_found("wedding", id));
                    }
                }
            }
            EffectMetrics::record("wedding", name);
            Ok(())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use chrono::Duration;
    use wedding_rsvp_core::WeddingStatus;
    use wedding_rsvp_testing::fixtures::{bare_wedding, new_wedding, owner, stranger};
    use wedding_rsvp_testing::{FixedClock, InMemoryStore, test_clock};

    fn service() -> (WeddingService, InMemoryStore, FixedClock) {
        let store = InMemoryStore::new();
        let clock = test_clock();
        let service = WeddingService::new(store.stores(), Arc::new(clock.clone()), Timeouts::default());
        (service, store, clock)
    }

    #[tokio::test]
    async fn create_then_read_round_trips() {
        let (service, _, clock) = service();
        let created = service.create(&owner(), new_wedding("j-and-j-2026")).await.unwrap();
        let read = service.get(&owner(), created.id).await.unwrap();

        assert_eq!(read, created);
        assert_eq!(read.status, WeddingStatus::Draft);
        assert_eq!(read.created_at, clock.now());
    }

    #[tokio::test]
    async fn duplicate_slug_is_rejected() {
        let (service, _, _) = service();
        service.create(&owner(), new_wedding("j-and-j-2026")).await.unwrap();
        let err = service.create(&stranger(), new_wedding("J-AND-J-2026")).await.unwrap_err();
        assert_eq!(err.kind(), "SLUG_TAKEN");
    }

    #[tokio::test]
    async fn update_rejects_colliding_slug_and_bumps_updated_at() {
        let (service, _, _) = service();
        let first = service.create(&owner(), new_wedding("first-one")).await.unwrap();
        let second = service.create(&owner(), new_wedding("second-one")).await.unwrap();

        let patch = WeddingPatch {
            slug: Some(Slug::parse("first-one").unwrap()),
            ..WeddingPatch::default()
        };
        let err = service.update(&owner(), second.id, patch).await.unwrap_err();
        assert_eq!(err.kind(), "SLUG_TAKEN");

        let patch = WeddingPatch {
            title: Some("Renamed".into()),
            ..WeddingPatch::default()
        };
        let updated = service.update(&owner(), first.id, patch.clone()).await.unwrap();
        let again = service.update(&owner(), first.id, patch).await.unwrap();
        assert!(updated.updated_at > first.updated_at);
        assert!(again.updated_at > updated.updated_at);
    }

    #[tokio::test]
    async fn publish_is_idempotent() {
        let (service, _, clock) = service();
        let wedding = service.create(&owner(), new_wedding("j-and-j-2026")).await.unwrap();

        let published = service.publish(&owner(), wedding.id).await.unwrap();
        assert_eq!(published.status, WeddingStatus::Published);
        let first_published_at = published.published_at.unwrap();

        clock.advance(Duration::hours(1));
        let again = service.publish(&owner(), wedding.id).await.unwrap();
        assert_eq!(again.published_at, Some(first_published_at));
    }

    #[tokio::test]
    async fn publish_requires_details() {
        let (service, _, _) = service();
        let wedding = service.create(&owner(), bare_wedding("bare-one")).await.unwrap();
        let err = service.publish(&owner(), wedding.id).await.unwrap_err();
        assert_eq!(err.kind(), "VALIDATION");
    }

    #[tokio::test]
    async fn archived_weddings_cannot_be_republished() {
        let (service, _, _) = service();
        let wedding = service.create(&owner(), new_wedding("gone-soon")).await.unwrap();
        service.archive(&owner(), wedding.id).await.unwrap();
        assert_eq!(service.publish(&owner(), wedding.id).await.unwrap_err().kind(), "VALIDATION");
    }

    #[tokio::test]
    async fn strangers_are_unauthorized() {
        let (service, _, _) = service();
        let wedding = service.create(&owner(), new_wedding("j-and-j-2026")).await.unwrap();
        assert_eq!(service.get(&stranger(), wedding.id).await, Err(RsvpError::Unauthorized));
        assert_eq!(service.delete(&stranger(), wedding.id).await, Err(RsvpError::Unauthorized));
        assert_eq!(
            service.get_by_slug_for_owner(&stranger(), "j-and-j-2026").await,
            Err(RsvpError::Unauthorized)
        );
    }

    #[tokio::test]
    async fn public_read_requires_published_public_wedding() {
        let (service, store, _) = service();
        let wedding = service.create(&owner(), new_wedding("j-and-j-2026")).await.unwrap();
        assert_eq!(service.get_public("j-and-j-2026").await, Err(RsvpError::WeddingNotPublic));
        assert_eq!(service.get_public("nobody-here").await.unwrap_err().kind(), "NOT_FOUND");
        assert_eq!(service.get_public("!!").await.unwrap_err().kind(), "NOT_FOUND");

        service.publish(&owner(), wedding.id).await.unwrap();
        let public = service.get_public("J-and-J-2026").await.unwrap();
        assert_eq!(public.id, wedding.id);

        for _ in 0..20 {
            if store.wedding(wedding.id).unwrap().counters.view_count == 1 {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("view was not recorded");
    }

    #[tokio::test]
    async fn list_public_orders_by_event_date() {
        let (service, _, _) = service();
        let mut later = new_wedding("later-one");
        later.event.as_mut().unwrap().date = chrono::NaiveDate::from_ymd_opt(2027, 1, 1).unwrap();
        let later = service.create(&owner(), later).await.unwrap();
        let sooner = service.create(&owner(), new_wedding("sooner-one")).await.unwrap();
        let hidden = service.create(&owner(), new_wedding("draft-one")).await.unwrap();
        service.publish(&owner(), later.id).await.unwrap();
        service.publish(&owner(), sooner.id).await.unwrap();

        let page = service
            .list_public(WeddingFilter::default(), PageRequest::default())
            .await
            .unwrap();
        let ids: Vec<_> = page.data.iter().map(|w| w.id).collect();
        assert_eq!(ids, vec![sooner.id, later.id]);
        assert!(!ids.contains(&hidden.id));
    }

    #[tokio::test]
    async fn list_for_user_is_newest_first() {
        let (service, _, clock) = service();
        let a = service.create(&owner(), new_wedding("wedding-a")).await.unwrap();
        clock.advance(Duration::minutes(1));
        let b = service.create(&owner(), new_wedding("wedding-b")).await.unwrap();
        service.create(&stranger(), new_wedding("wedding-c")).await.unwrap();

        let page = service
            .list_for_user(&owner(), WeddingFilter::default(), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.data[0].id, b.id);
        assert_eq!(page.data[1].id, a.id);
    }
}
