//! Integration tests for `PostgresStore` using testcontainers.
//!
//! # Requirements
//!
//! Docker must be running. Each test starts its own `PostgreSQL` container,
//! so they are ignored by default:
//!
//! ```text
//! cargo test -p wedding-rsvp-postgres -- --ignored
//! ```

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use wedding_rsvp_core::{
    GuestFilter, GuestStore, MaintenanceStore, PageRequest, RsvpFilter, RsvpId, RsvpStatus,
    RsvpStore, Stores, WeddingFilter, WeddingStore,
};
use wedding_rsvp_postgres::PostgresStore;
use wedding_rsvp_runtime::{RuntimeSettings, Services};
use wedding_rsvp_testing::fixtures::{new_guest, new_wedding, owner, response, submission};
use wedding_rsvp_testing::test_clock;

struct Harness {
    _container: ContainerAsync<Postgres>,
    store: Arc<PostgresStore>,
    services: Services,
}

async fn setup() -> Harness {
    let container = Postgres::default()
        .start()
        .await
        .expect("Failed to start PostgreSQL container");
    let host = container.get_host().await.expect("Failed to get host");
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("Failed to get port");
    let url = format!("postgres://postgres:postgres@{host}:{port}/postgres");

    let pool = sqlx::PgPool::connect(&url)
        .await
        .expect("Failed to connect to test database");
    let store = Arc::new(PostgresStore::new(pool));
    store.migrate().await.expect("Failed to run migrations");

    let settings = RuntimeSettings {
        reconcile_debounce: Duration::ZERO,
        ..RuntimeSettings::default()
    };
    let services = Services::new(
        Stores::from_backend(store.clone()),
        Arc::new(test_clock()),
        settings,
    );
    Harness {
        _container: container,
        store,
        services,
    }
}

fn stores(h: &Harness) -> Stores {
    Stores::from_backend(h.store.clone())
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn slug_index_rejects_second_wedding() {
    let h = setup().await;
    h.services
        .weddings
        .create(&owner(), new_wedding("j-and-j-2026"))
        .await
        .unwrap();

    let err = h
        .services
        .weddings
        .create(&owner(), new_wedding("j-and-j-2026"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "SLUG_TAKEN");
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn publish_sets_published_at_once() {
    let h = setup().await;
    let wedding = h
        .services
        .weddings
        .create(&owner(), new_wedding("j-and-j-2026"))
        .await
        .unwrap();
    let first = h.services.weddings.publish(&owner(), wedding.id).await.unwrap();
    assert!(first.published_at.is_some());

    let again = h.services.weddings.publish(&owner(), wedding.id).await.unwrap();
    assert_eq!(again.published_at, first.published_at);

    let public = stores(&h)
        .weddings
        .list_public(WeddingFilter::default(), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(public.total, 1);
    assert_eq!(public.data[0].id, wedding.id);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn submissions_update_counters() {
    let h = setup().await;
    let wedding = h
        .services
        .weddings
        .create(&owner(), new_wedding("j-and-j-2026"))
        .await
        .unwrap();
    h.services.weddings.publish(&owner(), wedding.id).await.unwrap();

    h.services
        .rsvps
        .submit_public("j-and-j-2026", response("Alex", "a@l.com", RsvpStatus::Attending, 3))
        .await
        .unwrap();
    h.services
        .rsvps
        .submit_public("j-and-j-2026", response("Bo", "b@l.com", RsvpStatus::NotAttending, 0))
        .await
        .unwrap();
    h.services.reconciler.settle().await;

    let tally = stores(&h).rsvps.tally(wedding.id).await.unwrap();
    assert_eq!(tally.rsvp_count, 2);
    assert_eq!(tally.total_attending, 3);

    let stored = stores(&h).weddings.get(wedding.id).await.unwrap().unwrap();
    assert_eq!(stored.counters.rsvp_count, 2);
    assert_eq!(stored.counters.total_attending, 3);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn email_and_guest_indexes_reject_duplicates() {
    let h = setup().await;
    let wedding = h
        .services
        .weddings
        .create(&owner(), new_wedding("j-and-j-2026"))
        .await
        .unwrap();
    h.services.weddings.publish(&owner(), wedding.id).await.unwrap();
    let guest = h
        .services
        .guests
        .create(&owner(), wedding.id, new_guest("Alex", Some("a@l.com")))
        .await
        .unwrap();

    let err = h
        .services
        .guests
        .create(&owner(), wedding.id, new_guest("Alex", Some("a@l.com")))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "DUPLICATE_GUEST");

    let rsvp = h
        .services
        .rsvps
        .submit_public("j-and-j-2026", submission("Alex", Some("a@l.com"), 0))
        .await
        .unwrap();
    assert_eq!(rsvp.guest_id, Some(guest.id));

    let linked = stores(&h).guests.get(guest.id).await.unwrap().unwrap();
    assert_eq!(linked.rsvp_id, Some(rsvp.id));

    // Bypass the service's lookup so the index itself is hit.
    let mut copy = rsvp.clone();
    copy.id = RsvpId::new();
    copy.guest_id = None;
    let err = stores(&h).rsvps.insert(copy).await.unwrap_err();
    assert_eq!(err.kind(), "DUPLICATE_RSVP");

    let mut copy = rsvp;
    copy.id = RsvpId::new();
    copy.email = Some("other@l.com".into());
    let err = stores(&h).rsvps.insert(copy).await.unwrap_err();
    assert_eq!(err.kind(), "DUPLICATE_RSVP");
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn search_and_paging_agree() {
    let h = setup().await;
    let wedding = h
        .services
        .weddings
        .create(&owner(), new_wedding("j-and-j-2026"))
        .await
        .unwrap();
    for (name, email) in [("Alex", "a@l.com"), ("Bo", "b@l.com"), ("Alexis", "x@l.com")] {
        h.services
            .guests
            .create(&owner(), wedding.id, new_guest(name, Some(email)))
            .await
            .unwrap();
    }

    let page = h
        .services
        .guests
        .list(
            &owner(),
            wedding.id,
            GuestFilter::default(),
            PageRequest::new(Some(1), Some(2)),
        )
        .await
        .unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.data.len(), 2);
    assert_eq!(page.total_pages, 2);

    let filter = GuestFilter {
        search: Some("alex".into()),
        ..GuestFilter::default()
    };
    let found = h
        .services
        .guests
        .list(&owner(), wedding.id, filter, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(found.total, 2);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn deleting_a_wedding_cascades() {
    let h = setup().await;
    let wedding = h
        .services
        .weddings
        .create(&owner(), new_wedding("j-and-j-2026"))
        .await
        .unwrap();
    h.services.weddings.publish(&owner(), wedding.id).await.unwrap();
    h.services
        .guests
        .create(&owner(), wedding.id, new_guest("Alex", Some("a@l.com")))
        .await
        .unwrap();
    h.services
        .rsvps
        .submit_public("j-and-j-2026", submission("Alex", Some("a@l.com"), 0))
        .await
        .unwrap();
    h.services.reconciler.settle().await;

    h.services.weddings.delete(&owner(), wedding.id).await.unwrap();

    let s = stores(&h);
    assert!(s.weddings.get(wedding.id).await.unwrap().is_none());
    assert_eq!(s.guests.count_by_wedding(wedding.id).await.unwrap(), 0);
    let left = s.rsvps.export(wedding.id, RsvpFilter::default()).await.unwrap();
    assert!(left.is_empty());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn sweeper_repairs_broken_links() {
    let h = setup().await;
    let wedding = h
        .services
        .weddings
        .create(&owner(), new_wedding("j-and-j-2026"))
        .await
        .unwrap();
    h.services.weddings.publish(&owner(), wedding.id).await.unwrap();
    let guest = h
        .services
        .guests
        .create(&owner(), wedding.id, new_guest("Alex", Some("a@l.com")))
        .await
        .unwrap();
    let rsvp = h
        .services
        .rsvps
        .submit_public("j-and-j-2026", submission("Alex", Some("a@l.com"), 0))
        .await
        .unwrap();
    h.services.reconciler.settle().await;

    let s = stores(&h);
    s.guests.set_rsvp_link(guest.id, None).await.unwrap();
    assert_eq!(s.maintenance.repair_guest_backrefs().await.unwrap(), 1);

    let repaired = s.guests.get(guest.id).await.unwrap().unwrap();
    assert_eq!(repaired.rsvp_id, Some(rsvp.id));
    assert_eq!(repaired.rsvp_status, Some(RsvpStatus::Attending));

    assert_eq!(h.services.sweeper.sweep_once().await.unwrap().total(), 0);
    s.maintenance.ping().await.unwrap();
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn replace_keeps_the_stored_guest_link() {
    let h = setup().await;
    let wedding = h
        .services
        .weddings
        .create(&owner(), new_wedding("j-and-j-2026"))
        .await
        .unwrap();
    h.services.weddings.publish(&owner(), wedding.id).await.unwrap();
    let guest = h
        .services
        .guests
        .create(&owner(), wedding.id, new_guest("Ana", Some("ana@example.com")))
        .await
        .unwrap();
    let rsvp = h
        .services
        .rsvps
        .submit_public("j-and-j-2026", submission("Ana", Some("ana@example.com"), 0))
        .await
        .unwrap();
    assert_eq!(rsvp.guest_id, Some(guest.id));

    let stores = stores(&h);
    let mut stale = stores.rsvps.get(rsvp.id).await.unwrap().unwrap();
    stores.rsvps.clear_guest(guest.id).await.unwrap();

    stale.status = RsvpStatus::Maybe;
    let written = stores.rsvps.replace(stale).await.unwrap().unwrap();
    assert_eq!(written.status, RsvpStatus::Maybe);
    assert_eq!(written.guest_id, None);
    assert!(stores.rsvps.find_by_guest(guest.id).await.unwrap().is_none());

    let reloaded = stores.rsvps.get(rsvp.id).await.unwrap().unwrap();
    assert_eq!(reloaded.guest_id, None);
    assert_eq!(reloaded.status, RsvpStatus::Maybe);

    assert!(stores.rsvps.replace(reloaded.clone()).await.unwrap().is_some());
    stores.rsvps.delete(rsvp.id).await.unwrap();
    assert!(stores.rsvps.replace(reloaded).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn published_weddings_expire_after_their_event_date() {
    let h = setup().await;
    let wedding = h
        .services
        .weddings
        .create(&owner(), new_wedding("j-and-j-2026"))
        .await
        .unwrap();
    h.services.weddings.publish(&owner(), wedding.id).await.unwrap();
    h.services
        .weddings
        .create(&owner(), new_wedding("still-draft"))
        .await
        .unwrap();

    let stores = stores(&h);
    let at = chrono::DateTime::parse_from_rfc3339("2026-06-21T08:00:00Z")
        .unwrap()
        .with_timezone(&chrono::Utc);
    let event_day = chrono::NaiveDate::from_ymd_opt(2026, 6, 20).unwrap();

    assert_eq!(stores.maintenance.expire_past_weddings(event_day, at).await.unwrap(), 0);
    assert_eq!(
        stores.maintenance.expire_past_weddings(at.date_naive(), at).await.unwrap(),
        1
    );

    let expired = stores.weddings.get(wedding.id).await.unwrap().unwrap();
    assert_eq!(expired.status, wedding_rsvp_core::WeddingStatus::Expired);
    assert_eq!(expired.updated_at, at);
    let public = stores
        .weddings
        .list_public(WeddingFilter::default(), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(public.total, 0);
}
