//! HTTP-level tests driving the router with `oneshot`.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use chrono::Duration;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;
use wedding_rsvp_core::environment::Clock;
use wedding_rsvp_core::{UserId, WeddingId};
use wedding_rsvp_runtime::{RuntimeSettings, Services};
use wedding_rsvp_testing::fixtures::{owner, stranger};
use wedding_rsvp_testing::{FixedClock, InMemoryStore, test_clock};
use wedding_server::{AppState, JwtVerifier, build_router};

struct TestApp {
    router: Router,
    store: InMemoryStore,
    services: Services,
    clock: FixedClock,
    owner_token: String,
    stranger_token: String,
}

impl TestApp {
    fn new() -> Self {
        let store = InMemoryStore::new();
        let clock = test_clock();
        let services = Services::new(
            store.stores(),
            Arc::new(clock.clone()),
            RuntimeSettings {
                reconcile_debounce: std::time::Duration::ZERO,
                ..RuntimeSettings::default()
            },
        );
        let verifier = JwtVerifier::new("test-secret", Arc::new(clock.clone()));
        let expires = clock.now() + Duration::days(7);
        let owner_token = verifier.sign(&owner(), expires).unwrap();
        let stranger_token = verifier.sign(&stranger(), expires).unwrap();
        let state = AppState::new(services.clone(), Arc::new(verifier));

        Self {
            router: build_router(state, &[]),
            store,
            services,
            clock,
            owner_token,
            stranger_token,
        }
    }

    async fn send(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    async fn as_owner(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.send(method, uri, Some(self.owner_token.as_str()), body).await
    }

    /// Create and publish a wedding allowing two plus-ones.
    async fn published_wedding(&self, slug: &str) -> String {
        let (status, wedding) = self
            .as_owner(Method::POST, "/api/v1/weddings", Some(wedding_body(slug, 2)))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{wedding}");
        let id = wedding["id"].as_str().unwrap().to_string();
        let (status, _) = self
            .as_owner(Method::POST, &format!("/api/v1/weddings/{id}/publish"), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        id
    }

    async fn submit(&self, slug: &str, body: Value) -> (StatusCode, Value) {
        self.send(Method::POST, &format!("/api/v1/public/weddings/{slug}/rsvp"), None, Some(body))
            .await
    }
}

fn scenario_wedding(slug: &str) -> Value {
    json!({
        "title": "J&J Wedding",
        "slug": slug,
        "couple": {"partner1": {"first": "Jay"}, "partner2": {"first": "Jo"}},
        "event": {
            "title": "Ceremony",
            "date": "2026-06-20",
            "venue_name": "Hall",
            "venue_address": "1 Rd"
        }
    })
}

fn wedding_body(slug: &str, max_plus_ones: u8) -> Value {
    let mut body = scenario_wedding(slug);
    body["rsvp"] = json!({"max_plus_ones": max_plus_ones});
    body
}

fn alex(plus_ones: usize) -> Value {
    let plus_ones: Vec<Value> = (0..plus_ones)
        .map(|i| json!({"first_name": format!("Kim{i}"), "last_name": "Lee"}))
        .collect();
    json!({
        "first_name": "Alex",
        "last_name": "Lee",
        "email": "a@l.com",
        "status": "attending",
        "attendance_count": 1,
        "plus_ones": plus_ones
    })
}

fn responder(name: &str, status: &str, attendance: u32) -> Value {
    json!({
        "first_name": name,
        "last_name": "Guest",
        "email": format!("{}@example.com", name.to_lowercase()),
        "status": status,
        "attendance_count": attendance
    })
}

#[tokio::test]
async fn create_then_publish() {
    let app = TestApp::new();

    let (status, created) = app
        .as_owner(Method::POST, "/api/v1/weddings", Some(scenario_wedding("j-and-j-2026")))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{created}");
    assert_eq!(created["status"], "draft");
    assert_eq!(created["slug"], "j-and-j-2026");
    assert!(created["published_at"].is_null());

    let id = created["id"].as_str().unwrap();
    let (status, published) = app
        .as_owner(Method::POST, &format!("/api/v1/weddings/{id}/publish"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(published["status"], "published");
    assert!(published["published_at"].is_string());
}

#[tokio::test]
async fn duplicate_slug_is_a_conflict() {
    let app = TestApp::new();
    app.published_wedding("j-and-j-2026").await;

    let (status, body) = app
        .as_owner(Method::POST, "/api/v1/weddings", Some(scenario_wedding("j-and-j-2026")))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "SLUG_TAKEN");
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn public_submission_updates_counters() {
    let app = TestApp::new();
    let id = app.published_wedding("j-and-j-2026").await;

    let (status, rsvp) = app.submit("j-and-j-2026", alex(1)).await;
    assert_eq!(status, StatusCode::CREATED, "{rsvp}");
    assert_eq!(rsvp["plus_one_count"], 1);
    assert_eq!(rsvp["source"], "web");

    app.services.reconciler.settle().await;
    let (status, wedding) = app
        .as_owner(Method::GET, &format!("/api/v1/weddings/{id}"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(wedding["rsvp_count"], 1);
    assert_eq!(wedding["total_attending"], 1);
}

#[tokio::test]
async fn second_response_from_same_email_is_rejected() {
    let app = TestApp::new();
    app.published_wedding("j-and-j-2026").await;

    let (status, _) = app.submit("j-and-j-2026", alex(1)).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = app.submit("j-and-j-2026", alex(1)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "DUPLICATE_RSVP");
}

#[tokio::test]
async fn plus_ones_over_the_cap_are_rejected() {
    let app = TestApp::new();
    app.published_wedding("j-and-j-2026").await;

    let (status, body) = app.submit("j-and-j-2026", alex(3)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "TOO_MANY_PLUS_ONES");
}

#[tokio::test]
async fn only_the_owner_may_edit_after_the_window() {
    let app = TestApp::new();
    app.published_wedding("j-and-j-2026").await;
    let (_, rsvp) = app.submit("j-and-j-2026", alex(0)).await;
    let uri = format!("/api/v1/rsvps/{}", rsvp["id"].as_str().unwrap());

    app.clock.advance(Duration::hours(25));
    let patch = json!({"status": "not_attending"});

    let (status, body) = app
        .send(Method::PUT, &uri, Some(app.stranger_token.as_str()), Some(patch.clone()))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "RSVP_CANNOT_MODIFY");

    let (status, body) = app.send(Method::PUT, &uri, None, Some(patch.clone())).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "RSVP_CANNOT_MODIFY");

    let (status, body) = app.as_owner(Method::PUT, &uri, Some(patch)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "not_attending");
}

#[tokio::test]
async fn anonymous_edit_inside_the_window_succeeds() {
    let app = TestApp::new();
    app.published_wedding("j-and-j-2026").await;
    let (_, rsvp) = app.submit("j-and-j-2026", alex(0)).await;
    let uri = format!("/api/v1/rsvps/{}", rsvp["id"].as_str().unwrap());

    app.clock.advance(Duration::hours(23));
    let (status, body) = app
        .send(Method::PUT, &uri, None, Some(json!({"notes": "See you there"})))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["notes"], "See you there");
}

#[tokio::test]
async fn deleting_a_wedding_removes_guests_and_responses() {
    let app = TestApp::new();
    let id = app.published_wedding("j-and-j-2026").await;

    for name in ["Ann", "Ben", "Cat"] {
        let (status, _) = app.submit("j-and-j-2026", responder(name, "attending", 1)).await;
        assert_eq!(status, StatusCode::CREATED);
    }
    for i in 0..5 {
        let guest = json!({"first_name": format!("Guest{i}"), "last_name": "Doe"});
        let (status, body) = app
            .as_owner(Method::POST, &format!("/api/v1/weddings/{id}/guests"), Some(guest))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
    }
    let wedding_id = WeddingId::parse(&id).unwrap();
    assert_eq!(app.store.rsvp_count(wedding_id), 3);
    assert_eq!(app.store.guest_count(wedding_id), 5);

    let (status, _) = app
        .as_owner(Method::DELETE, &format!("/api/v1/weddings/{id}"), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    assert_eq!(app.store.rsvp_count(wedding_id), 0);
    assert_eq!(app.store.guest_count(wedding_id), 0);
    let (status, body) = app
        .as_owner(Method::GET, &format!("/api/v1/weddings/{id}/guests"), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn statistics_count_answers_and_headcount() {
    let app = TestApp::new();
    let id = app.published_wedding("j-and-j-2026").await;

    for body in [
        responder("Ann", "attending", 2),
        responder("Ben", "attending", 1),
        responder("Cat", "not_attending", 1),
        responder("Dan", "maybe", 1),
    ] {
        let (status, rsvp) = app.submit("j-and-j-2026", body).await;
        assert_eq!(status, StatusCode::CREATED, "{rsvp}");
    }

    let (status, stats) = app
        .as_owner(Method::GET, &format!("/api/v1/weddings/{id}/rsvps/statistics"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["attending"], 2);
    assert_eq!(stats["not_attending"], 1);
    assert_eq!(stats["maybe"], 1);
    assert_eq!(stats["total_responses"], 4);
    assert_eq!(stats["total_guests"], 3);
}

#[tokio::test]
async fn owner_routes_require_a_bearer_token() {
    let app = TestApp::new();

    let (status, body) = app.send(Method::GET, "/api/v1/weddings", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHENTICATED");

    let (status, _) = app
        .send(Method::GET, "/api/v1/weddings", Some("not-a-token"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn strangers_cannot_read_other_weddings() {
    let app = TestApp::new();
    let id = app.published_wedding("j-and-j-2026").await;

    let (status, body) = app
        .send(Method::GET, &format!("/api/v1/weddings/{id}"), Some(app.stranger_token.as_str()), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn lists_use_the_paged_envelope() {
    let app = TestApp::new();
    for slug in ["first-wedding", "second-wedding", "third-wedding"] {
        let (status, _) = app
            .as_owner(Method::POST, "/api/v1/weddings", Some(scenario_wedding(slug)))
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, page) = app
        .as_owner(Method::GET, "/api/v1/weddings?page=2&page_size=2", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 3);
    assert_eq!(page["page"], 2);
    assert_eq!(page["page_size"], 2);
    assert_eq!(page["total_pages"], 2);
    assert_eq!(page["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn public_view_hides_owner_fields() {
    let app = TestApp::new();
    app.published_wedding("j-and-j-2026").await;

    let (status, wedding) = app
        .send(Method::GET, "/api/v1/public/weddings/j-and-j-2026", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(wedding["title"], "J&J Wedding");
    assert!(wedding.get("user_id").is_none());
    assert!(wedding.get("rsvp_count").is_none());
}

#[tokio::test]
async fn drafts_are_not_public() {
    let app = TestApp::new();
    let (status, _) = app
        .as_owner(Method::POST, "/api/v1/weddings", Some(scenario_wedding("still-a-draft")))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .send(Method::GET, "/api/v1/public/weddings/still-a-draft", None, None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "WEDDING_NOT_PUBLIC");
}

#[tokio::test]
async fn malformed_bodies_are_validation_errors() {
    let app = TestApp::new();
    app.published_wedding("j-and-j-2026").await;

    let (status, body) = app.submit("j-and-j-2026", json!({"first_name": "Alex"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION");
    assert_eq!(body["field"], "body");

    let (status, body) = app
        .as_owner(Method::GET, "/api/v1/weddings/not-an-id", None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["field"], "path");
}

#[tokio::test]
async fn bulk_import_can_be_rolled_back() {
    let app = TestApp::new();
    let id = app.published_wedding("j-and-j-2026").await;

    let rows = json!({"guests": [
        {"first_name": "Ann", "last_name": "Doe", "email": "ann@example.com"},
        {"first_name": "Ben", "last_name": "Doe", "email": "ben@example.com"},
        {"first_name": "Cat", "last_name": "Doe", "email": "ann@example.com"}
    ]});
    let (status, report) = app
        .as_owner(Method::POST, &format!("/api/v1/weddings/{id}/guests/bulk"), Some(rows))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{report}");
    assert_eq!(report["inserted"], 2);
    assert_eq!(report["errors"].as_array().unwrap().len(), 1);

    let batch = report["import_batch_id"].as_str().unwrap();
    let uri = format!("/api/v1/weddings/{id}/guests/import/{batch}");
    let (status, guests) = app.as_owner(Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(guests.as_array().unwrap().len(), 2);

    let (status, rollback) = app.as_owner(Method::DELETE, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rollback["deleted"], 2);
    assert_eq!(app.store.guest_count(WeddingId::parse(&id).unwrap()), 0);
}

#[tokio::test]
async fn test_token_acts_as_the_dev_user() {
    let store = InMemoryStore::new();
    let clock = test_clock();
    let services = Services::new(store.stores(), Arc::new(clock.clone()), RuntimeSettings::default());
    let verifier = JwtVerifier::new("test-secret", Arc::new(clock))
        .with_test_token(Some("letmein".into()));
    let router = build_router(AppState::new(services.clone(), Arc::new(verifier)), &[]);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/weddings")
        .header(header::AUTHORIZATION, "Bearer letmein")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(scenario_wedding("dev-wedding").to_string()))
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let wedding: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(wedding["user_id"], UserId::new("dev-user").as_str());
}

#[tokio::test]
async fn health_and_readiness() {
    let app = TestApp::new();

    let (status, body) = app.send(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, _) = app.send(Method::GET, "/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn correlation_id_is_echoed() {
    let app = TestApp::new();
    let id = "6f1c1a9e-3c7b-4d4e-9a53-0f2b8e5c7d10";
    let request = Request::builder()
        .uri("/health")
        .header("x-correlation-id", id)
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.headers()["x-correlation-id"], id);
}
