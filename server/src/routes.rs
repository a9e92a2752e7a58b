//! Router configuration.
//!
//! `/health` and `/ready` sit at the root; everything else is nested under
//! `/api/v1`.

use crate::api::{guests, public, rsvps, weddings};
use crate::state::AppState;
use axum::{
    Json, Router,
    extract::State,
    http::{HeaderValue, StatusCode},
    routing::{get, post},
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use wedding_rsvp_runtime::HealthReport;
use wedding_rsvp_web::correlation_id_layer;
use wedding_rsvp_web::handlers::{liveness, readiness_response};

/// Build the complete router.
///
/// An empty `allowed_origins` allows any origin.
pub fn build_router(state: AppState, allowed_origins: &[String]) -> Router {
    let api_routes = Router::new()
        // Weddings
        .route("/weddings", post(weddings::create_wedding).get(weddings::list_weddings))
        .route(
            "/weddings/:id",
            get(weddings::get_wedding)
                .put(weddings::update_wedding)
                .delete(weddings::delete_wedding),
        )
        .route("/weddings/:id/publish", post(weddings::publish_wedding))
        .route("/weddings/:id/archive", post(weddings::archive_wedding))
        .route("/weddings/slug/:slug", get(weddings::get_wedding_by_slug))
        // RSVPs
        .route("/weddings/:id/rsvps", get(rsvps::list_rsvps).post(rsvps::record_rsvp))
        .route("/weddings/:id/rsvps/statistics", get(rsvps::rsvp_statistics))
        .route("/weddings/:id/rsvps/export", get(rsvps::export_rsvps))
        .route(
            "/rsvps/:id",
            get(rsvps::get_rsvp)
                .put(rsvps::update_rsvp)
                .delete(rsvps::delete_rsvp),
        )
        // Guests
        .route("/weddings/:id/guests", post(guests::create_guest).get(guests::list_guests))
        .route("/weddings/:id/guests/bulk", post(guests::bulk_create_guests))
        .route(
            "/weddings/:id/guests/import/:batch_id",
            get(guests::list_import_batch).delete(guests::rollback_import_batch),
        )
        .route(
            "/weddings/:id/guests/:guest_id",
            get(guests::get_guest)
                .put(guests::update_guest)
                .delete(guests::delete_guest),
        )
        // Public
        .route("/public/weddings", get(public::list_public_weddings))
        .route("/public/weddings/:slug", get(public::get_public_wedding))
        .route("/public/weddings/:slug/rsvp", post(public::submit_rsvp));

    Router::new()
        .route("/health", get(liveness))
        .route("/ready", get(readiness))
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors(allowed_origins))
        .layer(correlation_id_layer())
        .with_state(state)
}

async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    readiness_response(state.services.readiness().await)
}

fn cors(allowed_origins: &[String]) -> CorsLayer {
    let origin = if allowed_origins.is_empty() {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|o| match HeaderValue::from_str(o) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };
    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(Any)
        .allow_headers(Any)
}
