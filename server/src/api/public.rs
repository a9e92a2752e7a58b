//! Unauthenticated endpoints behind the invitation page.
//!
//! - `GET /public/weddings` - published public weddings
//! - `GET /public/weddings/:slug` - one of them (counts a page view)
//! - `POST /public/weddings/:slug/rsvp` - submit a response

use crate::api::created;
use crate::state::AppState;
use axum::{Json, extract::State, response::Response};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use wedding_rsvp_core::{
    Couple, EventDetails, Page, PageRequest, RsvpSettings, RsvpSubmission, Slug, Theme, Wedding,
    WeddingFilter, WeddingId,
};
use wedding_rsvp_web::{ApiJson, ApiPath, ApiQuery, CorrelationId, WebResult};

/// What guests see of a wedding. Owner id and counters stay private.
#[derive(Debug, Clone, Serialize)]
pub struct PublicWedding {
    /// Wedding id.
    pub id: WeddingId,
    /// Public address.
    pub slug: Slug,
    /// Title.
    pub title: String,
    /// The couple.
    pub couple: Option<Couple>,
    /// The event.
    pub event: Option<EventDetails>,
    /// Presentation.
    pub theme: Theme,
    /// How responses are collected.
    pub rsvp: RsvpSettings,
    /// When the wedding went live.
    pub published_at: Option<DateTime<Utc>>,
}

impl From<Wedding> for PublicWedding {
    fn from(w: Wedding) -> Self {
        Self {
            id: w.id,
            slug: w.slug,
            title: w.title,
            couple: w.couple,
            event: w.event,
            theme: w.theme,
            rsvp: w.rsvp,
            published_at: w.published_at,
        }
    }
}

/// Query parameters for `GET /public/weddings`.
#[derive(Debug, Default, Deserialize)]
pub struct PublicListQuery {
    /// Page number, from 1.
    pub page: Option<u32>,
    /// Items per page, at most 100.
    pub page_size: Option<u32>,
    /// Substring of title or slug.
    pub search: Option<String>,
}

/// Published public weddings, soonest event first.
///
/// # Errors
///
/// `STORAGE` on backend failure.
pub async fn list_public_weddings(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<PublicListQuery>,
) -> WebResult<Json<Page<PublicWedding>>> {
    let filter = WeddingFilter {
        status: None,
        search: query.search,
    };
    let page = PageRequest::new(query.page, query.page_size);
    let weddings = state.services.weddings.list_public(filter, page).await?;
    Ok(Json(weddings.map(PublicWedding::from)))
}

/// A published public wedding by slug.
///
/// # Errors
///
/// `NOT_FOUND` or `WEDDING_NOT_PUBLIC`.
pub async fn get_public_wedding(
    State(state): State<AppState>,
    ApiPath(slug): ApiPath<String>,
) -> WebResult<Json<PublicWedding>> {
    let wedding = state.services.weddings.get_public(&slug).await?;
    Ok(Json(wedding.into()))
}

/// Submit a response to a published wedding.
///
/// # Errors
///
/// `NOT_FOUND`, `WEDDING_NOT_PUBLIC`, `RSVP_CLOSED`, `VALIDATION`,
/// `TOO_MANY_PLUS_ONES`, or `DUPLICATE_RSVP`.
pub async fn submit_rsvp(
    State(state): State<AppState>,
    correlation_id: CorrelationId,
    ApiPath(slug): ApiPath<String>,
    ApiJson(submission): ApiJson<RsvpSubmission>,
) -> WebResult<Response> {
    let rsvp = state.services.rsvps.submit_public(&slug, submission).await?;
    tracing::info!(
        %correlation_id,
        rsvp_id = %rsvp.id,
        wedding_id = %rsvp.wedding_id,
        "RSVP submitted"
    );
    Ok(created(rsvp))
}
