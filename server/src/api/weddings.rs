//! Wedding management endpoints.
//!
//! - `POST /weddings` - create a draft
//! - `GET /weddings` - the caller's weddings
//! - `GET|PUT|DELETE /weddings/:id`
//! - `POST /weddings/:id/publish`
//! - `POST /weddings/:id/archive`
//! - `GET /weddings/slug/:slug` - owner lookup by slug

use crate::api::created;
use crate::auth::AuthUser;
use crate::state::AppState;
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::Response,
};
use serde::Deserialize;
use wedding_rsvp_core::{
    NewWedding, Page, PageRequest, Wedding, WeddingFilter, WeddingId, WeddingPatch, WeddingStatus,
};
use wedding_rsvp_web::{ApiJson, ApiPath, ApiQuery, WebResult};

/// Query parameters for `GET /weddings`.
#[derive(Debug, Default, Deserialize)]
pub struct ListWeddingsQuery {
    /// Page number, from 1.
    pub page: Option<u32>,
    /// Items per page, at most 100.
    pub page_size: Option<u32>,
    /// Only this lifecycle status.
    pub status: Option<WeddingStatus>,
    /// Substring of title or slug.
    pub search: Option<String>,
}

impl ListWeddingsQuery {
    fn split(self) -> (WeddingFilter, PageRequest) {
        (
            WeddingFilter {
                status: self.status,
                search: self.search,
            },
            PageRequest::new(self.page, self.page_size),
        )
    }
}

/// Create a draft wedding owned by the caller.
///
/// # Errors
///
/// `VALIDATION` or `SLUG_TAKEN`.
pub async fn create_wedding(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiJson(input): ApiJson<NewWedding>,
) -> WebResult<Response> {
    let wedding = state.services.weddings.create(&user, input).await?;
    Ok(created(wedding))
}

/// The caller's weddings, newest first.
///
/// # Errors
///
/// `STORAGE` on backend failure.
pub async fn list_weddings(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiQuery(query): ApiQuery<ListWeddingsQuery>,
) -> WebResult<Json<Page<Wedding>>> {
    let (filter, page) = query.split();
    Ok(Json(state.services.weddings.list_for_user(&user, filter, page).await?))
}

/// One wedding the caller owns.
///
/// # Errors
///
/// `NOT_FOUND` or `UNAUTHORIZED`.
pub async fn get_wedding(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiPath(id): ApiPath<WeddingId>,
) -> WebResult<Json<Wedding>> {
    Ok(Json(state.services.weddings.get(&user, id).await?))
}

/// Owner lookup by slug, regardless of status.
///
/// # Errors
///
/// `NOT_FOUND` or `UNAUTHORIZED`.
pub async fn get_wedding_by_slug(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiPath(slug): ApiPath<String>,
) -> WebResult<Json<Wedding>> {
    Ok(Json(state.services.weddings.get_by_slug_for_owner(&user, &slug).await?))
}

/// Partial update.
///
/// # Errors
///
/// `NOT_FOUND`, `UNAUTHORIZED`, `VALIDATION`, or `SLUG_TAKEN`.
pub async fn update_wedding(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiPath(id): ApiPath<WeddingId>,
    ApiJson(patch): ApiJson<WeddingPatch>,
) -> WebResult<Json<Wedding>> {
    Ok(Json(state.services.weddings.update(&user, id, patch).await?))
}

/// Delete a wedding with its guests and responses.
///
/// # Errors
///
/// `NOT_FOUND` or `UNAUTHORIZED`.
pub async fn delete_wedding(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiPath(id): ApiPath<WeddingId>,
) -> WebResult<StatusCode> {
    state.services.weddings.delete(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Publish a wedding that has couple and event details.
///
/// # Errors
///
/// `NOT_FOUND`, `UNAUTHORIZED`, or `VALIDATION`.
pub async fn publish_wedding(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiPath(id): ApiPath<WeddingId>,
) -> WebResult<Json<Wedding>> {
    Ok(Json(state.services.weddings.publish(&user, id).await?))
}

/// Archive a wedding from any status.
///
/// # Errors
///
/// `NOT_FOUND` or `UNAUTHORIZED`.
pub async fn archive_wedding(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiPath(id): ApiPath<WeddingId>,
) -> WebResult<Json<Wedding>> {
    Ok(Json(state.services.weddings.archive(&user, id).await?))
}
