//! RSVP endpoints for owners.
//!
//! `PUT /rsvps/:id` is the one route that also serves anonymous callers:
//! a respondent may edit their own response inside the edit window.

use crate::api::created;
use crate::auth::{AuthUser, MaybeAuthUser};
use crate::state::AppState;
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::Response,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use wedding_rsvp_core::{
    Page, PageRequest, Rsvp, RsvpFilter, RsvpId, RsvpPatch, RsvpSource, RsvpStatus, RsvpSubmission,
    WeddingId,
};
use wedding_rsvp_runtime::RsvpStatistics;
use wedding_rsvp_web::{ApiJson, ApiPath, ApiQuery, WebResult};

/// Filter parameters shared by the list and export routes.
#[derive(Debug, Default, Deserialize)]
pub struct RsvpQuery {
    /// Page number, from 1. Ignored by export.
    pub page: Option<u32>,
    /// Items per page, at most 100. Ignored by export.
    pub page_size: Option<u32>,
    /// Only this answer.
    pub status: Option<RsvpStatus>,
    /// Only this intake channel.
    pub source: Option<RsvpSource>,
    /// Substring of name or e-mail.
    pub search: Option<String>,
    /// Submitted at or after (RFC 3339).
    pub submitted_after: Option<DateTime<Utc>>,
    /// Submitted at or before (RFC 3339).
    pub submitted_before: Option<DateTime<Utc>>,
}

impl RsvpQuery {
    fn split(self) -> (RsvpFilter, PageRequest) {
        let page = PageRequest::new(self.page, self.page_size);
        (
            RsvpFilter {
                status: self.status,
                source: self.source,
                search: self.search,
                submitted_after: self.submitted_after,
                submitted_before: self.submitted_before,
            },
            page,
        )
    }
}

/// Query parameters for the statistics route.
#[derive(Debug, Default, Deserialize)]
pub struct StatisticsQuery {
    /// Length of the daily trend, in days.
    pub days: Option<u32>,
}

/// A page of a wedding's responses, newest first.
///
/// # Errors
///
/// `NOT_FOUND` or `UNAUTHORIZED`.
pub async fn list_rsvps(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiPath(wedding_id): ApiPath<WeddingId>,
    ApiQuery(query): ApiQuery<RsvpQuery>,
) -> WebResult<Json<Page<Rsvp>>> {
    let (filter, page) = query.split();
    Ok(Json(
        state.services.rsvps.list(&user, wedding_id, filter, page).await?,
    ))
}

/// Record a response on a guest's behalf. Skips the publication and
/// deadline checks.
///
/// # Errors
///
/// `NOT_FOUND`, `UNAUTHORIZED`, `VALIDATION`, `TOO_MANY_PLUS_ONES`, or
/// `DUPLICATE_RSVP`.
pub async fn record_rsvp(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiPath(wedding_id): ApiPath<WeddingId>,
    ApiJson(submission): ApiJson<RsvpSubmission>,
) -> WebResult<Response> {
    let rsvp = state
        .services
        .rsvps
        .record_manual(&user, wedding_id, submission)
        .await?;
    Ok(created(rsvp))
}

/// Aggregate counts and the daily trend.
///
/// # Errors
///
/// `NOT_FOUND` or `UNAUTHORIZED`.
pub async fn rsvp_statistics(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiPath(wedding_id): ApiPath<WeddingId>,
    ApiQuery(query): ApiQuery<StatisticsQuery>,
) -> WebResult<Json<RsvpStatistics>> {
    Ok(Json(
        state
            .services
            .aggregator
            .statistics(&user, wedding_id, query.days)
            .await?,
    ))
}

/// Every matching response, unpaged.
///
/// # Errors
///
/// `NOT_FOUND` or `UNAUTHORIZED`.
pub async fn export_rsvps(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiPath(wedding_id): ApiPath<WeddingId>,
    ApiQuery(query): ApiQuery<RsvpQuery>,
) -> WebResult<Json<Vec<Rsvp>>> {
    let (filter, _) = query.split();
    Ok(Json(
        state.services.rsvps.export(&user, wedding_id, filter).await?,
    ))
}

/// One response.
///
/// # Errors
///
/// `RSVP_NOT_FOUND` or `UNAUTHORIZED`.
pub async fn get_rsvp(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiPath(id): ApiPath<RsvpId>,
) -> WebResult<Json<Rsvp>> {
    Ok(Json(state.services.rsvps.get(&user, id).await?))
}

/// Edit a response. The wedding owner may always edit; anyone else only
/// within the edit window after submission.
///
/// # Errors
///
/// `RSVP_NOT_FOUND`, `RSVP_CANNOT_MODIFY`, `VALIDATION`, or
/// `TOO_MANY_PLUS_ONES`.
pub async fn update_rsvp(
    State(state): State<AppState>,
    MaybeAuthUser(user): MaybeAuthUser,
    ApiPath(id): ApiPath<RsvpId>,
    ApiJson(patch): ApiJson<RsvpPatch>,
) -> WebResult<Json<Rsvp>> {
    Ok(Json(state.services.rsvps.update(user.as_ref(), id, patch).await?))
}

/// Delete a response and unlink its guest.
///
/// # Errors
///
/// `RSVP_NOT_FOUND` or `UNAUTHORIZED`.
pub async fn delete_rsvp(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiPath(id): ApiPath<RsvpId>,
) -> WebResult<StatusCode> {
    state.services.rsvps.delete(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
