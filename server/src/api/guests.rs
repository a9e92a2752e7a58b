//! Guest list endpoints, all owner-only.
//!
//! - `POST /weddings/:wedding_id/guests`
//! - `POST /weddings/:wedding_id/guests/bulk`
//! - `GET /weddings/:wedding_id/guests`
//! - `GET|PUT|DELETE /weddings/:wedding_id/guests/:guest_id`
//! - `GET|DELETE /weddings/:wedding_id/guests/import/:batch_id`

use crate::api::created;
use crate::auth::AuthUser;
use crate::state::AppState;
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::Response,
};
use serde::{Deserialize, Serialize};
use wedding_rsvp_core::{
    Guest, GuestFilter, GuestId, GuestPatch, ImportBatchId, InvitationStatus, NewGuest, Page,
    PageRequest, RsvpError, Side, UserId, WeddingId,
};
use wedding_rsvp_web::{ApiJson, ApiPath, ApiQuery, WebResult};

/// Query parameters for `GET /weddings/:wedding_id/guests`.
#[derive(Debug, Default, Deserialize)]
pub struct ListGuestsQuery {
    /// Page number, from 1.
    pub page: Option<u32>,
    /// Items per page, at most 100.
    pub page_size: Option<u32>,
    /// Only guests of this side.
    pub side: Option<Side>,
    /// Only this invitation status.
    pub invitation_status: Option<InvitationStatus>,
    /// Only guests with (or without) a linked response.
    pub has_rsvp: Option<bool>,
    /// Substring of name or e-mail.
    pub search: Option<String>,
}

impl ListGuestsQuery {
    fn split(self) -> (GuestFilter, PageRequest) {
        (
            GuestFilter {
                side: self.side,
                invitation_status: self.invitation_status,
                has_rsvp: self.has_rsvp,
                search: self.search,
            },
            PageRequest::new(self.page, self.page_size),
        )
    }
}

/// Body of `POST /weddings/:wedding_id/guests/bulk`.
#[derive(Debug, Deserialize)]
pub struct BulkGuestsRequest {
    /// Rows to insert, in order.
    pub guests: Vec<NewGuest>,
}

/// Result of a rollback.
#[derive(Debug, Serialize)]
pub struct RollbackResponse {
    /// The import that was undone.
    pub import_batch_id: ImportBatchId,
    /// Guests removed.
    pub deleted: u64,
}

/// Add one guest.
///
/// # Errors
///
/// `NOT_FOUND`, `UNAUTHORIZED`, `VALIDATION`, or `DUPLICATE_GUEST`.
pub async fn create_guest(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiPath(wedding_id): ApiPath<WeddingId>,
    ApiJson(input): ApiJson<NewGuest>,
) -> WebResult<Response> {
    let guest = state.services.guests.create(&user, wedding_id, input).await?;
    Ok(created(guest))
}

/// Import many guests at once. Rows that fail are reported, the rest are
/// kept under one import batch id.
///
/// # Errors
///
/// `NOT_FOUND`, `UNAUTHORIZED`, or `VALIDATION` for an empty list.
pub async fn bulk_create_guests(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiPath(wedding_id): ApiPath<WeddingId>,
    ApiJson(body): ApiJson<BulkGuestsRequest>,
) -> WebResult<Response> {
    let report = state
        .services
        .guests
        .bulk_create(&user, wedding_id, body.guests)
        .await?;
    Ok(created(report))
}

/// A page of the guest list.
///
/// # Errors
///
/// `NOT_FOUND` or `UNAUTHORIZED`.
pub async fn list_guests(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiPath(wedding_id): ApiPath<WeddingId>,
    ApiQuery(query): ApiQuery<ListGuestsQuery>,
) -> WebResult<Json<Page<Guest>>> {
    let (filter, page) = query.split();
    Ok(Json(
        state.services.guests.list(&user, wedding_id, filter, page).await?,
    ))
}

async fn guest_of(
    state: &AppState,
    user: &UserId,
    wedding_id: WeddingId,
    guest_id: GuestId,
) -> WebResult<Guest> {
    let guest = state.services.guests.get(user, guest_id).await?;
    if guest.wedding_id != wedding_id {
        return Err(RsvpError::not_found("guest", guest_id).into());
    }
    Ok(guest)
}

/// One guest.
///
/// # Errors
///
/// `NOT_FOUND` (including a guest of another wedding) or `UNAUTHORIZED`.
pub async fn get_guest(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiPath((wedding_id, guest_id)): ApiPath<(WeddingId, GuestId)>,
) -> WebResult<Json<Guest>> {
    Ok(Json(guest_of(&state, &user, wedding_id, guest_id).await?))
}

/// Partial update of a guest.
///
/// # Errors
///
/// `NOT_FOUND`, `UNAUTHORIZED`, `VALIDATION`, or `DUPLICATE_GUEST`.
pub async fn update_guest(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiPath((wedding_id, guest_id)): ApiPath<(WeddingId, GuestId)>,
    ApiJson(patch): ApiJson<GuestPatch>,
) -> WebResult<Json<Guest>> {
    guest_of(&state, &user, wedding_id, guest_id).await?;
    Ok(Json(state.services.guests.update(&user, guest_id, patch).await?))
}

/// Remove a guest. A linked response stays but loses its guest link.
///
/// # Errors
///
/// `NOT_FOUND` or `UNAUTHORIZED`.
pub async fn delete_guest(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiPath((wedding_id, guest_id)): ApiPath<(WeddingId, GuestId)>,
) -> WebResult<StatusCode> {
    guest_of(&state, &user, wedding_id, guest_id).await?;
    state.services.guests.delete(&user, guest_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Guests created by one bulk import.
///
/// # Errors
///
/// `NOT_FOUND` or `UNAUTHORIZED`.
pub async fn list_import_batch(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiPath((wedding_id, batch)): ApiPath<(WeddingId, ImportBatchId)>,
) -> WebResult<Json<Vec<Guest>>> {
    Ok(Json(
        state
            .services
            .guests
            .list_import_batch(&user, wedding_id, batch)
            .await?,
    ))
}

/// Undo a bulk import.
///
/// # Errors
///
/// `NOT_FOUND` or `UNAUTHORIZED`.
pub async fn rollback_import_batch(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiPath((wedding_id, batch)): ApiPath<(WeddingId, ImportBatchId)>,
) -> WebResult<Json<RollbackResponse>> {
    let deleted = state
        .services
        .guests
        .rollback_import_batch(&user, wedding_id, batch)
        .await?;
    Ok(Json(RollbackResponse {
        import_batch_id: batch,
        deleted,
    }))
}
