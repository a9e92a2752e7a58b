//! HTTP handlers, grouped by resource.
//!
//! Every route lives under `/api/v1`. Owner routes take [`AuthUser`]; the
//! public routes take no credentials. List endpoints return the paged
//! envelope `{data, total, page, page_size, total_pages}`.
//!
//! [`AuthUser`]: crate::auth::AuthUser

pub mod guests;
pub mod public;
pub mod rsvps;
pub mod weddings;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// `201 Created` with a JSON body.
pub(crate) fn created<T: Serialize>(body: T) -> Response {
    (StatusCode::CREATED, Json(body)).into_response()
}
