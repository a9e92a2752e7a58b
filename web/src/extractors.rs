//! Request extractors.
//!
//! `ApiJson`, `ApiQuery` and `ApiPath` wrap the axum extractors of the same
//! name and reject with [`AppError`], so a malformed body, query string or
//! path segment yields a `VALIDATION` response.
//!
//! ```ignore
//! async fn submit(
//!     ApiPath(slug): ApiPath<String>,
//!     correlation_id: CorrelationId,
//!     ApiJson(body): ApiJson<RsvpSubmission>,
//! ) -> Result<impl IntoResponse, AppError> { ... }
//! ```

use crate::error::AppError;
use crate::middleware::CORRELATION_ID_HEADER;
use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts},
    http::request::Parts,
};
use std::fmt;
use uuid::Uuid;

/// JSON body rejected as `VALIDATION` when malformed.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// Query string rejected as `VALIDATION` when malformed.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct ApiQuery<T>(pub T);

/// Path parameters rejected as `VALIDATION` when malformed.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct ApiPath<T>(pub T);

/// Correlation id of the current request.
///
/// Set by [`correlation_id_layer`](crate::middleware::correlation_id_layer);
/// without the layer it is read from `X-Correlation-ID` or minted fresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrelationId(pub Uuid);

impl CorrelationId {
    /// Read from a header value, or mint a new v4 id.
    #[must_use]
    pub fn from_header(value: Option<&http::HeaderValue>) -> Self {
        Self(
            value
                .and_then(|v| v.to_str().ok())
                .and_then(|s| Uuid::parse_str(s.trim()).ok())
                .unwrap_or_else(Uuid::new_v4),
        )
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CorrelationId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(id) = parts.extensions.get::<Self>() {
            return Ok(*id);
        }
        Ok(Self::from_header(parts.headers.get(CORRELATION_ID_HEADER)))
    }
}
