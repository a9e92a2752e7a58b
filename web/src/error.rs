//! HTTP error responses.
//!
//! Every failure leaves the service as a JSON body
//!
//! ```json
//! {"error": "at most 2 plus-ones are allowed, got 3", "code": "TOO_MANY_PLUS_ONES"}
//! ```
//!
//! with `field` added for validation errors. Domain errors convert with `?`
//! through `From<RsvpError>`; extractor rejections convert the same way so
//! malformed input is reported as `VALIDATION` rather than axum's plain-text
//! defaults.

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::fmt;
use wedding_rsvp_core::RsvpError;

/// Error returned by handlers.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
    field: Option<String>,
    /// Logged for server errors, never sent to the client.
    detail: Option<String>,
}

impl AppError {
    /// An error with an explicit status and code.
    #[must_use]
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            field: None,
            detail: None,
        }
    }

    /// 401 for a missing or unusable bearer token.
    #[must_use]
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHENTICATED", message)
    }

    /// 400 for a malformed field.
    #[must_use]
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            ..Self::new(StatusCode::BAD_REQUEST, "VALIDATION", message)
        }
    }

    /// 500 with a generic message; `detail` is only logged.
    #[must_use]
    pub fn internal(detail: impl fmt::Display) -> Self {
        Self {
            detail: Some(detail.to_string()),
            ..Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "STORAGE",
                "An internal error occurred",
            )
        }
    }

    /// HTTP status of the response.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.code
    }

    /// Offending field, for validation errors.
    #[must_use]
    pub fn field(&self) -> Option<&str> {
        self.field.as_deref()
    }
}

/// HTTP status for each error kind.
#[must_use]
pub const fn status_for(err: &RsvpError) -> StatusCode {
    match err {
        RsvpError::Validation { .. } => StatusCode::BAD_REQUEST,
        RsvpError::Unauthorized | RsvpError::WeddingNotPublic => StatusCode::FORBIDDEN,
        RsvpError::NotFound { .. } | RsvpError::RsvpNotFound(_) => StatusCode::NOT_FOUND,
        RsvpError::SlugTaken(_) | RsvpError::DuplicateRsvp(_) | RsvpError::DuplicateGuest(_) => {
            StatusCode::CONFLICT
        }
        RsvpError::TooManyPlusOnes { .. }
        | RsvpError::RsvpClosed(_)
        | RsvpError::RsvpCannotModify => StatusCode::UNPROCESSABLE_ENTITY,
        RsvpError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<RsvpError> for AppError {
    fn from(err: RsvpError) -> Self {
        match err {
            RsvpError::Storage(_) => Self::internal(&err),
            RsvpError::Validation { field, message } => Self::validation(field, message),
            other => Self::new(status_for(&other), other.kind(), other.to_string()),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::validation("body", rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::validation("query", rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        Self::validation("path", rejection.body_text())
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(
                status = %self.status,
                code = self.code,
                detail = self.detail.as_deref().unwrap_or_default(),
                "Request failed"
            );
        } else {
            tracing::debug!(status = %self.status, code = self.code, "Request rejected");
        }

        let body = ErrorBody {
            error: self.message,
            code: self.code,
            field: self.field,
        };
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_of(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn kinds_map_to_statuses() {
        let cases = [
            (RsvpError::validation("slug", "bad"), 400),
            (RsvpError::Unauthorized, 403),
            (RsvpError::WeddingNotPublic, 403),
            (RsvpError::not_found("wedding", "x"), 404),
            (RsvpError::RsvpNotFound("x".into()), 404),
            (RsvpError::SlugTaken("a".into()), 409),
            (RsvpError::DuplicateRsvp("email".into()), 409),
            (RsvpError::DuplicateGuest("a@b.c".into()), 409),
            (RsvpError::TooManyPlusOnes { max: 2, given: 3 }, 422),
            (RsvpError::RsvpClosed("deadline passed".into()), 422),
            (RsvpError::RsvpCannotModify, 422),
            (RsvpError::Storage("boom".into()), 500),
        ];
        for (err, status) in cases {
            assert_eq!(status_for(&err).as_u16(), status, "{}", err.kind());
        }
    }

    #[tokio::test]
    async fn validation_body_names_the_field() {
        let (status, body) =
            body_of(RsvpError::validation("plus_ones[0].first_name", "required").into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION");
        assert_eq!(body["field"], "plus_ones[0].first_name");
        assert_eq!(body["error"], "required");
    }

    #[tokio::test]
    async fn domain_errors_omit_field() {
        let (status, body) = body_of(RsvpError::SlugTaken("j-and-j-2026".into()).into()).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "SLUG_TAKEN");
        assert!(body.get("field").is_none());
    }

    #[tokio::test]
    async fn storage_details_are_not_leaked() {
        let err: AppError = RsvpError::storage("insert rsvp", "connection reset").into();
        let (status, body) = body_of(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["code"], "STORAGE");
        assert!(!body["error"].as_str().unwrap().contains("connection reset"));
    }

    #[test]
    fn display_includes_code() {
        let err = AppError::unauthenticated("missing bearer token");
        assert_eq!(err.to_string(), "[UNAUTHENTICATED] missing bearer token");
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }
}
