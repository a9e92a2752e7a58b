//! Axum integration for the wedding RSVP service.
//!
//! This crate holds the HTTP plumbing that does not depend on routes:
//!
//! - [`AppError`]: maps [`RsvpError`](wedding_rsvp_core::RsvpError) kinds to
//!   status codes and a `{error, code, field?}` body
//! - [`ApiJson`], [`ApiQuery`], [`ApiPath`]: extractors whose rejections are
//!   `VALIDATION` errors
//! - [`correlation_id_layer`]: request span and `X-Correlation-ID` echo
//! - [`handlers::liveness`] and [`handlers::readiness_response`]
//!
//! # Request flow
//!
//! ```text
//! request ─▶ correlation id ─▶ extractors ─▶ handler ─▶ runtime service
//!                                  │                          │
//!                                  └──── AppError ◀── RsvpError
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;

pub use error::{AppError, status_for};
pub use extractors::{ApiJson, ApiPath, ApiQuery, CorrelationId};
pub use middleware::{CORRELATION_ID_HEADER, correlation_id_layer};

/// Result type for handlers.
pub type WebResult<T> = Result<T, AppError>;
