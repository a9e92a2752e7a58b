//! Wedding RSVP HTTP server.
//!
//! Couples create a wedding, publish it under a slug, and collect responses
//! from guests through an unauthenticated form. Everything behind the
//! `/api/v1` prefix is served from [`routes::build_router`].
//!
//! # Layout
//!
//! ```text
//! config ──▶ main ──▶ Application (lifecycle)
//!                        │
//!                        ├── Router (routes) ──▶ api::{weddings, guests, rsvps, public}
//!                        │        └── auth extractors, AppState
//!                        └── OrphanSweeper (background)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod auth;
pub mod config;
pub mod lifecycle;
pub mod routes;
pub mod state;

pub use auth::{AuthUser, JwtVerifier, MaybeAuthUser, TokenVerifier};
pub use config::Config;
pub use lifecycle::Application;
pub use routes::build_router;
pub use state::AppState;
