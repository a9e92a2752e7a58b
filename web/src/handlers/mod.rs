//! Handlers shared by every deployment.

pub mod health;

pub use health::{Liveness, liveness, readiness_response};
