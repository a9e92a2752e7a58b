//! Application state shared by every handler.

use crate::auth::TokenVerifier;
use axum::extract::FromRef;
use std::sync::Arc;
use wedding_rsvp_runtime::Services;

/// Shared resources, cloned per request.
#[derive(Clone)]
pub struct AppState {
    /// Runtime services over the configured stores.
    pub services: Services,
    /// Bearer-token verification.
    pub verifier: Arc<dyn TokenVerifier>,
}

impl AppState {
    /// Bundle services and verifier.
    #[must_use]
    pub fn new(services: Services, verifier: Arc<dyn TokenVerifier>) -> Self {
        Self { services, verifier }
    }
}

impl FromRef<AppState> for Arc<dyn TokenVerifier> {
    fn from_ref(state: &AppState) -> Self {
        state.verifier.clone()
    }
}
