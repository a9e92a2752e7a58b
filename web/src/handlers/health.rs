//! Health endpoints for load balancers and orchestrators.

use axum::{Json, http::StatusCode};
use serde::Serialize;
use wedding_rsvp_runtime::HealthReport;

/// Liveness body.
#[derive(Debug, Serialize)]
pub struct Liveness {
    /// Always `"ok"`.
    pub status: &'static str,
    /// Crate version.
    pub version: &'static str,
}

/// `GET /health`: the process is up. Checks no dependencies.
///
/// ```text
/// {"status":"ok","version":"0.1.0"}
/// ```
#[allow(clippy::unused_async)]
pub async fn liveness() -> Json<Liveness> {
    Json(Liveness {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Render a readiness report: 200 unless a component is unhealthy, then 503.
#[must_use]
pub fn readiness_response(report: HealthReport) -> (StatusCode, Json<HealthReport>) {
    let status = if report.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}
