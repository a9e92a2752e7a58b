//! Readiness reporting.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::{Duration, Instant};
use wedding_rsvp_core::Stores;

/// Health of one component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Fully operational.
    Healthy,
    /// Operational but slow.
    Degraded,
    /// Not operational.
    Unhealthy,
}

impl HealthStatus {
    /// The worse of two statuses.
    #[must_use]
    pub const fn worst(self, other: Self) -> Self {
        match (self, other) {
            (Self::Unhealthy, _) | (_, Self::Unhealthy) => Self::Unhealthy,
            (Self::Degraded, _) | (_, Self::Degraded) => Self::Degraded,
            _ => Self::Healthy,
        }
    }
}

/// Result of checking one component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    /// Component name.
    pub component: String,
    /// Its status.
    pub status: HealthStatus,
    /// Details when not healthy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Check latency in milliseconds.
    pub latency_ms: u64,
}

/// All checks plus the overall status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    /// Worst status among the checks.
    pub status: HealthStatus,
    /// Individual checks.
    pub checks: Vec<HealthCheck>,
    /// When the report was produced.
    pub timestamp: DateTime<Utc>,
}

impl HealthReport {
    /// Build a report from its checks.
    #[must_use]
    pub fn new(checks: Vec<HealthCheck>, timestamp: DateTime<Utc>) -> Self {
        let status = checks
            .iter()
            .map(|c| c.status)
            .fold(HealthStatus::Healthy, HealthStatus::worst);
        Self {
            status,
            checks,
            timestamp,
        }
    }

    /// Whether traffic may be routed here.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.status != HealthStatus::Unhealthy
    }
}

/// Ping the store. A ping slower than `slow` is degraded; one that fails or
/// takes longer than `budget` is unhealthy.
pub async fn check_storage(stores: &Stores, slow: Duration, budget: Duration) -> HealthCheck {
    let started = Instant::now();
    let outcome = tokio::time::timeout(budget, stores.maintenance.ping()).await;
    let elapsed = started.elapsed();
    let latency_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);

    let (status, message) = match outcome {
        Ok(Ok(())) if elapsed > slow => (HealthStatus::Degraded, Some(format!("ping took {latency_ms}ms"))),
        Ok(Ok(())) => (HealthStatus::Healthy, None),
        Ok(Err(e)) => (HealthStatus::Unhealthy, Some(e.to_string())),
        Err(_) => (HealthStatus::Unhealthy, Some(format!("no answer within {budget:?}"))),
    };
    HealthCheck {
        component: "storage".to_string(),
        status,
        message,
        latency_ms,
    }
}
