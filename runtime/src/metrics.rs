//! Prometheus metrics for the RSVP runtime.
//!
//! Recorded here:
//! - `rsvp_submissions_total{status}`: accepted responses
//! - `rsvp_rejections_total{kind}`: refused responses by error kind
//! - `reconciliations_total{outcome}` and `reconcile_duration_seconds`
//! - `orphans_swept_total{collection}`
//!
//! # Example
//!
//! ```rust,no_run
//! use wedding_rsvp_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Inside a Tokio runtime: serve metrics at http://0.0.0.0:9090/metrics
//! MetricsServer::new("0.0.0.0:9090".parse()?).start()?;
//! # Ok(())
//! # }
//! ```

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use wedding_rsvp_core::{RsvpError, RsvpStatus};

/// Errors from metrics setup.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to configure the exporter.
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install the recorder or bind the listener.
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus scrape endpoint.
#[derive(Debug, Clone, Copy)]
pub struct MetricsServer {
    addr: SocketAddr,
}

impl MetricsServer {
    /// Endpoint that will listen on `addr`.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    /// Register metric descriptions, install the global recorder and start
    /// the HTTP listener. Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError`] if the exporter cannot be built or installed,
    /// e.g. because a recorder is already installed.
    pub fn start(self) -> Result<(), MetricsError> {
        PrometheusBuilder::new()
            .with_http_listener(self.addr)
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?
            .install()
            .map_err(|e| MetricsError::Install(e.to_string()))?;

        register_metrics();
        tracing::info!(addr = %self.addr, "Metrics available at http://{}/metrics", self.addr);
        Ok(())
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    describe_counter!("rsvp_submissions_total", "RSVPs accepted, by status");
    describe_counter!("rsvp_rejections_total", "RSVP submissions refused, by error kind");
    describe_counter!("reconciliations_total", "Counter reconciliations, by outcome");
    describe_histogram!(
        "reconcile_duration_seconds",
        "Time spent recomputing a wedding's counters"
    );
    describe_counter!(
        "orphans_swept_total",
        "Documents repaired or expired by the sweeper, by collection"
    );
    describe_counter!("effects_executed_total", "Reducer effects carried out, by aggregate and effect");
}

/// RSVP intake recorder.
pub struct RsvpMetrics;

impl RsvpMetrics {
    /// Record an accepted response.
    pub fn record_submission(status: RsvpStatus) {
        counter!("rsvp_submissions_total", "status" => status.as_str()).increment(1);
    }

    /// Record a refused response.
    pub fn record_rejection(err: &RsvpError) {
        counter!("rsvp_rejections_total", "kind" => err.kind()).increment(1);
    }
}

/// Reconciler recorder.
pub struct ReconcileMetrics;

impl ReconcileMetrics {
    /// Record one reconciliation.
    pub fn record(outcome: &'static str, duration: Duration) {
        counter!("reconciliations_total", "outcome" => outcome).increment(1);
        histogram!("reconcile_duration_seconds").record(duration.as_secs_f64());
    }
}

/// Effect executor recorder.
pub struct EffectMetrics;

impl EffectMetrics {
    /// Record one executed effect.
    pub fn record(aggregate: &'static str, effect: &'static str) {
        counter!("effects_executed_total", "aggregate" => aggregate, "effect" => effect).increment(1);
    }
}

/// Sweeper recorder.
pub struct SweepMetrics;

impl SweepMetrics {
    /// Record repaired documents for one collection.
    pub fn record(collection: &'static str, count: u64) {
        if count > 0 {
            counter!("orphans_swept_total", "collection" => collection).increment(count);
        }
    }
}
