//! Prometheus metrics for registrations and backend selection.
//!
//! Counters are recorded through the `metrics` facade and are no-ops until a
//! recorder is installed with [`MetricsServer::start`].
//!
//! # Example
//!
//! ```rust,no_run
//! use rsvp_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new();
//! server.start()?;
//! let _text = server.render();
//! # Ok(())
//! # }
//! ```

use crate::error::ConflictReason;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use thiserror::Error;

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Installs the Prometheus recorder and renders the scrape payload.
#[derive(Default)]
pub struct MetricsServer {
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create an uninstalled metrics server.
    #[must_use]
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Register descriptions and install the global recorder.
    ///
    /// # Errors
    ///
    /// Returns an error if the exporter cannot be built or installed. An
    /// already-installed recorder is not an error.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!("Metrics recorder installed");
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Render current metrics in Prometheus text format.
    ///
    /// Returns `None` if this server did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

fn register_metrics() {
    describe_counter!(
        "registry_registrations_created_total",
        "Registrations created"
    );
    describe_counter!(
        "registry_registrations_cancelled_total",
        "Registrations cancelled"
    );
    describe_counter!(
        "registry_registrations_rejected_total",
        "Registration attempts refused, labelled by reason"
    );
    describe_counter!(
        "registry_backend_fallback_total",
        "Switches from the primary store to the fallback store"
    );
    describe_counter!(
        "registry_store_batches_rejected_total",
        "Write batches refused by a guard, labelled by backend"
    );
    describe_histogram!(
        "registry_commit_duration_seconds",
        "Time taken to commit a seat batch"
    );
}

/// Seat coordinator metrics recorder.
pub struct RegistrationMetrics;

impl RegistrationMetrics {
    /// Record a registration.
    pub fn record_created(duration: Duration) {
        counter!("registry_registrations_created_total").increment(1);
        histogram!("registry_commit_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a cancellation.
    pub fn record_cancelled(duration: Duration) {
        counter!("registry_registrations_cancelled_total").increment(1);
        histogram!("registry_commit_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a refused transition.
    pub fn record_rejected(reason: ConflictReason) {
        counter!("registry_registrations_rejected_total", "reason" => reason.code())
            .increment(1);
    }
}

/// Backend selector metrics recorder.
pub struct BackendMetrics;

impl BackendMetrics {
    /// Record a switch to the fallback store.
    pub fn record_fallback() {
        counter!("registry_backend_fallback_total").increment(1);
    }
}
