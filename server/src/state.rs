//! Application state for the RSVP HTTP server.

use axum::extract::FromRef;
use rsvp_runtime::Registry;
use rsvp_runtime::metrics::MetricsServer;
use rsvp_web::SharedVerifier;
use std::sync::Arc;

/// Application state shared across all HTTP handlers.
///
/// Cloned for each request; every field is a cheap handle.
#[derive(Clone)]
pub struct AppState {
    /// Repositories and the seat coordinator
    pub registry: Registry,

    /// Resolves bearer tokens to users
    pub verifier: SharedVerifier,

    /// Prometheus recorder, when installed
    pub metrics: Option<Arc<MetricsServer>>,
}

impl AppState {
    /// Create a new application state without a metrics recorder.
    #[must_use]
    pub fn new(registry: Registry, verifier: SharedVerifier) -> Self {
        Self {
            registry,
            verifier,
            metrics: None,
        }
    }

    /// Expose `metrics` at `/metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<MetricsServer>) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

impl FromRef<AppState> for Registry {
    fn from_ref(state: &AppState) -> Self {
        state.registry.clone()
    }
}

impl FromRef<AppState> for SharedVerifier {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.verifier)
    }
}
