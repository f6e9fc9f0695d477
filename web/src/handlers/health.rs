//! Health check endpoints.
//!
//! These endpoints are used by load balancers and monitoring systems
//! to verify service health.

use axum::{Json, extract::State, http::StatusCode};
use rsvp_core::store::RecordStore;
use rsvp_runtime::Registry;
use serde::Serialize;

/// Liveness response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the process serves requests
    pub status: &'static str,
    /// Service version
    pub version: &'static str,
    /// Active backend (`primary` or `fallback`)
    pub backend: &'static str,
}

/// Liveness check.
///
/// Does not touch the store; reports which backend is active.
///
/// # Endpoint
///
/// ```text
/// GET /health
/// ```
///
/// # Response
///
/// ```json
/// {"status": "ok", "version": "0.1.0", "backend": "fallback"}
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check(State(registry): State<Registry>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        backend: registry.mode().as_str(),
    })
}

/// Readiness response.
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    /// Whether the active store answered
    pub ready: bool,
    /// Active backend
    pub backend: &'static str,
}

/// Readiness check: pings the active store.
///
/// # Status Codes
///
/// - 200 OK: the store answered
/// - 503 Service Unavailable: it did not
///
/// # Endpoint
///
/// ```text
/// GET /ready
/// ```
pub async fn readiness_check(
    State(registry): State<Registry>,
) -> (StatusCode, Json<ReadinessResponse>) {
    let backend = registry.mode().as_str();
    let ready = match registry.selector().store().ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(backend, error = %e, "Readiness check failed");
            false
        }
    };

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(ReadinessResponse { ready, backend }))
}
