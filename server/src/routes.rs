//! Router configuration for the RSVP server.

use crate::api::{MessageResponse, events, registrations};
use crate::state::AppState;
use axum::{
    Json, Router,
    extract::State,
    http::header::CONTENT_TYPE,
    response::IntoResponse,
    routing::{delete, get, post},
};
use rsvp_web::AppError;
use rsvp_web::handlers::{health_check, readiness_check};
use rsvp_web::middleware::correlation_id_layer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the complete Axum router.
///
/// - `/`, `/health`, `/ready` and `/metrics` (no authentication)
/// - `/api/events` (public)
/// - `/api/registrations` (bearer token)
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/events", get(events::list_events))
        .route("/events/:id", get(events::get_event))
        .route("/registrations", post(registrations::register))
        .route("/registrations/my-events", get(registrations::my_events))
        .route("/registrations/:id", delete(registrations::cancel));

    Router::new()
        .route("/", get(welcome))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(correlation_id_layer())
        .with_state(state)
}

#[allow(clippy::unused_async)]
async fn welcome() -> Json<MessageResponse> {
    Json(MessageResponse::new("Welcome to Event Management API"))
}

/// Prometheus scrape endpoint.
#[allow(clippy::unused_async)]
async fn metrics(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let body = state
        .metrics
        .as_ref()
        .and_then(|metrics| metrics.render())
        .ok_or_else(|| AppError::not_found("Metrics recorder"))?;
    Ok(([(CONTENT_TYPE, "text/plain; version=0.0.4")], body))
}
