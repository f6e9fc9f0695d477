//! Registration endpoints (all require a bearer token):
//! - POST /api/registrations - Register for an event
//! - DELETE /api/registrations/:id - Cancel a registration
//! - GET /api/registrations/my-events - List the caller's registrations

use super::MessageResponse;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use rsvp_core::types::{EventId, RegistrationId};
use rsvp_core::validation::FieldError;
use rsvp_runtime::{MyRegistrations, RegistrationDetails};
use rsvp_web::{AppError, AuthenticatedUser};
use serde::{Deserialize, Serialize};

/// Request to register for an event.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    /// Target event
    #[serde(default)]
    pub event_id: Option<String>,
}

/// Response after registering.
#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    /// Success message
    pub message: &'static str,
    /// The registration with its event
    pub registration: RegistrationDetails,
}

/// Register the caller for an event.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:5000/api/registrations \
///   -H "Authorization: Bearer <token>" \
///   -H "Content-Type: application/json" \
///   -d '{"eventId": "550e8400-e29b-41d4-a716-446655440000"}'
/// ```
pub async fn register(
    AuthenticatedUser(user_id): AuthenticatedUser,
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RegisterResponse>), AppError> {
    let Json(request) = payload.map_err(|rejection| AppError::bad_request(rejection.body_text()))?;

    let raw = request
        .event_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| {
            AppError::validation(vec![FieldError::new("eventId", "Event ID is required")])
        })?;
    let event_id: EventId = raw.trim().parse().map_err(|_| AppError::not_found("Event"))?;

    let registration = state.registry.seats.register(user_id, event_id).await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "Successfully registered for the event",
            registration,
        }),
    ))
}

/// Cancel one of the caller's registrations.
pub async fn cancel(
    AuthenticatedUser(user_id): AuthenticatedUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    let registration_id: RegistrationId =
        id.parse().map_err(|_| AppError::not_found("Registration"))?;

    state.registry.seats.cancel(registration_id, user_id).await?;

    Ok(Json(MessageResponse::new("Registration cancelled successfully")))
}

/// The caller's active registrations, split into upcoming and past.
pub async fn my_events(
    AuthenticatedUser(user_id): AuthenticatedUser,
    State(state): State<AppState>,
) -> Result<Json<MyRegistrations>, AppError> {
    Ok(Json(state.registry.seats.my_registrations(user_id).await?))
}
