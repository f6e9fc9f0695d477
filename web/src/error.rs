//! HTTP rendering of failures.
//!
//! [`AppError`] is what every handler returns on failure. It is built from a
//! [`RegistryError`] or directly through one of its constructors and renders
//! as `{code, message, fields?}`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rsvp_core::validation::FieldError;
use rsvp_runtime::RegistryError;
use serde::Serialize;
use std::fmt;

/// A failed request: status, machine code, user-facing message.
///
/// # Examples
///
/// ```ignore
/// async fn handler(State(state): State<AppState>) -> Result<Json<Event>, AppError> {
///     let event = state.registry.events.find_by_id(id).await?
///         .ok_or_else(|| AppError::not_found("Event"))?;
///     Ok(Json(event))
/// }
/// ```
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
    /// Offending fields of a validation failure
    fields: Vec<FieldError>,
    /// Logged for server errors, never sent to the client
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Error with an explicit status and code.
    #[must_use]
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            fields: Vec::new(),
            source: None,
        }
    }

    /// Attach the underlying cause.
    #[must_use]
    pub fn with_source(self, source: impl Into<anyhow::Error>) -> Self {
        Self {
            source: Some(source.into()),
            ..self
        }
    }

    /// HTTP status of the response.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.code
    }

    /// 400 with code `BAD_REQUEST`.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    /// 400 with code `VALIDATION_ERROR`, listing the offending fields.
    ///
    /// A single field's message becomes the error message.
    #[must_use]
    pub fn validation(fields: Vec<FieldError>) -> Self {
        let message = match fields.as_slice() {
            [only] => only.message.clone(),
            _ => "Validation failed".to_string(),
        };
        Self {
            fields,
            ..Self::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message)
        }
    }

    /// 401.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    /// 403.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "FORBIDDEN", message)
    }

    /// 404 reading "`resource` not found".
    #[must_use]
    pub fn not_found(resource: impl fmt::Display) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{resource} not found"),
        )
    }

    /// 500 with a generic message.
    #[must_use]
    pub fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "An internal error occurred",
        )
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.status.as_u16(), self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| &**e as &(dyn std::error::Error + 'static))
    }
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fields: Vec<FieldError>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            match &self.source {
                Some(cause) => tracing::error!(code = self.code, error = %cause, "Request failed"),
                None => tracing::error!(code = self.code, message = %self.message, "Request failed"),
            }
        }

        let body = ErrorBody {
            code: self.code,
            message: self.message,
            fields: self.fields,
        };
        (self.status, Json(body)).into_response()
    }
}

/// Map the registry taxonomy onto HTTP.
///
/// Conflicts are client errors (400) carrying the reason code; storage
/// faults are rendered generically and keep the cause for logging.
impl From<RegistryError> for AppError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::ValidationFailed(errors) => Self::validation(errors.0),
            RegistryError::NotFound { entity, .. } => Self::not_found(entity),
            RegistryError::Conflict(reason) => {
                Self::new(StatusCode::BAD_REQUEST, reason.code(), reason.message())
            }
            RegistryError::Forbidden(entity) => {
                Self::forbidden(format!("Not authorized to cancel this {entity}"))
            }
            err @ RegistryError::Storage(_) => Self::internal().with_source(err),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal().with_source(err)
    }
}
