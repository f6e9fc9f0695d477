//! Axum integration for the RSVP registration service.
//!
//! The HTTP layer is a thin shell over [`rsvp_runtime::Registry`]:
//!
//! 1. **Extract** the caller ([`auth::AuthenticatedUser`]) and the request data
//! 2. **Call** a repository or the seat coordinator
//! 3. **Map** the result, or the [`RegistryError`](rsvp_runtime::RegistryError),
//!    to an HTTP response through [`AppError`]
//!
//! # Example
//!
//! ```ignore
//! use rsvp_web::{AppError, auth::AuthenticatedUser};
//!
//! async fn cancel(
//!     AuthenticatedUser(user_id): AuthenticatedUser,
//!     State(state): State<AppState>,
//!     Path(id): Path<String>,
//! ) -> Result<Json<Message>, AppError> {
//!     state.registry.seats.cancel(id.parse()?, user_id).await?;
//!     Ok(Json(Message::new("Registration cancelled successfully")))
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod error;
pub mod handlers;
pub mod middleware;

pub use auth::{
    AuthenticatedUser, SharedVerifier, StaticTokenVerifier, TokenVerifier, TrustedSubjectVerifier,
};
pub use error::AppError;
pub use middleware::{CORRELATION_ID_HEADER, CorrelationId, correlation_id_layer};

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
