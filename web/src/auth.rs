//! Bearer-token authentication.
//!
//! Token issuance lives outside this service. A [`TokenVerifier`] resolves the
//! opaque token carried in the `Authorization` header into a [`UserId`], and
//! the [`AuthenticatedUser`] extractor rejects the request with 401 when it
//! cannot.
//!
//! # Usage
//!
//! ```rust,ignore
//! use rsvp_web::auth::AuthenticatedUser;
//!
//! async fn my_events(
//!     AuthenticatedUser(user_id): AuthenticatedUser,
//!     State(state): State<AppState>,
//! ) -> Result<Json<MyRegistrations>, AppError> {
//!     Ok(Json(state.registry.seats.my_registrations(user_id).await?))
//! }
//! ```

use crate::error::AppError;
use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use rsvp_core::types::UserId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Message for a request without credentials.
pub const MISSING_TOKEN: &str = "No token, authorization denied";

/// Message for credentials that do not resolve to a user.
pub const INVALID_TOKEN: &str = "Token is not valid";

/// Resolves bearer tokens to user identities.
pub trait TokenVerifier: Send + Sync {
    /// The user the token belongs to, or `None` if it is not valid.
    fn verify(&self, token: &str) -> Option<UserId>;
}

/// Shared verifier handle stored in application state.
pub type SharedVerifier = Arc<dyn TokenVerifier>;

/// A fixed table of tokens.
#[derive(Clone, Default)]
pub struct StaticTokenVerifier {
    tokens: HashMap<String, UserId>,
}

impl StaticTokenVerifier {
    /// Empty table; every token is rejected.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>, user_id: UserId) -> Self {
        self.tokens.insert(token.into(), user_id);
        self
    }

    /// Parse comma-separated `token=userId` pairs.
    ///
    /// Blank entries are skipped.
    ///
    /// # Errors
    ///
    /// Returns the offending entry if it is not a `token=uuid` pair.
    pub fn parse(pairs: &str) -> Result<Self, String> {
        let mut verifier = Self::new();
        for entry in pairs.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (token, user) = entry
                .split_once('=')
                .ok_or_else(|| format!("expected token=userId, got {entry:?}"))?;
            let user_id = user
                .trim()
                .parse::<UserId>()
                .map_err(|_| format!("invalid user id in {entry:?}"))?;
            verifier = verifier.with_token(token.trim(), user_id);
        }
        Ok(verifier)
    }

    /// Number of known tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether no token is known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl fmt::Debug for StaticTokenVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticTokenVerifier")
            .field("tokens", &self.tokens.len())
            .finish()
    }
}

impl TokenVerifier for StaticTokenVerifier {
    fn verify(&self, token: &str) -> Option<UserId> {
        self.tokens.get(token).copied()
    }
}

/// Treats the token itself as the user id.
///
/// For deployments behind a gateway that has already authenticated the caller
/// and forwards the subject as the bearer value.
#[derive(Clone, Copy, Debug, Default)]
pub struct TrustedSubjectVerifier;

impl TokenVerifier for TrustedSubjectVerifier {
    fn verify(&self, token: &str) -> Option<UserId> {
        token.parse().ok()
    }
}

/// Raw token from the `Authorization` header.
///
/// The `Bearer ` prefix is optional.
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or_else(|| AppError::unauthorized(MISSING_TOKEN))?
            .to_str()
            .map_err(|_| AppError::unauthorized(INVALID_TOKEN))?;

        let token = header.strip_prefix("Bearer ").unwrap_or(header).trim();
        if token.is_empty() {
            return Err(AppError::unauthorized(MISSING_TOKEN));
        }

        Ok(Self(token.to_string()))
    }
}

/// The caller's identity, resolved through the state's [`SharedVerifier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser(pub UserId);

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
    SharedVerifier: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let BearerToken(token) = BearerToken::from_request_parts(parts, state).await?;
        let verifier = SharedVerifier::from_ref(state);

        match verifier.verify(&token) {
            Some(user_id) => Ok(Self(user_id)),
            None => {
                tracing::debug!("Rejected bearer token");
                Err(AppError::unauthorized(INVALID_TOKEN))
            }
        }
    }
}
