//! REST endpoints under `/api`.

pub mod events;
pub mod registrations;

use serde::Serialize;

/// A body carrying only a human-readable message.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    /// Message text
    pub message: String,
}

impl MessageResponse {
    /// Wrap `message`.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
