//! Error taxonomy for repository and seat operations.

use rsvp_core::store::StoreError;
use rsvp_core::validation::{FieldError, ValidationErrors};
use std::fmt;
use thiserror::Error;

/// Why a state transition was refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConflictReason {
    /// No seat left.
    SoldOut,
    /// The user already holds an active registration for the event.
    AlreadyRegistered,
    /// The registration was cancelled before.
    AlreadyCancelled,
    /// A unique field collides with an existing record.
    DuplicateKey,
}

impl ConflictReason {
    /// Machine-readable code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::SoldOut => "SOLD_OUT",
            Self::AlreadyRegistered => "ALREADY_REGISTERED",
            Self::AlreadyCancelled => "ALREADY_CANCELLED",
            Self::DuplicateKey => "DUPLICATE_KEY",
        }
    }

    /// Human-readable message.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::SoldOut => "No seats available for this event",
            Self::AlreadyRegistered => "You are already registered for this event",
            Self::AlreadyCancelled => "Registration already cancelled",
            Self::DuplicateKey => "A record with the same unique key already exists",
        }
    }
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Errors surfaced by repositories and the seat coordinator.
///
/// None of these leave a partial mutation behind.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// Input failed field validation.
    #[error(transparent)]
    ValidationFailed(#[from] ValidationErrors),

    /// Unknown identifier.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity name
        entity: &'static str,
        /// Identifier as supplied
        id: String,
    },

    /// Refused state transition.
    #[error("Conflict: {0}")]
    Conflict(ConflictReason),

    /// Caller does not own the record.
    #[error("Not authorized to modify this {0}")]
    Forbidden(&'static str),

    /// Unexpected store fault during an otherwise valid operation.
    #[error("Storage operation failed: {0}")]
    Storage(#[from] StoreError),
}

impl RegistryError {
    /// Not-found error for an entity.
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Validation error for a single field.
    #[must_use]
    pub fn invalid_field(field: &str, message: &str) -> Self {
        Self::ValidationFailed(ValidationErrors(vec![FieldError::new(field, message)]))
    }

    /// Conflict reason, if this is a conflict.
    #[must_use]
    pub const fn conflict_reason(&self) -> Option<ConflictReason> {
        match self {
            Self::Conflict(reason) => Some(*reason),
            _ => None,
        }
    }
}

/// Result alias for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_codes_are_stable() {
        assert_eq!(ConflictReason::SoldOut.code(), "SOLD_OUT");
        assert_eq!(ConflictReason::AlreadyRegistered.code(), "ALREADY_REGISTERED");
        assert_eq!(ConflictReason::AlreadyCancelled.code(), "ALREADY_CANCELLED");
        assert_eq!(ConflictReason::DuplicateKey.code(), "DUPLICATE_KEY");
    }

    #[test]
    fn not_found_names_entity_and_id() {
        let error = RegistryError::not_found("Event", "abc");
        assert_eq!(error.to_string(), "Event not found: abc");
    }
}
