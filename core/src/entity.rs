//! Persisted entity metadata.
//!
//! [`Entity`] ties a domain type to its collection, its validation rules and
//! its uniqueness constraint. Repositories are generic over it.

use crate::document::{Collection, Document};
use crate::query::Filter;
use crate::types::{Event, Registration, RegistrationStatus, User};
use crate::validation::{FieldError, FieldRule, Rule};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use uuid::Uuid;

/// A domain type stored as a document.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Collection holding this entity.
    const COLLECTION: Collection;

    /// Human-readable name used in errors.
    const NAME: &'static str;

    /// Field rules checked before every write.
    const RULES: &'static [FieldRule];

    /// Fields a partial update may not touch. They are set at creation and
    /// afterwards written only by the seat coordinator, if at all.
    const PROTECTED: &'static [&'static str] = &[];

    /// Store identity.
    fn id(&self) -> Uuid;

    /// Canonicalize field values before validation and insertion.
    fn normalize(&mut self) {}

    /// Canonicalize a partial update the same way [`Entity::normalize`] does.
    fn normalize_patch(_patch: &mut Document) {}

    /// Filter that must match no existing record for an insert to succeed.
    fn unique_key(&self) -> Option<Filter> {
        None
    }

    /// Cross-field checks that rules cannot express.
    fn check(&self, _errors: &mut Vec<FieldError>) {}
}

fn trim_in_place(value: &mut String) {
    let trimmed = value.trim();
    if trimmed.len() != value.len() {
        *value = trimmed.to_string();
    }
}

impl Entity for User {
    const COLLECTION: Collection = Collection::Users;
    const NAME: &'static str = "User";
    const RULES: &'static [FieldRule] = &[
        FieldRule::new("name", Rule::Required, "Please provide a name"),
        FieldRule::new("email", Rule::Required, "Please provide an email"),
        FieldRule::new("password", Rule::Required, "Please provide a password"),
        FieldRule::new(
            "password",
            Rule::MinLength(6),
            "Password must be at least 6 characters",
        ),
    ];

    fn id(&self) -> Uuid {
        *self.id.as_uuid()
    }

    fn normalize(&mut self) {
        trim_in_place(&mut self.name);
        self.email = self.email.trim().to_lowercase();
    }

    fn normalize_patch(patch: &mut Document) {
        if let Some(Value::String(email)) = patch.get_mut("email") {
            *email = email.trim().to_lowercase();
        }
        if let Some(Value::String(name)) = patch.get_mut("name") {
            trim_in_place(name);
        }
    }

    fn unique_key(&self) -> Option<Filter> {
        Some(Filter::new().eq("email", self.email.as_str()))
    }
}

impl Entity for Event {
    const COLLECTION: Collection = Collection::Events;
    const NAME: &'static str = "Event";
    const RULES: &'static [FieldRule] = &[
        FieldRule::new("name", Rule::Required, "Please provide event name"),
        FieldRule::new("organizer", Rule::Required, "Please provide organizer name"),
        FieldRule::new("location", Rule::Required, "Please provide event location"),
        FieldRule::new("date", Rule::Required, "Please provide event date"),
        FieldRule::new("description", Rule::Required, "Please provide event description"),
        FieldRule::new("category", Rule::Required, "Please provide event category"),
        FieldRule::new("capacity", Rule::Required, "Please provide event capacity"),
        FieldRule::new("capacity", Rule::Min(1), "Capacity must be at least 1"),
        FieldRule::new("availableSeats", Rule::Min(0), "Available seats cannot be negative"),
    ];
    const PROTECTED: &'static [&'static str] = &["capacity", "availableSeats"];

    fn id(&self) -> Uuid {
        *self.id.as_uuid()
    }

    fn normalize(&mut self) {
        trim_in_place(&mut self.name);
        trim_in_place(&mut self.organizer);
        trim_in_place(&mut self.location);
        trim_in_place(&mut self.description);
        trim_in_place(&mut self.category);
    }

    fn normalize_patch(patch: &mut Document) {
        for field in ["name", "organizer", "location", "description", "category"] {
            if let Some(Value::String(value)) = patch.get_mut(field) {
                trim_in_place(value);
            }
        }
    }

    fn check(&self, errors: &mut Vec<FieldError>) {
        if self.available_seats > self.capacity {
            errors.push(FieldError::new(
                "availableSeats",
                "Available seats cannot exceed capacity",
            ));
        }
    }
}

impl Entity for Registration {
    const COLLECTION: Collection = Collection::Registrations;
    const NAME: &'static str = "Registration";
    const RULES: &'static [FieldRule] = &[
        FieldRule::new("userId", Rule::Required, "User reference is required"),
        FieldRule::new("eventId", Rule::Required, "Event reference is required"),
    ];
    const PROTECTED: &'static [&'static str] = &["userId", "eventId", "status"];

    fn id(&self) -> Uuid {
        *self.id.as_uuid()
    }

    fn unique_key(&self) -> Option<Filter> {
        self.is_active().then(|| {
            Filter::new()
                .eq("userId", self.user_id)
                .eq("eventId", self.event_id)
                .eq("status", RegistrationStatus::Active)
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::document::to_document;
    use crate::types::{EventId, UserId};
    use chrono::Utc;

    #[test]
    fn user_email_is_normalized_for_uniqueness() {
        let mut user = User::new(" Ada ", "  Ada@Example.COM ", "secret1", Utc::now());
        user.normalize();
        assert_eq!(user.name, "Ada");
        assert_eq!(user.email, "ada@example.com");

        let key = user.unique_key().unwrap();
        assert!(key.matches(&to_document(&user).unwrap()));
    }

    #[test]
    fn cancelled_registrations_have_no_unique_key() {
        let mut registration = Registration::new(UserId::new(), EventId::new(), Utc::now());
        assert!(registration.unique_key().is_some());
        registration.status = RegistrationStatus::Cancelled;
        assert!(registration.unique_key().is_none());
    }

    #[test]
    fn active_key_matches_only_the_same_pair() {
        let registration = Registration::new(UserId::new(), EventId::new(), Utc::now());
        let other = Registration::new(UserId::new(), registration.event_id, Utc::now());
        let key = registration.unique_key().unwrap();
        assert!(key.matches(&to_document(&registration).unwrap()));
        assert!(!key.matches(&to_document(&other).unwrap()));
    }

    #[test]
    fn event_seats_cannot_exceed_capacity() {
        let mut event = Event::new("n", "o", "l", Utc::now(), "d", "c", 2, Utc::now());
        event.available_seats = 3;
        let mut errors = Vec::new();
        event.check(&mut errors);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn patch_email_is_lowercased() {
        let mut patch = Document::new();
        patch.insert("email".into(), Value::from(" X@Y.Z"));
        User::normalize_patch(&mut patch);
        assert_eq!(patch["email"], "x@y.z");
    }
}
