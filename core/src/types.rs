//! Domain types for the registration service.
//!
//! Three entities are persisted: [`User`], [`Event`] and [`Registration`].
//! Every entity carries a store-visible identity under the `_id` key and uses
//! camelCase field names on the wire and in storage.

use crate::timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            #[doc = concat!("Creates a new random `", stringify!($name), "`")]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            #[doc = concat!("Create a `", stringify!($name), "` from a `Uuid`")]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

define_id!(
    /// Unique identifier for an event
    EventId
);

define_id!(
    /// Unique identifier for a user account
    UserId
);

define_id!(
    /// Unique identifier for a registration
    RegistrationId
);

// ============================================================================
// Event
// ============================================================================

/// A capacity-bounded event users can register for.
///
/// Invariant: `available_seats <= capacity`. Only the seat coordinator
/// changes `available_seats` after creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Store identity
    #[serde(rename = "_id")]
    pub id: EventId,
    /// Event name
    pub name: String,
    /// Organizer name
    pub organizer: String,
    /// Venue / city
    pub location: String,
    /// When the event takes place
    #[serde(with = "timestamp")]
    pub date: DateTime<Utc>,
    /// Free-text description
    pub description: String,
    /// Category used for exact-match filtering
    pub category: String,
    /// Ordered tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Total seats
    pub capacity: u32,
    /// Seats not held by an active registration
    pub available_seats: u32,
    /// Creation time
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Field names covered by free-text search.
    pub const SEARCH_FIELDS: &'static [&'static str] = &["name", "description", "organizer"];

    /// Creates a new event with every seat available.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        organizer: impl Into<String>,
        location: impl Into<String>,
        date: DateTime<Utc>,
        description: impl Into<String>,
        category: impl Into<String>,
        capacity: u32,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EventId::new(),
            name: name.into(),
            organizer: organizer.into(),
            location: location.into(),
            date,
            description: description.into(),
            category: category.into(),
            tags: Vec::new(),
            capacity,
            available_seats: capacity,
            created_at,
        }
    }

    /// Attach tags (builder style).
    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Whether at least one seat is free.
    #[must_use]
    pub const fn has_available_seats(&self) -> bool {
        self.available_seats > 0
    }
}

// ============================================================================
// User
// ============================================================================

/// A user account.
///
/// The password credential is opaque here: hashing and verification belong
/// to the authentication collaborator.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Store identity
    #[serde(rename = "_id")]
    pub id: UserId,
    /// Display name
    pub name: String,
    /// Unique, case-insensitive e-mail (stored lowercased)
    pub email: String,
    /// Opaque password credential
    pub password: String,
    /// Creation time
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Creates a new user.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: UserId::new(),
            name: name.into(),
            email: email.into(),
            password: password.into(),
            created_at,
        }
    }
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("created_at", &self.created_at)
            .finish()
    }
}

// ============================================================================
// Registration
// ============================================================================

/// Lifecycle of a registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationStatus {
    /// Holds a seat
    Active,
    /// Seat released
    Cancelled,
}

impl RegistrationStatus {
    /// Stored string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user's seat reservation for an event.
///
/// At most one `Active` registration exists per `(user_id, event_id)` pair;
/// cancelled ones are kept and do not count.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    /// Store identity
    #[serde(rename = "_id")]
    pub id: RegistrationId,
    /// Registered user
    pub user_id: UserId,
    /// Target event
    pub event_id: EventId,
    /// Creation time
    #[serde(with = "timestamp")]
    pub registered_at: DateTime<Utc>,
    /// Current status
    pub status: RegistrationStatus,
}

impl Registration {
    /// Creates a new active registration.
    #[must_use]
    pub fn new(user_id: UserId, event_id: EventId, registered_at: DateTime<Utc>) -> Self {
        Self {
            id: RegistrationId::new(),
            user_id,
            event_id,
            registered_at,
            status: RegistrationStatus::Active,
        }
    }

    /// Whether this registration currently holds a seat.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == RegistrationStatus::Active
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_event() -> Event {
        Event::new(
            "Tech Conference 2026",
            "Tech Community",
            "San Francisco, CA",
            Utc.with_ymd_and_hms(2026, 3, 15, 9, 0, 0).unwrap(),
            "AI, cloud computing and web development.",
            "Technology",
            200,
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        )
        .with_tags(["AI", "Cloud"])
    }

    #[test]
    fn event_serializes_with_store_field_names() {
        let event = sample_event();
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["_id"], serde_json::json!(event.id.to_string()));
        assert_eq!(json["availableSeats"], 200);
        assert_eq!(json["date"], "2026-03-15T09:00:00.000Z");
        assert_eq!(json["tags"], serde_json::json!(["AI", "Cloud"]));
    }

    #[test]
    fn new_event_starts_fully_available() {
        let event = sample_event();
        assert_eq!(event.available_seats, event.capacity);
        assert!(event.has_available_seats());
    }

    #[test]
    fn registration_status_uses_lowercase_strings() {
        let registration = Registration::new(UserId::new(), EventId::new(), Utc::now());
        let json = serde_json::to_value(&registration).unwrap();
        assert_eq!(json["status"], "active");
        assert!(registration.is_active());
    }

    #[test]
    fn ids_parse_from_strings() {
        let id = EventId::new();
        let parsed: EventId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<EventId>().is_err());
    }

    #[test]
    fn user_debug_redacts_password() {
        let user = User::new("Ada", "ada@example.com", "secret-password", Utc::now());
        let debug = format!("{user:?}");
        assert!(!debug.contains("secret-password"));
    }
}
