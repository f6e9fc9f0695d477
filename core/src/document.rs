//! Document model shared by all stores.
//!
//! Entities are persisted as JSON objects grouped into [`Collection`]s. The
//! identity lives under [`ID_FIELD`] as a UUID string.

use crate::store::StoreError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

/// A stored record: a JSON object.
pub type Document = Map<String, Value>;

/// Key holding the store-assigned identity.
pub const ID_FIELD: &str = "_id";

/// Named group of documents of one entity type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Collection {
    /// User accounts
    Users,
    /// Events
    Events,
    /// Registrations
    Registrations,
}

impl Collection {
    /// Every collection, in a fixed order.
    pub const ALL: [Self; 3] = [Self::Users, Self::Events, Self::Registrations];

    /// Storage name of the collection.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Events => "events",
            Self::Registrations => "registrations",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Serialize a value into a document.
///
/// # Errors
///
/// Returns [`StoreError::Serialization`] if the value does not serialize to a
/// JSON object.
pub fn to_document<T: Serialize>(value: &T) -> Result<Document, StoreError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(StoreError::Serialization(format!(
            "expected a JSON object, got {other}"
        ))),
        Err(e) => Err(StoreError::Serialization(e.to_string())),
    }
}

/// Deserialize a document into a typed value.
///
/// # Errors
///
/// Returns [`StoreError::Serialization`] if the document does not match `T`.
pub fn from_document<T: DeserializeOwned>(document: Document) -> Result<T, StoreError> {
    serde_json::from_value(Value::Object(document))
        .map_err(|e| StoreError::Serialization(e.to_string()))
}

/// Read the identity of a document, if present and well-formed.
#[must_use]
pub fn document_id(document: &Document) -> Option<Uuid> {
    document
        .get(ID_FIELD)
        .and_then(Value::as_str)
        .and_then(|raw| Uuid::parse_str(raw).ok())
}

/// Ensure a document has an identity, assigning a fresh one if needed.
///
/// Returns the (possibly new) identity.
pub fn ensure_id(document: &mut Document) -> Uuid {
    if let Some(id) = document_id(document) {
        return id;
    }
    let id = Uuid::new_v4();
    document.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
    id
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ensure_id_keeps_existing_identity() {
        let id = Uuid::new_v4();
        let mut doc = json!({ "_id": id.to_string(), "name": "x" })
            .as_object()
            .cloned()
            .unwrap();
        assert_eq!(ensure_id(&mut doc), id);
    }

    #[test]
    fn ensure_id_assigns_missing_identity() {
        let mut doc = Document::new();
        let id = ensure_id(&mut doc);
        assert_eq!(document_id(&doc), Some(id));
    }

    #[test]
    fn to_document_rejects_non_objects() {
        assert!(matches!(
            to_document(&42),
            Err(StoreError::Serialization(_))
        ));
    }
}
