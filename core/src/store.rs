//! Record store abstraction.
//!
//! A [`RecordStore`] persists JSON [`Document`]s grouped into [`Collection`]s.
//! Two implementations exist: the PostgreSQL-backed primary store
//! (`rsvp-postgres`) and the embedded fallback store (`rsvp-runtime`). Callers
//! only ever hold an `Arc<dyn RecordStore>`.
//!
//! # Guarded writes
//!
//! Every mutation that must not race is expressed as a guarded write: the
//! store applies it only if the target document matches a [`Filter`] at the
//! moment of the write, atomically with the check. Related writes are grouped
//! into a batch via [`RecordStore::commit`], which applies all of them or none.
//!
//! ```no_run
//! use rsvp_core::document::Collection;
//! use rsvp_core::query::Filter;
//! use rsvp_core::store::{RecordStore, StoreError, Update};
//! use uuid::Uuid;
//!
//! async fn take_seat(store: &dyn RecordStore, event: Uuid) -> Result<bool, StoreError> {
//!     store
//!         .update(
//!             Collection::Events,
//!             event,
//!             &Update::new().inc("availableSeats", -1),
//!             &Filter::new().gte("availableSeats", 1_i64),
//!         )
//!         .await
//! }
//! ```

use crate::document::{Collection, Document, ID_FIELD};
use crate::query::{Filter, QuerySpec};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;
use uuid::Uuid;

/// Boxed future returned by [`RecordStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Errors that can occur during store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Store could not be reached.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Database query or connection failed.
    #[error("Database error: {0}")]
    Database(String),

    /// Document could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Fallback store failed to read or write its data files.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Operation did not complete in time.
    #[error("Operation timed out after {0} ms")]
    Timeout(u64),

    /// Update cannot be applied to the stored document.
    #[error("Invalid update: {0}")]
    InvalidUpdate(String),
}

// ============================================================================
// Updates
// ============================================================================

/// Field assignments plus integer increments, applied together.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Update {
    /// Top-level fields to overwrite
    pub set: Document,
    /// Integer fields to adjust by a signed delta
    pub inc: Vec<(String, i64)>,
}

impl Update {
    /// Empty update.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite `field` with `value`.
    #[must_use]
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set.insert(field.into(), value.into());
        self
    }

    /// Adjust integer `field` by `delta`.
    #[must_use]
    pub fn inc(mut self, field: impl Into<String>, delta: i64) -> Self {
        self.inc.push((field.into(), delta));
        self
    }

    /// Update that overwrites every field in `patch`.
    #[must_use]
    pub fn from_patch(patch: Document) -> Self {
        Self {
            set: patch,
            inc: Vec::new(),
        }
    }

    /// Whether applying this update changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.inc.is_empty()
    }

    /// Apply to a document in place.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidUpdate`] if the update touches the identity
    /// field or increments a field that holds a non-integer value. The document
    /// is left unchanged on error.
    pub fn apply(&self, document: &mut Document) -> Result<(), StoreError> {
        if self.set.contains_key(ID_FIELD) || self.inc.iter().any(|(f, _)| f == ID_FIELD) {
            return Err(StoreError::InvalidUpdate(format!(
                "{ID_FIELD} cannot be modified"
            )));
        }

        let mut increments = Vec::with_capacity(self.inc.len());
        for (field, delta) in &self.inc {
            let current = match document.get(field) {
                None | Some(Value::Null) => 0,
                Some(value) => value.as_i64().ok_or_else(|| {
                    StoreError::InvalidUpdate(format!("{field} is not an integer"))
                })?,
            };
            let next = current.checked_add(*delta).ok_or_else(|| {
                StoreError::InvalidUpdate(format!("{field} increment overflows"))
            })?;
            increments.push((field.clone(), next));
        }

        for (field, value) in &self.set {
            document.insert(field.clone(), value.clone());
        }
        for (field, value) in increments {
            document.insert(field, Value::from(value));
        }
        Ok(())
    }
}

// ============================================================================
// Batches
// ============================================================================

/// One step of an all-or-nothing write batch.
#[derive(Clone, Debug, PartialEq)]
pub enum WriteOp {
    /// Insert a document, rejected if `unique` matches an existing document.
    Insert {
        /// Target collection
        collection: Collection,
        /// Document to insert (`_id` assigned if absent)
        document: Document,
        /// Uniqueness filter checked against existing documents
        unique: Option<Filter>,
    },
    /// Update a document, rejected unless it exists and matches `guard`.
    Update {
        /// Target collection
        collection: Collection,
        /// Target identity
        id: Uuid,
        /// Changes to apply
        update: Update,
        /// Precondition (empty = must merely exist)
        guard: Filter,
    },
}

impl WriteOp {
    /// Collection the step writes to.
    #[must_use]
    pub const fn collection(&self) -> Collection {
        match self {
            Self::Insert { collection, .. } | Self::Update { collection, .. } => *collection,
        }
    }
}

/// Result of [`RecordStore::commit`].
#[derive(Clone, Debug, PartialEq)]
pub enum BatchOutcome {
    /// Every step applied. Inserted documents (with identities) in step order.
    Committed {
        /// Documents created by `Insert` steps
        inserted: Vec<Document>,
    },
    /// The step at this index was rejected; nothing was applied.
    Rejected {
        /// Zero-based index of the first rejected step
        step: usize,
    },
}

impl BatchOutcome {
    /// Whether the batch was applied.
    #[must_use]
    pub const fn is_committed(&self) -> bool {
        matches!(self, Self::Committed { .. })
    }
}

// ============================================================================
// Store trait
// ============================================================================

/// Low-level document store shared by the primary and fallback backends.
///
/// # Dyn Compatibility
///
/// Methods return [`StoreFuture`] instead of using `async fn` so the backend
/// selector can hand out `Arc<dyn RecordStore>`.
pub trait RecordStore: Send + Sync {
    /// Short backend name used in logs and health output.
    fn name(&self) -> &'static str;

    /// Check that the store is reachable.
    ///
    /// # Errors
    ///
    /// - `Unavailable`/`Database`: the store cannot serve requests
    fn ping(&self) -> StoreFuture<'_, ()>;

    /// Insert a document, assigning `_id` if absent. Returns the stored form.
    ///
    /// # Errors
    ///
    /// - `Database`/`Persistence`: the write failed
    fn insert(&self, collection: Collection, document: Document) -> StoreFuture<'_, Document>;

    /// Run a query. Results follow filter, then sort, then skip, then limit.
    ///
    /// # Errors
    ///
    /// - `Database`: the query failed
    fn find<'a>(
        &'a self,
        collection: Collection,
        spec: &'a QuerySpec,
    ) -> StoreFuture<'a, Vec<Document>>;

    /// Count documents matching a filter.
    ///
    /// # Errors
    ///
    /// - `Database`: the query failed
    fn count<'a>(&'a self, collection: Collection, filter: &'a Filter) -> StoreFuture<'a, u64>;

    /// Apply `update` to document `id` only if it currently matches `guard`.
    ///
    /// Returns `false` when no document with that id matches the guard.
    ///
    /// # Errors
    ///
    /// - `InvalidUpdate`: the update cannot be applied to the stored shape
    /// - `Database`/`Persistence`: the write failed
    fn update<'a>(
        &'a self,
        collection: Collection,
        id: Uuid,
        update: &'a Update,
        guard: &'a Filter,
    ) -> StoreFuture<'a, bool>;

    /// Delete document `id`. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// - `Database`/`Persistence`: the write failed
    fn delete(&self, collection: Collection, id: Uuid) -> StoreFuture<'_, bool>;

    /// Apply every step of `ops` atomically, or none of them.
    ///
    /// Guards and uniqueness filters are evaluated against the state produced
    /// by the preceding steps of the same batch.
    ///
    /// # Errors
    ///
    /// Errors are reserved for faults; a failed guard is a
    /// [`BatchOutcome::Rejected`], not an error.
    fn commit(&self, ops: Vec<WriteOp>) -> StoreFuture<'_, BatchOutcome>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn increments_and_sets_apply_together() {
        let mut event = doc(json!({ "_id": "x", "availableSeats": 3, "name": "old" }));
        Update::new()
            .set("name", "new")
            .inc("availableSeats", -1)
            .apply(&mut event)
            .unwrap();
        assert_eq!(event["availableSeats"], 2);
        assert_eq!(event["name"], "new");
    }

    #[test]
    fn increment_of_missing_field_starts_from_zero() {
        let mut document = Document::new();
        Update::new().inc("counter", 2).apply(&mut document).unwrap();
        assert_eq!(document["counter"], 2);
    }

    #[test]
    fn identity_is_immutable() {
        let mut document = doc(json!({ "_id": "x" }));
        let result = Update::new().set(ID_FIELD, "y").apply(&mut document);
        assert!(matches!(result, Err(StoreError::InvalidUpdate(_))));
        assert_eq!(document["_id"], "x");
    }

    #[test]
    fn failed_update_leaves_document_untouched() {
        let mut document = doc(json!({ "name": "a", "capacity": "many" }));
        let result = Update::new()
            .set("name", "b")
            .inc("capacity", 1)
            .apply(&mut document);
        assert!(result.is_err());
        assert_eq!(document["name"], "a");
    }
}
