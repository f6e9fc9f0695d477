//! Entity facades.
//!
//! A [`Repository<T>`] gives typed create/find/update/delete access to one
//! entity. It holds the shared [`BackendSelector`] rather than a store and
//! resolves the active store on every call, so a switch to the fallback store
//! is observed by the very next operation.
//!
//! Validation runs here, on the serialized document, before any store is
//! touched. Both backends therefore see exactly the same accepted input.

use crate::backend::BackendSelector;
use crate::error::{ConflictReason, RegistryError, Result};
use rsvp_core::document::{Document, ID_FIELD, from_document, to_document};
use rsvp_core::entity::Entity;
use rsvp_core::query::{Filter, QuerySpec, Sort};
use rsvp_core::store::{BatchOutcome, StoreError, Update, WriteOp};
use rsvp_core::validation::{self, FieldError, Mode, ValidationErrors};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use uuid::Uuid;

/// Typed facade over the active store for entity `T`.
pub struct Repository<T> {
    selector: Arc<BackendSelector>,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            selector: Arc::clone(&self.selector),
            _entity: PhantomData,
        }
    }
}

impl<T: Entity> fmt::Debug for Repository<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("entity", &T::NAME)
            .field("mode", &self.selector.mode())
            .finish()
    }
}

fn id_filter(id: Uuid) -> Filter {
    Filter::new().eq(ID_FIELD, id.to_string())
}

impl<T: Entity> Repository<T> {
    /// Facade over `selector`.
    #[must_use]
    pub const fn new(selector: Arc<BackendSelector>) -> Self {
        Self {
            selector,
            _entity: PhantomData,
        }
    }

    /// Normalize, validate and insert a record. Returns the stored record.
    ///
    /// # Errors
    ///
    /// - `ValidationFailed`: a field rule or cross-field check failed
    /// - `Conflict(DuplicateKey)`: the record's unique key is taken
    /// - `Storage`: the store failed
    #[tracing::instrument(skip_all, fields(entity = T::NAME))]
    pub async fn create(&self, mut record: T) -> Result<T> {
        record.normalize();
        let document = to_document(&record)?;

        let mut errors = validation::check(T::RULES, &document, Mode::Full);
        record.check(&mut errors);
        if !errors.is_empty() {
            return Err(ValidationErrors(errors).into());
        }

        let store = self.selector.store();
        let stored = match record.unique_key() {
            None => store.insert(T::COLLECTION, document).await?,
            Some(key) => {
                let outcome = store
                    .commit(vec![WriteOp::Insert {
                        collection: T::COLLECTION,
                        document,
                        unique: Some(key),
                    }])
                    .await?;
                match outcome {
                    BatchOutcome::Committed { inserted } => inserted.into_iter().next().ok_or_else(
                        || StoreError::Database("insert returned no document".to_string()),
                    )?,
                    BatchOutcome::Rejected { .. } => {
                        return Err(RegistryError::Conflict(ConflictReason::DuplicateKey));
                    }
                }
            }
        };

        tracing::debug!(backend = store.name(), "Created record");
        Ok(from_document(stored)?)
    }

    /// Lazy query for records matching `filter`. Nothing runs until
    /// [`Find::all`] or [`Find::count`] is awaited.
    #[must_use]
    pub fn find(&self, filter: Filter) -> Find<T> {
        Find {
            selector: Arc::clone(&self.selector),
            spec: QuerySpec::new(filter),
            _entity: PhantomData,
        }
    }

    /// Lazy query for an explicit specification.
    #[must_use]
    pub fn query(&self, spec: QuerySpec) -> Find<T> {
        Find {
            selector: Arc::clone(&self.selector),
            spec,
            _entity: PhantomData,
        }
    }

    /// First record matching `filter`, if any.
    ///
    /// # Errors
    ///
    /// - `Storage`: the store failed or a record did not deserialize
    pub async fn find_one(&self, filter: Filter) -> Result<Option<T>> {
        Ok(self.find(filter).limit(1).all().await?.into_iter().next())
    }

    /// Record with the given identity, if any.
    ///
    /// # Errors
    ///
    /// - `Storage`: the store failed or the record did not deserialize
    pub async fn find_by_id(&self, id: impl Into<Uuid>) -> Result<Option<T>> {
        self.find_one(id_filter(id.into())).await
    }

    /// Number of records matching `filter`.
    ///
    /// # Errors
    ///
    /// - `Storage`: the store failed
    pub async fn count(&self, filter: Filter) -> Result<u64> {
        self.find(filter).count().await
    }

    /// Overwrite the fields in `patch`. Returns whether the record existed.
    ///
    /// Field rules run on the patch alone. The patch is then laid over the
    /// stored record, which must still deserialize as `T` and pass
    /// [`Entity::check`]. `_id` and [`Entity::PROTECTED`] fields cannot be
    /// patched.
    ///
    /// # Errors
    ///
    /// - `ValidationFailed`: a present field breaks its rule, is protected,
    ///   or leaves the record unreadable or inconsistent
    /// - `Storage`: the store failed
    #[tracing::instrument(skip(self, patch), fields(entity = T::NAME))]
    pub async fn update(&self, id: Uuid, mut patch: Document) -> Result<bool> {
        T::normalize_patch(&mut patch);
        let mut errors = validation::check(T::RULES, &patch, Mode::Partial);
        errors.extend(
            T::PROTECTED
                .iter()
                .filter(|field| patch.contains_key(**field))
                .map(|field| FieldError::new(*field, format!("{field} cannot be changed"))),
        );
        if !errors.is_empty() {
            return Err(ValidationErrors(errors).into());
        }

        let store = self.selector.store();
        let spec = QuerySpec::new(id_filter(id)).limit(1);
        let Some(current) = store.find(T::COLLECTION, &spec).await?.into_iter().next() else {
            return Ok(false);
        };

        let merged = merge::<T>(&current, &patch)?;
        merged.check(&mut errors);
        if !errors.is_empty() {
            return Err(ValidationErrors(errors).into());
        }

        let updated = store
            .update(T::COLLECTION, id, &Update::from_patch(patch), &Filter::new())
            .await?;
        Ok(updated)
    }

    /// Remove a record. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// - `Storage`: the store failed
    #[tracing::instrument(skip(self), fields(entity = T::NAME))]
    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self.selector.store().delete(T::COLLECTION, id).await?)
    }
}

/// Lay `patch` over `current` and read the result back as `T`, naming the
/// patched fields that do not fit.
fn merge<T: Entity>(current: &Document, patch: &Document) -> Result<T> {
    let mut merged = current.clone();
    merged.extend(patch.clone());
    if let Ok(record) = from_document::<T>(merged) {
        return Ok(record);
    }

    let mut errors: Vec<FieldError> = patch
        .iter()
        .filter(|(field, value)| {
            let mut single = current.clone();
            single.insert((*field).clone(), (*value).clone());
            from_document::<T>(single).is_err()
        })
        .map(|(field, _)| FieldError::new(field.as_str(), format!("Invalid value for {field}")))
        .collect();
    if errors.is_empty() {
        errors.push(FieldError::new(
            ID_FIELD,
            format!("Patch does not produce a valid {}", T::NAME),
        ));
    }
    Err(ValidationErrors(errors).into())
}

/// Lazily executed query over one entity type.
///
/// The same `Find` can be counted and fetched without rebuilding the filter.
pub struct Find<T> {
    selector: Arc<BackendSelector>,
    spec: QuerySpec,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Clone for Find<T> {
    fn clone(&self) -> Self {
        Self {
            selector: Arc::clone(&self.selector),
            spec: self.spec.clone(),
            _entity: PhantomData,
        }
    }
}

impl<T: Entity> Find<T> {
    /// Sort by one field.
    #[must_use]
    pub fn sort(mut self, sort: Sort) -> Self {
        self.spec = self.spec.sort(sort);
        self
    }

    /// Skip records after sorting.
    #[must_use]
    pub fn skip(mut self, skip: u64) -> Self {
        self.spec = self.spec.skip(skip);
        self
    }

    /// Cap the number of records (`0` = unlimited).
    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.spec = self.spec.limit(limit);
        self
    }

    /// The accumulated specification.
    #[must_use]
    pub const fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    /// Count matching records, ignoring sort, skip and limit.
    ///
    /// # Errors
    ///
    /// - `Storage`: the store failed
    pub async fn count(&self) -> Result<u64> {
        let store = self.selector.store();
        Ok(store.count(T::COLLECTION, &self.spec.filter).await?)
    }

    /// Fetch the records.
    ///
    /// # Errors
    ///
    /// - `Storage`: the store failed or a record did not deserialize
    pub async fn all(&self) -> Result<Vec<T>> {
        let store = self.selector.store();
        let documents = store.find(T::COLLECTION, &self.spec).await?;
        documents
            .into_iter()
            .map(|document| from_document(document).map_err(RegistryError::from))
            .collect()
    }
}
