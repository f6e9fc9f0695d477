//! # RSVP Core
//!
//! Core types and contracts for the RSVP event registration service.
//!
//! This crate provides the store-agnostic foundation that every other crate
//! builds on:
//!
//! - **Entities**: [`Event`](types::Event), [`User`](types::User) and
//!   [`Registration`](types::Registration) with their typed identifiers
//! - **Documents**: the JSON document shape entities are persisted as
//! - **Query specification**: immutable [`QuerySpec`](query::QuerySpec) values
//!   (filter + sort + skip + limit) evaluated either natively by a store or in
//!   memory via [`Filter::matches`](query::Filter::matches)
//! - **Validation**: declarative field rules applied identically regardless of
//!   which backend is active
//! - **Store contract**: the [`RecordStore`](store::RecordStore) trait with
//!   guarded updates and all-or-nothing write batches
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │  Seat coordinator    │   rsvp-runtime
//! ├──────────────────────┤
//! │  Repository<T>       │   rsvp-runtime (resolves backend per call)
//! ├──────────────────────┤
//! │  RecordStore (trait) │   rsvp-core
//! ├──────────┬───────────┤
//! │ Postgres │  Memory   │   rsvp-postgres / rsvp-runtime
//! └──────────┴───────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use rsvp_core::query::{Filter, QuerySpec, Sort};
//!
//! let spec = QuerySpec::new(Filter::new().eq("category", "Technology"))
//!     .sort(Sort::ascending("date"))
//!     .skip(10)
//!     .limit(10);
//!
//! assert_eq!(spec.skip, 10);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod document;
pub mod entity;
pub mod query;
pub mod store;
pub mod timestamp;
pub mod types;
pub mod validation;

pub use document::{Collection, Document, ID_FIELD};
pub use entity::Entity;
pub use query::{Condition, Filter, QuerySpec, Scalar, Sort, SortDirection, TextSearch};
pub use store::{BatchOutcome, RecordStore, StoreError, StoreFuture, Update, WriteOp};
pub use types::{Event, EventId, Registration, RegistrationId, RegistrationStatus, User, UserId};
pub use validation::{FieldError, FieldRule, Rule, ValidationErrors};

/// Environment traits for dependency injection
///
/// External dependencies that the coordinator needs (currently only time) are
/// abstracted behind traits so tests can substitute deterministic versions.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use rsvp_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let _now = clock.now();
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
