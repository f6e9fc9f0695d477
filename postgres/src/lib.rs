//! `PostgreSQL` document store for the RSVP registration service.
//!
//! This crate provides the primary [`RecordStore`](rsvp_core::store::RecordStore)
//! implementation. Documents of every collection live in one JSONB table;
//! queries, guards and uniqueness checks are translated into SQL so that they
//! are evaluated by the database at the moment of the write.
//!
//! - Connection pooling through sqlx
//! - Guarded single-statement updates
//! - All-or-nothing batches in one transaction
//! - Partial unique indexes for active registrations and e-mail addresses
//!
//! # Example
//!
//! ```no_run
//! use rsvp_postgres::PostgresStore;
//! use rsvp_core::store::RecordStore;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), rsvp_core::store::StoreError> {
//! let store = PostgresStore::connect("postgres://localhost/rsvp", 10, Duration::from_secs(5)).await?;
//! store.migrate().await?;
//! store.ping().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod sql;

/// JSONB-backed record store
pub mod store;

pub use store::PostgresStore;
