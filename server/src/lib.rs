//! # RSVP Server
//!
//! HTTP surface of the RSVP registration service: browse events, register
//! for one, cancel, and list one's own registrations.
//!
//! ## Architecture
//!
//! ```text
//! HTTP (axum) ──► rsvp-web extractors / AppError
//!                     │
//!                     ▼
//!              rsvp-runtime Registry ──► BackendSelector ──► PostgresStore | MemoryStore
//! ```
//!
//! ## Usage
//!
//! ```bash
//! DATABASE_URL=postgres://localhost/rsvp AUTH_TOKENS="dev-token=<user uuid>" \
//!     cargo run --bin server
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// REST handlers
pub mod api;

/// Startup wiring
pub mod bootstrap;

/// Environment configuration
pub mod config;

/// Router assembly
pub mod routes;

/// Shared handler state
pub mod state;

pub use bootstrap::{build_registry, build_verifier};
pub use config::Config;
pub use routes::build_router;
pub use state::AppState;
