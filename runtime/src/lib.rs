//! # RSVP Runtime
//!
//! Runtime services for the RSVP registration service.
//!
//! ## Core Components
//!
//! - **Backend selector**: decides once at startup between the primary store
//!   and the embedded fallback store, and hands out the active one per call
//! - **Memory store**: the fallback [`RecordStore`](rsvp_core::store::RecordStore)
//! - **Repositories**: typed entity facades with validation and lazy queries
//! - **Event search**: search/filter/paginate over events
//! - **Seat inventory**: the register/cancel protocol
//!
//! ## Example
//!
//! ```
//! use rsvp_runtime::{BackendSelector, MemoryStore, Registry};
//! use rsvp_core::environment::SystemClock;
//! use std::sync::Arc;
//!
//! let selector = Arc::new(BackendSelector::fallback_only(Arc::new(MemoryStore::new())));
//! let registry = Registry::new(selector, Arc::new(SystemClock));
//! assert_eq!(registry.mode().as_str(), "fallback");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Primary/fallback backend selection
pub mod backend;

/// Repository and seat error taxonomy
pub mod error;

/// Embedded fallback store
pub mod memory;

/// Prometheus metrics for observability
pub mod metrics;

/// Typed entity facades
pub mod repository;

/// Event listing
pub mod search;

/// Register/cancel coordination
pub mod seats;

pub use backend::{BackendMode, BackendSelector, DEFAULT_CONNECT_TIMEOUT};
pub use error::{ConflictReason, RegistryError};
pub use memory::MemoryStore;
pub use repository::{Find, Repository};
pub use search::{EventPage, EventSearch};
pub use seats::{MyRegistrations, RegistrationDetails, SeatInventory};

use rsvp_core::environment::Clock;
use rsvp_core::types::{Event, Registration, User};
use std::sync::Arc;

/// Every facade wired to one backend selector.
#[derive(Clone)]
pub struct Registry {
    selector: Arc<BackendSelector>,
    /// User accounts
    pub users: Repository<User>,
    /// Events
    pub events: Repository<Event>,
    /// Registrations
    pub registrations: Repository<Registration>,
    /// Register/cancel coordinator
    pub seats: SeatInventory,
}

impl Registry {
    /// Wire repositories and the seat coordinator to `selector`.
    #[must_use]
    pub fn new(selector: Arc<BackendSelector>, clock: Arc<dyn Clock>) -> Self {
        Self {
            users: Repository::new(Arc::clone(&selector)),
            events: Repository::new(Arc::clone(&selector)),
            registrations: Repository::new(Arc::clone(&selector)),
            seats: SeatInventory::new(Arc::clone(&selector), clock),
            selector,
        }
    }

    /// The shared backend selector.
    #[must_use]
    pub const fn selector(&self) -> &Arc<BackendSelector> {
        &self.selector
    }

    /// The active backend mode.
    #[must_use]
    pub fn mode(&self) -> BackendMode {
        self.selector.mode()
    }
}
