//! # RSVP Testing
//!
//! Testing utilities and helpers for the RSVP registration service.
//!
//! This crate provides:
//! - Mock implementations of environment traits and stores
//! - Entity fixtures
//! - A fallback-mode [`TestRegistry`]
//! - Property-based testing strategies
//!
//! ## Example
//!
//! ```
//! use rsvp_testing::{TestRegistry, fixtures::EventFixture};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let registry = TestRegistry::new();
//! let event = registry.seed_event(EventFixture::new().capacity(2)).await;
//! assert_eq!(event.available_seats, 2);
//! # }
//! ```

use chrono::{DateTime, Utc};
use rsvp_core::environment::Clock;
use rsvp_core::store::RecordStore;
use rsvp_core::types::{Event, EventId, User};
use rsvp_runtime::{BackendSelector, MemoryStore, Registry};
use std::ops::Deref;
use std::sync::Arc;

/// Mock implementations for testing.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use rsvp_core::document::{Collection, Document};
    use rsvp_core::query::{Filter, QuerySpec};
    use rsvp_core::store::{BatchOutcome, RecordStore, StoreError, StoreFuture, Update, WriteOp};
    use std::fmt;
    use std::sync::Arc;
    use tokio::sync::{Notify, Semaphore};
    use uuid::Uuid;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use rsvp_testing::mocks::FixedClock;
    /// use rsvp_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2026-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// A store that is never reachable. Every call fails with
    /// [`StoreError::Unavailable`].
    #[derive(Debug, Clone, Copy, Default)]
    pub struct UnreachableStore;

    fn unavailable<T>() -> Result<T, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    impl RecordStore for UnreachableStore {
        fn name(&self) -> &'static str {
            "unreachable"
        }

        fn ping(&self) -> StoreFuture<'_, ()> {
            Box::pin(async { unavailable() })
        }

        fn insert(&self, _collection: Collection, _document: Document) -> StoreFuture<'_, Document> {
            Box::pin(async { unavailable() })
        }

        fn find<'a>(
            &'a self,
            _collection: Collection,
            _spec: &'a QuerySpec,
        ) -> StoreFuture<'a, Vec<Document>> {
            Box::pin(async { unavailable() })
        }

        fn count<'a>(&'a self, _collection: Collection, _filter: &'a Filter) -> StoreFuture<'a, u64> {
            Box::pin(async { unavailable() })
        }

        fn update<'a>(
            &'a self,
            _collection: Collection,
            _id: Uuid,
            _update: &'a Update,
            _guard: &'a Filter,
        ) -> StoreFuture<'a, bool> {
            Box::pin(async { unavailable() })
        }

        fn delete(&self, _collection: Collection, _id: Uuid) -> StoreFuture<'_, bool> {
            Box::pin(async { unavailable() })
        }

        fn commit(&self, _ops: Vec<WriteOp>) -> StoreFuture<'_, BatchOutcome> {
            Box::pin(async { unavailable() })
        }
    }

    /// Which calls a [`GatedStore`] holds.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Hold {
        /// `find` and `count`
        Reads,
        /// `commit`
        Batches,
    }

    /// Wraps a store and parks the held kind of call until [`GatedStore::open`].
    ///
    /// Lets a test drop a request at a known point: while it waits on a read,
    /// or after its batch has reached the store.
    #[derive(Clone)]
    pub struct GatedStore {
        inner: Arc<dyn RecordStore>,
        hold: Hold,
        arrived: Arc<Notify>,
        gate: Arc<Semaphore>,
    }

    impl fmt::Debug for GatedStore {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("GatedStore")
                .field("inner", &self.inner.name())
                .field("hold", &self.hold)
                .field("open", &self.gate.is_closed())
                .finish()
        }
    }

    impl GatedStore {
        /// Hold `hold` calls on `inner`.
        #[must_use]
        pub fn new(inner: Arc<dyn RecordStore>, hold: Hold) -> Self {
            Self {
                inner,
                hold,
                arrived: Arc::new(Notify::new()),
                gate: Arc::new(Semaphore::new(0)),
            }
        }

        /// Resolves once a held call has reached the gate.
        pub async fn arrived(&self) {
            self.arrived.notified().await;
        }

        /// Let every held and future call through.
        pub fn open(&self) {
            self.gate.close();
        }

        async fn pass(&self, kind: Hold) {
            if kind != self.hold || self.gate.is_closed() {
                return;
            }
            self.arrived.notify_one();
            // Closing the semaphore is what opens the gate
            if let Ok(permit) = self.gate.acquire().await {
                permit.forget();
            }
        }
    }

    impl RecordStore for GatedStore {
        fn name(&self) -> &'static str {
            self.inner.name()
        }

        fn ping(&self) -> StoreFuture<'_, ()> {
            self.inner.ping()
        }

        fn insert(&self, collection: Collection, document: Document) -> StoreFuture<'_, Document> {
            self.inner.insert(collection, document)
        }

        fn find<'a>(
            &'a self,
            collection: Collection,
            spec: &'a QuerySpec,
        ) -> StoreFuture<'a, Vec<Document>> {
            Box::pin(async move {
                self.pass(Hold::Reads).await;
                self.inner.find(collection, spec).await
            })
        }

        fn count<'a>(&'a self, collection: Collection, filter: &'a Filter) -> StoreFuture<'a, u64> {
            Box::pin(async move {
                self.pass(Hold::Reads).await;
                self.inner.count(collection, filter).await
            })
        }

        fn update<'a>(
            &'a self,
            collection: Collection,
            id: Uuid,
            update: &'a Update,
            guard: &'a Filter,
        ) -> StoreFuture<'a, bool> {
            self.inner.update(collection, id, update, guard)
        }

        fn delete(&self, collection: Collection, id: Uuid) -> StoreFuture<'_, bool> {
            self.inner.delete(collection, id)
        }

        fn commit(&self, ops: Vec<WriteOp>) -> StoreFuture<'_, BatchOutcome> {
            Box::pin(async move {
                self.pass(Hold::Batches).await;
                self.inner.commit(ops).await
            })
        }
    }
}

/// Entity fixtures with sensible defaults.
pub mod fixtures {
    use super::{DateTime, Event, User, Utc};
    use chrono::Duration;

    /// Builder for test events. Defaults to a 10-seat technology event one
    /// week after the test clock's time.
    #[derive(Debug, Clone)]
    pub struct EventFixture {
        name: String,
        organizer: String,
        location: String,
        description: String,
        category: String,
        date: Option<DateTime<Utc>>,
        capacity: u32,
        tags: Vec<String>,
    }

    impl Default for EventFixture {
        fn default() -> Self {
            Self::new()
        }
    }

    impl EventFixture {
        /// Default fixture.
        #[must_use]
        pub fn new() -> Self {
            Self {
                name: "Tech Conference".to_string(),
                organizer: "Tech Community".to_string(),
                location: "San Francisco, CA".to_string(),
                description: "Talks and workshops".to_string(),
                category: "Technology".to_string(),
                date: None,
                capacity: 10,
                tags: Vec::new(),
            }
        }

        /// Set the name.
        #[must_use]
        pub fn name(mut self, name: impl Into<String>) -> Self {
            self.name = name.into();
            self
        }

        /// Set the organizer.
        #[must_use]
        pub fn organizer(mut self, organizer: impl Into<String>) -> Self {
            self.organizer = organizer.into();
            self
        }

        /// Set the location.
        #[must_use]
        pub fn location(mut self, location: impl Into<String>) -> Self {
            self.location = location.into();
            self
        }

        /// Set the description.
        #[must_use]
        pub fn description(mut self, description: impl Into<String>) -> Self {
            self.description = description.into();
            self
        }

        /// Set the category.
        #[must_use]
        pub fn category(mut self, category: impl Into<String>) -> Self {
            self.category = category.into();
            self
        }

        /// Set the date.
        #[must_use]
        pub const fn date(mut self, date: DateTime<Utc>) -> Self {
            self.date = Some(date);
            self
        }

        /// Set the capacity (every seat starts available).
        #[must_use]
        pub const fn capacity(mut self, capacity: u32) -> Self {
            self.capacity = capacity;
            self
        }

        /// Set the tags.
        #[must_use]
        pub fn tags<I, S>(mut self, tags: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            self.tags = tags.into_iter().map(Into::into).collect();
            self
        }

        /// Build the event relative to `now`.
        #[must_use]
        pub fn build(self, now: DateTime<Utc>) -> Event {
            Event::new(
                self.name,
                self.organizer,
                self.location,
                self.date.unwrap_or(now + Duration::days(7)),
                self.description,
                self.category,
                self.capacity,
                now,
            )
            .with_tags(self.tags)
        }
    }

    /// A valid user with a unique e-mail derived from `name`.
    #[must_use]
    pub fn user(name: &str, now: DateTime<Utc>) -> User {
        User::new(
            name,
            format!("{}@example.com", name.to_lowercase().replace(' ', ".")),
            "password123",
            now,
        )
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use proptest::prelude::*;

    /// One step of a register/cancel sequence, addressed by user index.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum SeatOp {
        /// User `n` registers
        Register(usize),
        /// User `n` cancels their most recent registration
        Cancel(usize),
    }

    /// Sequences of seat operations over `users` users.
    pub fn seat_ops(users: usize, max_len: usize) -> impl Strategy<Value = Vec<SeatOp>> {
        let users = users.max(1);
        proptest::collection::vec(
            prop_oneof![
                (0..users).prop_map(SeatOp::Register),
                (0..users).prop_map(SeatOp::Cancel),
            ],
            0..max_len,
        )
    }
}

/// A fallback-mode registry over a fresh in-memory store and a fixed clock.
#[derive(Clone)]
pub struct TestRegistry {
    registry: Registry,
    now: DateTime<Utc>,
}

impl Default for TestRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TestRegistry {
    /// Registry with [`test_clock`]'s time.
    #[must_use]
    pub fn new() -> Self {
        Self::at(test_clock().now())
    }

    /// Registry whose clock is frozen at `now`.
    #[must_use]
    pub fn at(now: DateTime<Utc>) -> Self {
        Self::build(Arc::new(MemoryStore::new()), now)
    }

    /// Registry over `store` with [`test_clock`]'s time.
    #[must_use]
    pub fn over(store: Arc<dyn RecordStore>) -> Self {
        Self::build(store, test_clock().now())
    }

    fn build(store: Arc<dyn RecordStore>, now: DateTime<Utc>) -> Self {
        let selector = Arc::new(BackendSelector::fallback_only(store));
        Self {
            registry: Registry::new(selector, Arc::new(FixedClock::new(now))),
            now,
        }
    }

    /// The clock's time.
    #[must_use]
    pub const fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// The wrapped registry.
    #[must_use]
    pub fn registry(&self) -> Registry {
        self.registry.clone()
    }

    /// Insert an event built from `fixture`.
    ///
    /// # Panics
    ///
    /// Panics if the fixture fails validation.
    #[allow(clippy::expect_used)]
    pub async fn seed_event(&self, fixture: fixtures::EventFixture) -> Event {
        self.registry
            .events
            .create(fixture.build(self.now))
            .await
            .expect("fixture event should be valid")
    }

    /// Insert a user named `name`.
    ///
    /// # Panics
    ///
    /// Panics if the user fails validation or the e-mail is taken.
    #[allow(clippy::expect_used)]
    pub async fn seed_user(&self, name: &str) -> User {
        self.registry
            .users
            .create(fixtures::user(name, self.now))
            .await
            .expect("fixture user should be valid")
    }

    /// Current seat count of an event.
    ///
    /// # Panics
    ///
    /// Panics if the event does not exist.
    #[allow(clippy::expect_used)]
    pub async fn available_seats(&self, id: EventId) -> u32 {
        self.registry
            .events
            .find_by_id(id)
            .await
            .expect("store should be reachable")
            .expect("event should exist")
            .available_seats
    }
}

impl Deref for TestRegistry {
    type Target = Registry;

    fn deref(&self) -> &Self::Target {
        &self.registry
    }
}

/// Install a `tracing` subscriber honouring `RUST_LOG`, once per process.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use mocks::{FixedClock, GatedStore, Hold, UnreachableStore, test_clock};

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
    }

    #[tokio::test]
    async fn seeded_event_is_fully_available() {
        let registry = TestRegistry::new();
        let event = registry
            .seed_event(fixtures::EventFixture::new().capacity(3))
            .await;
        assert_eq!(registry.available_seats(event.id).await, 3);
        assert!(event.date > registry.now());
    }

    #[tokio::test]
    async fn seeded_users_get_distinct_emails() {
        let registry = TestRegistry::new();
        let a = registry.seed_user("Alice").await;
        let b = registry.seed_user("Bob").await;
        assert_ne!(a.email, b.email);
    }
}
