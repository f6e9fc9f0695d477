//! Seat inventory coordination.
//!
//! [`SeatInventory`] is the only writer of `Event::available_seats` and
//! `Registration::status`. Each operation runs read-only checks first and then
//! a single guarded write batch:
//!
//! ```text
//! register: [ events.update(availableSeats >= 1, inc -1),
//!             registrations.insert(unique active (userId, eventId)) ]
//! cancel:   [ registrations.update(status = active, set cancelled),
//!             events.update(availableSeats < capacity, inc +1) ]
//! ```
//!
//! The checks only produce friendly errors for the common case. Correctness
//! under concurrency comes from the guards, which the store evaluates
//! atomically with the writes; a racing request that slips past a check is
//! stopped by the batch and gets the same error.
//!
//! The batch runs on its own task. Dropping the caller's future (client
//! disconnect) before the batch starts applies nothing; once it has started it
//! runs to completion.

use crate::backend::BackendSelector;
use crate::error::{ConflictReason, RegistryError, Result};
use crate::metrics::RegistrationMetrics;
use crate::repository::Repository;
use rsvp_core::document::{Collection, ID_FIELD, from_document, to_document};
use rsvp_core::entity::Entity;
use rsvp_core::environment::Clock;
use rsvp_core::query::{CompareOp, Condition, Filter, Sort};
use rsvp_core::store::{BatchOutcome, StoreError, Update, WriteOp};
use rsvp_core::types::{Event, EventId, Registration, RegistrationId, RegistrationStatus, UserId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// A registration together with the event it refers to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationDetails {
    /// The registration
    #[serde(flatten)]
    pub registration: Registration,
    /// The referenced event
    pub event: Event,
}

/// A user's active registrations, split around the current time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MyRegistrations {
    /// Events dated now or later
    pub upcoming: Vec<RegistrationDetails>,
    /// Events dated before now
    pub past: Vec<RegistrationDetails>,
    /// `upcoming.len() + past.len()`
    pub total_registrations: usize,
}

fn active_registration(user_id: UserId, event_id: EventId) -> Filter {
    Filter::new()
        .eq("userId", user_id)
        .eq("eventId", event_id)
        .eq("status", RegistrationStatus::Active)
}

fn reject<T>(reason: ConflictReason) -> Result<T> {
    RegistrationMetrics::record_rejected(reason);
    tracing::info!(reason = reason.code(), "Request refused");
    Err(RegistryError::Conflict(reason))
}

/// Register/cancel coordinator over the events and registrations collections.
#[derive(Clone)]
pub struct SeatInventory {
    selector: Arc<BackendSelector>,
    events: Repository<Event>,
    registrations: Repository<Registration>,
    clock: Arc<dyn Clock>,
}

impl SeatInventory {
    /// Coordinator over the stores chosen by `selector`.
    #[must_use]
    pub fn new(selector: Arc<BackendSelector>, clock: Arc<dyn Clock>) -> Self {
        Self {
            events: Repository::new(Arc::clone(&selector)),
            registrations: Repository::new(Arc::clone(&selector)),
            selector,
            clock,
        }
    }

    /// Reserve a seat on `event_id` for `user_id`.
    ///
    /// # Errors
    ///
    /// - `NotFound`: unknown event
    /// - `Conflict(AlreadyRegistered)`: the user already holds an active registration
    /// - `Conflict(SoldOut)`: no seat left
    /// - `Storage`: the store failed; nothing was applied
    #[tracing::instrument(skip_all, fields(%user_id, %event_id))]
    pub async fn register(&self, user_id: UserId, event_id: EventId) -> Result<RegistrationDetails> {
        let mut event = self
            .events
            .find_by_id(event_id)
            .await?
            .ok_or_else(|| RegistryError::not_found(Event::NAME, event_id))?;

        if self
            .registrations
            .find_one(active_registration(user_id, event_id))
            .await?
            .is_some()
        {
            return reject(ConflictReason::AlreadyRegistered);
        }
        if !event.has_available_seats() {
            return reject(ConflictReason::SoldOut);
        }

        let registration = Registration::new(user_id, event_id, self.clock.now());
        let ops = vec![
            WriteOp::Update {
                collection: Collection::Events,
                id: event_id.into(),
                update: Update::new().inc("availableSeats", -1),
                guard: Filter::new().gte("availableSeats", 1_i64),
            },
            WriteOp::Insert {
                collection: Collection::Registrations,
                document: to_document(&registration)?,
                unique: registration.unique_key(),
            },
        ];

        let started = Instant::now();
        match self.commit(ops).await? {
            BatchOutcome::Committed { inserted } => {
                let stored = inserted.into_iter().next().ok_or_else(|| {
                    StoreError::Database("registration insert returned no document".to_string())
                })?;
                let registration: Registration = from_document(stored)?;
                event.available_seats = event.available_seats.saturating_sub(1);

                RegistrationMetrics::record_created(started.elapsed());
                tracing::info!(
                    registration_id = %registration.id,
                    available_seats = event.available_seats,
                    "Registered"
                );
                Ok(RegistrationDetails {
                    registration,
                    event,
                })
            }
            BatchOutcome::Rejected { step: 0 } => reject(ConflictReason::SoldOut),
            BatchOutcome::Rejected { .. } => reject(ConflictReason::AlreadyRegistered),
        }
    }

    /// Cancel `registration_id` on behalf of `user_id` and release its seat.
    ///
    /// # Errors
    ///
    /// - `NotFound`: unknown registration
    /// - `Forbidden`: the registration belongs to another user
    /// - `Conflict(AlreadyCancelled)`: already cancelled (possibly by a concurrent call)
    /// - `Storage`: the store failed or the seat count is already at capacity;
    ///   nothing was applied
    #[tracing::instrument(skip_all, fields(%registration_id, %user_id))]
    pub async fn cancel(&self, registration_id: RegistrationId, user_id: UserId) -> Result<()> {
        let registration = self
            .registrations
            .find_by_id(registration_id)
            .await?
            .ok_or_else(|| RegistryError::not_found(Registration::NAME, registration_id))?;

        if registration.user_id != user_id {
            tracing::warn!(owner = %registration.user_id, "Cancel attempted by non-owner");
            return Err(RegistryError::Forbidden("registration"));
        }
        if !registration.is_active() {
            return reject(ConflictReason::AlreadyCancelled);
        }

        let mut ops = vec![WriteOp::Update {
            collection: Collection::Registrations,
            id: registration_id.into(),
            update: Update::new().set("status", RegistrationStatus::Cancelled.as_str()),
            guard: Filter::new().eq("status", RegistrationStatus::Active),
        }];

        match self.events.find_by_id(registration.event_id).await? {
            Some(event) => ops.push(WriteOp::Update {
                collection: Collection::Events,
                id: event.id.into(),
                update: Update::new().inc("availableSeats", 1),
                guard: Filter::new().lt("availableSeats", event.capacity),
            }),
            None => tracing::warn!(
                event_id = %registration.event_id,
                "Event no longer exists, cancelling without releasing a seat"
            ),
        }

        let started = Instant::now();
        match self.commit(ops).await? {
            BatchOutcome::Committed { .. } => {
                RegistrationMetrics::record_cancelled(started.elapsed());
                tracing::info!("Cancelled");
                Ok(())
            }
            BatchOutcome::Rejected { step: 0 } => reject(ConflictReason::AlreadyCancelled),
            BatchOutcome::Rejected { .. } => {
                tracing::error!(
                    event_id = %registration.event_id,
                    "Seat count already at capacity while cancelling an active registration"
                );
                Err(StoreError::InvalidUpdate(format!(
                    "event {} is already at capacity",
                    registration.event_id
                ))
                .into())
            }
        }
    }

    /// Active registrations of `user_id` with their events, split into
    /// upcoming and past by the current time.
    ///
    /// # Errors
    ///
    /// - `Storage`: the store failed
    #[tracing::instrument(skip_all, fields(%user_id))]
    pub async fn my_registrations(&self, user_id: UserId) -> Result<MyRegistrations> {
        let registrations = self
            .registrations
            .find(
                Filter::new()
                    .eq("userId", user_id)
                    .eq("status", RegistrationStatus::Active),
            )
            .sort(Sort::descending("registeredAt"))
            .all()
            .await?;

        let mut events: HashMap<EventId, Event> = HashMap::new();
        if !registrations.is_empty() {
            let ids = registrations
                .iter()
                .map(|r| Condition::compare(ID_FIELD, CompareOp::Eq, r.event_id))
                .collect();
            for event in self.events.find(Filter::new().any_of(ids)).all().await? {
                events.insert(event.id, event);
            }
        }

        let now = self.clock.now();
        let mut upcoming = Vec::new();
        let mut past = Vec::new();
        for registration in registrations {
            let Some(event) = events.get(&registration.event_id).cloned() else {
                tracing::warn!(
                    registration_id = %registration.id,
                    event_id = %registration.event_id,
                    "Skipping registration whose event no longer exists"
                );
                continue;
            };
            let details = RegistrationDetails {
                registration,
                event,
            };
            if details.event.date >= now {
                upcoming.push(details);
            } else {
                past.push(details);
            }
        }

        Ok(MyRegistrations {
            total_registrations: upcoming.len() + past.len(),
            upcoming,
            past,
        })
    }

    /// Run a batch on its own task so a dropped caller cannot abort it midway.
    async fn commit(&self, ops: Vec<WriteOp>) -> Result<BatchOutcome> {
        let store = self.selector.store();
        let task = tokio::spawn(async move { store.commit(ops).await });
        match task.await {
            Ok(outcome) => Ok(outcome?),
            Err(e) => Err(StoreError::Database(format!("commit task failed: {e}")).into()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use chrono::{DateTime, TimeZone, Utc};
    use rsvp_core::environment::SystemClock;

    struct Fixed(DateTime<Utc>);

    impl Clock for Fixed {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    struct Harness {
        seats: SeatInventory,
        events: Repository<Event>,
        registrations: Repository<Registration>,
    }

    fn harness(clock: Arc<dyn Clock>) -> Harness {
        let selector = Arc::new(BackendSelector::fallback_only(Arc::new(MemoryStore::new())));
        Harness {
            seats: SeatInventory::new(Arc::clone(&selector), clock),
            events: Repository::new(Arc::clone(&selector)),
            registrations: Repository::new(selector),
        }
    }

    async fn event(h: &Harness, capacity: u32, date: DateTime<Utc>) -> Event {
        h.events
            .create(Event::new(
                "Meetup", "Org", "Oslo", date, "Talks", "Technology", capacity, date,
            ))
            .await
            .unwrap()
    }

    async fn seats_left(h: &Harness, id: EventId) -> u32 {
        h.events.find_by_id(id).await.unwrap().unwrap().available_seats
    }

    fn tomorrow() -> DateTime<Utc> {
        Utc::now() + chrono::Duration::days(1)
    }

    #[tokio::test]
    async fn register_takes_a_seat() {
        let h = harness(Arc::new(SystemClock));
        let e = event(&h, 3, tomorrow()).await;
        let user = UserId::new();

        let details = h.seats.register(user, e.id).await.unwrap();

        assert_eq!(details.registration.user_id, user);
        assert_eq!(details.event.id, e.id);
        assert_eq!(details.event.available_seats, 2);
        assert_eq!(seats_left(&h, e.id).await, 2);
    }

    #[tokio::test]
    async fn unknown_event_is_not_found() {
        let h = harness(Arc::new(SystemClock));
        let error = h.seats.register(UserId::new(), EventId::new()).await.unwrap_err();
        assert!(matches!(error, RegistryError::NotFound { entity: "Event", .. }));
    }

    #[tokio::test]
    async fn capacity_one_scenario() {
        let h = harness(Arc::new(SystemClock));
        let e = event(&h, 1, tomorrow()).await;
        let (a, b) = (UserId::new(), UserId::new());

        h.seats.register(a, e.id).await.unwrap();
        let again = h.seats.register(a, e.id).await.unwrap_err();
        let other = h.seats.register(b, e.id).await.unwrap_err();

        assert_eq!(again.conflict_reason(), Some(ConflictReason::AlreadyRegistered));
        assert_eq!(other.conflict_reason(), Some(ConflictReason::SoldOut));
        assert_eq!(seats_left(&h, e.id).await, 0);
    }

    #[tokio::test]
    async fn register_cancel_register_round_trip() {
        let h = harness(Arc::new(SystemClock));
        let e = event(&h, 2, tomorrow()).await;
        let user = UserId::new();

        let first = h.seats.register(user, e.id).await.unwrap();
        h.seats.cancel(first.registration.id, user).await.unwrap();
        assert_eq!(seats_left(&h, e.id).await, 2);

        h.seats.register(user, e.id).await.unwrap();
        assert_eq!(seats_left(&h, e.id).await, 1);
        assert_eq!(
            h.registrations
                .count(active_registration(user, e.id))
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn cancelling_twice_reports_already_cancelled() {
        let h = harness(Arc::new(SystemClock));
        let e = event(&h, 2, tomorrow()).await;
        let user = UserId::new();
        let details = h.seats.register(user, e.id).await.unwrap();

        h.seats.cancel(details.registration.id, user).await.unwrap();
        let error = h.seats.cancel(details.registration.id, user).await.unwrap_err();

        assert_eq!(error.conflict_reason(), Some(ConflictReason::AlreadyCancelled));
        assert_eq!(seats_left(&h, e.id).await, 2);
    }

    #[tokio::test]
    async fn cancel_by_another_user_is_forbidden() {
        let h = harness(Arc::new(SystemClock));
        let e = event(&h, 2, tomorrow()).await;
        let owner = UserId::new();
        let details = h.seats.register(owner, e.id).await.unwrap();

        let error = h
            .seats
            .cancel(details.registration.id, UserId::new())
            .await
            .unwrap_err();

        assert!(matches!(error, RegistryError::Forbidden(_)));
        assert_eq!(seats_left(&h, e.id).await, 1);
    }

    #[tokio::test]
    async fn cancel_unknown_registration_is_not_found() {
        let h = harness(Arc::new(SystemClock));
        let error = h
            .seats
            .cancel(RegistrationId::new(), UserId::new())
            .await
            .unwrap_err();
        assert!(matches!(error, RegistryError::NotFound { .. }));
    }

    #[tokio::test]
    async fn my_registrations_splits_on_clock() {
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap();
        let h = harness(Arc::new(Fixed(now)));
        let user = UserId::new();

        let past = event(&h, 5, Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap()).await;
        let exact = event(&h, 5, now).await;
        let future = event(&h, 5, Utc.with_ymd_and_hms(2026, 7, 1, 9, 0, 0).unwrap()).await;
        let cancelled = event(&h, 5, Utc.with_ymd_and_hms(2026, 8, 1, 9, 0, 0).unwrap()).await;

        for e in [&past, &exact, &future] {
            h.seats.register(user, e.id).await.unwrap();
        }
        let dropped = h.seats.register(user, cancelled.id).await.unwrap();
        h.seats.cancel(dropped.registration.id, user).await.unwrap();
        h.seats.register(UserId::new(), future.id).await.unwrap();

        let mine = h.seats.my_registrations(user).await.unwrap();

        let mut upcoming: Vec<_> = mine.upcoming.iter().map(|d| d.event.id).collect();
        upcoming.sort();
        let mut expected = vec![exact.id, future.id];
        expected.sort();
        assert_eq!(upcoming, expected);
        assert_eq!(mine.past.len(), 1);
        assert_eq!(mine.past[0].event.id, past.id);
        assert_eq!(mine.total_registrations, 3);
    }

    #[tokio::test]
    async fn details_serialize_flat_with_event() {
        let h = harness(Arc::new(SystemClock));
        let e = event(&h, 2, tomorrow()).await;
        let details = h.seats.register(UserId::new(), e.id).await.unwrap();

        let json = serde_json::to_value(&details).unwrap();
        assert_eq!(json["status"], "active");
        assert_eq!(json["eventId"], e.id.to_string());
        assert_eq!(json["event"]["availableSeats"], 1);
    }
}
