//! Seat inventory behaviour under concurrency and arbitrary operation
//! sequences, against the fallback store.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use proptest::prelude::*;
use rsvp_core::query::Filter;
use rsvp_core::types::{RegistrationId, RegistrationStatus, UserId};
use rsvp_runtime::{BackendMode, BackendSelector, ConflictReason, MemoryStore, Registry};
use rsvp_testing::fixtures::EventFixture;
use rsvp_testing::properties::{SeatOp, seat_ops};
use rsvp_testing::{GatedStore, Hold, TestRegistry, UnreachableStore, init_tracing, test_clock};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_registrations_never_oversell() {
    init_tracing();
    let registry = TestRegistry::new();
    let capacity = 5;
    let attempts = 40;
    let event = registry
        .seed_event(EventFixture::new().capacity(capacity))
        .await;

    let handles: Vec<_> = (0..attempts)
        .map(|_| {
            let seats = registry.seats.clone();
            tokio::spawn(async move { seats.register(UserId::new(), event.id).await })
        })
        .collect();

    let mut successes = 0;
    let mut sold_out = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(e) if e.conflict_reason() == Some(ConflictReason::SoldOut) => sold_out += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(successes, capacity);
    assert_eq!(sold_out, attempts - capacity);
    assert_eq!(registry.available_seats(event.id).await, 0);
    assert_eq!(
        registry
            .registrations
            .count(Filter::new().eq("status", RegistrationStatus::Active))
            .await
            .unwrap(),
        u64::from(capacity)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_duplicate_registrations_create_one() {
    let registry = TestRegistry::new();
    let event = registry.seed_event(EventFixture::new().capacity(10)).await;
    let user = UserId::new();

    let handles: Vec<_> = (0..20)
        .map(|_| {
            let seats = registry.seats.clone();
            tokio::spawn(async move { seats.register(user, event.id).await })
        })
        .collect();

    let mut successes = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(e) => assert_eq!(e.conflict_reason(), Some(ConflictReason::AlreadyRegistered)),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(registry.available_seats(event.id).await, 9);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_cancels_release_one_seat() {
    let registry = TestRegistry::new();
    let event = registry.seed_event(EventFixture::new().capacity(3)).await;
    let user = UserId::new();
    let details = registry.seats.register(user, event.id).await.unwrap();

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let seats = registry.seats.clone();
            let id = details.registration.id;
            tokio::spawn(async move { seats.cancel(id, user).await })
        })
        .collect();

    let mut successes = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) => successes += 1,
            Err(e) => assert_eq!(e.conflict_reason(), Some(ConflictReason::AlreadyCancelled)),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(registry.available_seats(event.id).await, 3);
}

#[tokio::test]
async fn unreachable_primary_falls_back_and_keeps_serving() {
    let selector = BackendSelector::initialize(
        Arc::new(MemoryStore::new()),
        async { Ok(Arc::new(UnreachableStore) as Arc<dyn rsvp_core::store::RecordStore>) },
        rsvp_runtime::DEFAULT_CONNECT_TIMEOUT,
    )
    .await;
    assert_eq!(selector.mode(), BackendMode::Fallback);

    let registry = Registry::new(Arc::new(selector), Arc::new(test_clock()));
    let event = registry
        .events
        .create(EventFixture::new().capacity(1).build(chrono::Utc::now()))
        .await
        .unwrap();
    registry.seats.register(UserId::new(), event.id).await.unwrap();
}

async fn active_registrations(registry: &TestRegistry) -> u64 {
    registry
        .registrations
        .count(Filter::new().eq("status", RegistrationStatus::Active))
        .await
        .unwrap()
}

#[tokio::test]
async fn dropped_request_still_completes_its_batch() {
    let gated = GatedStore::new(Arc::new(MemoryStore::new()), Hold::Batches);
    let registry = TestRegistry::over(Arc::new(gated.clone()));
    let event = registry.seed_event(EventFixture::new().capacity(2)).await;

    // The caller goes away once its batch is in the store's hands
    tokio::select! {
        _ = registry.seats.register(UserId::new(), event.id) => panic!("batch should be held"),
        () = gated.arrived() => {}
    }
    gated.open();

    tokio::time::timeout(Duration::from_secs(5), async {
        while registry.available_seats(event.id).await != 1 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("batch should finish without its caller");
    assert_eq!(active_registrations(&registry).await, 1);
}

#[tokio::test]
async fn request_dropped_before_its_batch_applies_nothing() {
    let gated = GatedStore::new(Arc::new(MemoryStore::new()), Hold::Reads);
    let registry = TestRegistry::over(Arc::new(gated.clone()));
    let event = registry.seed_event(EventFixture::new().capacity(2)).await;

    tokio::select! {
        _ = registry.seats.register(UserId::new(), event.id) => panic!("read should be held"),
        () = gated.arrived() => {}
    }
    gated.open();
    tokio::task::yield_now().await;

    assert_eq!(registry.available_seats(event.id).await, 2);
    assert_eq!(active_registrations(&registry).await, 0);
}

fn run_sequence(ops: &[SeatOp], capacity: u32) -> Result<(), TestCaseError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    runtime.block_on(async {
        let registry = TestRegistry::new();
        let event = registry
            .seed_event(EventFixture::new().capacity(capacity))
            .await;
        let users: Vec<UserId> = (0..4).map(|_| UserId::new()).collect();
        let mut latest: Vec<Option<RegistrationId>> = vec![None; users.len()];

        for op in ops {
            match *op {
                SeatOp::Register(i) => {
                    if let Ok(details) = registry.seats.register(users[i], event.id).await {
                        latest[i] = Some(details.registration.id);
                    }
                }
                SeatOp::Cancel(i) => {
                    if let Some(id) = latest[i] {
                        let _ = registry.seats.cancel(id, users[i]).await;
                    }
                }
            }

            let seats = registry.available_seats(event.id).await;
            prop_assert!(seats <= capacity);

            let mut active_total = 0;
            for user in &users {
                let active = registry
                    .registrations
                    .count(
                        Filter::new()
                            .eq("userId", *user)
                            .eq("eventId", event.id)
                            .eq("status", RegistrationStatus::Active),
                    )
                    .await
                    .unwrap();
                prop_assert!(active <= 1);
                active_total += active;
            }
            prop_assert_eq!(u64::from(capacity - seats), active_total);
        }
        Ok(())
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn seat_count_tracks_active_registrations(ops in seat_ops(4, 30), capacity in 1u32..4) {
        run_sequence(&ops, capacity)?;
    }
}
