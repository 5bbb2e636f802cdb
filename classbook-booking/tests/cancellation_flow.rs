use async_trait::async_trait;
use chrono::{Duration, Utc};
use classbook_booking::{
    BookingError, BookingRequest, BookingStore, CancellationOrchestrator, NotificationCenter,
    OutboxMailTransport, RefundResult, RefundState, RemoteSync, StoreError,
};
use classbook_core::refund::SimulatedRefundProvider;
use classbook_core::remote::InMemoryClassApi;
use classbook_core::repository::SnapshotRepository;
use classbook_core::CoreResult;
use classbook_shared::{
    Booking, BookingEvent, BookingStatus, CancellationInitiator, ClassSummary, EnhancedBooking,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

struct Harness {
    orchestrator: Arc<CancellationOrchestrator>,
    refunds: Arc<SimulatedRefundProvider>,
    api: Arc<InMemoryClassApi>,
    outbox: Arc<OutboxMailTransport>,
    class: ClassSummary,
}

fn swimming_class(auto_confirm: bool) -> ClassSummary {
    ClassSummary {
        id: Uuid::new_v4(),
        name: "Junior Swimming".to_string(),
        provider_id: "provider-1".to_string(),
        provider_name: "Aqua Kids".to_string(),
        location: "Leisure Centre".to_string(),
        price: dec!(15.00),
        currency: "GBP".to_string(),
        auto_confirm,
    }
}

fn harness_with(refunds: SimulatedRefundProvider, auto_confirm: bool) -> Harness {
    let class = swimming_class(auto_confirm);
    let refunds = Arc::new(refunds);
    let api = Arc::new(InMemoryClassApi::new(vec![class.clone()]));
    let outbox = Arc::new(OutboxMailTransport::new());

    let orchestrator = CancellationOrchestrator::new(
        Arc::new(BookingStore::new()),
        refunds.clone(),
        api.clone(),
        Arc::new(NotificationCenter::new()),
    )
    .with_mailer(outbox.clone());

    Harness {
        orchestrator: Arc::new(orchestrator),
        refunds,
        api,
        outbox,
        class,
    }
}

fn harness() -> Harness {
    harness_with(SimulatedRefundProvider::instant(), false)
}

/// Put a booking straight into the store
fn seed(h: &Harness, user_id: &str, starts_in: Duration, participants: u32, status: BookingStatus) -> Uuid {
    let mut booking = Booking::new(h.class.id, user_id, Utc::now() + starts_in, participants).unwrap();
    booking.status = status;
    let enhanced = EnhancedBooking::new(booking, h.class.snapshot()).unwrap();
    let id = enhanced.id();
    h.orchestrator.store().upsert(enhanced).unwrap();
    id
}

fn titled(h: &Harness, user_id: &str, title: &str) -> Vec<classbook_shared::Notification> {
    h.orchestrator
        .notifications()
        .for_user(user_id)
        .into_iter()
        .filter(|n| n.title == title)
        .collect()
}

fn status_of(h: &Harness, booking_id: &Uuid) -> BookingStatus {
    h.orchestrator.store().get(booking_id).unwrap().status()
}

#[tokio::test]
async fn test_early_cancellation_is_refunded() {
    let h = harness();
    let booking_id = seed(&h, "parent-1", Duration::hours(48), 2, BookingStatus::Upcoming);

    let outcome = h
        .orchestrator
        .cancel_booking(booking_id, CancellationInitiator::Parent)
        .await
        .unwrap();

    assert!(outcome.refund_eligible);
    assert_eq!(outcome.refund_amount, dec!(28.01));
    assert_eq!(outcome.service_fee, dec!(1.99));
    assert!(matches!(outcome.refund, RefundResult::Processed { .. }));
    assert_eq!(status_of(&h, &booking_id), BookingStatus::Cancelled);

    let processed = titled(&h, "parent-1", "Refund processed");
    assert_eq!(processed.len(), 1);
    assert!(processed[0].message.contains("28.01"));
    assert_eq!(h.refunds.attempts(), 1);

    // Parent cancelled, so the provider hears about it
    assert_eq!(titled(&h, "provider-1", "Booking cancelled").len(), 1);
    let sent = h.outbox.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "provider-1");
}

#[tokio::test]
async fn test_late_cancellation_has_no_refund() {
    let h = harness();
    let booking_id = seed(&h, "parent-1", Duration::hours(10), 2, BookingStatus::Upcoming);

    let outcome = h
        .orchestrator
        .cancel_booking(booking_id, CancellationInitiator::Parent)
        .await
        .unwrap();

    assert!(!outcome.refund_eligible);
    assert_eq!(outcome.refund_amount, Decimal::ZERO);
    assert_eq!(outcome.refund, RefundResult::NotApplicable);
    assert_eq!(status_of(&h, &booking_id), BookingStatus::Cancelled);
    assert_eq!(h.refunds.attempts(), 0);

    let no_refund = titled(&h, "parent-1", "No refund due");
    assert_eq!(no_refund.len(), 1);
    assert!(no_refund[0].message.contains("late cancellation"));
    assert!(titled(&h, "parent-1", "Refund processed").is_empty());
}

#[tokio::test]
async fn test_cancelling_a_cancelled_booking_is_rejected() {
    let h = harness();
    let booking_id = seed(&h, "parent-1", Duration::hours(48), 1, BookingStatus::Cancelled);
    let before = h.orchestrator.notifications().len();

    let result = h
        .orchestrator
        .cancel_booking(booking_id, CancellationInitiator::Parent)
        .await;

    assert!(matches!(
        result,
        Err(BookingError::InvalidState { status: BookingStatus::Cancelled, .. })
    ));
    assert_eq!(h.orchestrator.notifications().len(), before);
    assert_eq!(status_of(&h, &booking_id), BookingStatus::Cancelled);
    assert_eq!(h.refunds.attempts(), 0);
}

#[tokio::test]
async fn test_second_cancellation_never_refunds_twice() {
    let h = harness();
    let booking_id = seed(&h, "parent-1", Duration::days(5), 1, BookingStatus::Upcoming);

    h.orchestrator
        .cancel_booking(booking_id, CancellationInitiator::Parent)
        .await
        .unwrap();
    let second = h
        .orchestrator
        .cancel_booking(booking_id, CancellationInitiator::Provider)
        .await;

    assert!(matches!(second, Err(BookingError::InvalidState { .. })));
    assert_eq!(h.refunds.attempts(), 1);
    assert_eq!(titled(&h, "parent-1", "Refund processed").len(), 1);
}

#[tokio::test]
async fn test_only_upcoming_bookings_can_be_cancelled() {
    let h = harness();
    for status in [
        BookingStatus::Draft,
        BookingStatus::Pending,
        BookingStatus::InProgress,
        BookingStatus::Completed,
    ] {
        let booking_id = seed(&h, "parent-1", Duration::days(2), 1, status);
        let result = h
            .orchestrator
            .cancel_booking(booking_id, CancellationInitiator::Parent)
            .await;

        match result {
            Err(BookingError::InvalidState { status: reported, reason }) => {
                assert_eq!(reported, status);
                assert!(!reason.is_empty());
            }
            other => panic!("expected InvalidState for {}, got {:?}", status, other),
        }
        assert_eq!(status_of(&h, &booking_id), status);
    }
    assert!(h.orchestrator.notifications().is_empty());
}

#[tokio::test]
async fn test_missing_booking() {
    let h = harness();
    let missing = Uuid::new_v4();
    let result = h
        .orchestrator
        .cancel_booking(missing, CancellationInitiator::Parent)
        .await;
    assert_eq!(result.unwrap_err(), BookingError::NotFound(missing));
}

#[tokio::test]
async fn test_bulk_cancellation_isolates_refund_failure() {
    let h = harness();
    let first = seed(&h, "parent-1", Duration::hours(48), 2, BookingStatus::Upcoming);
    let second = seed(&h, "parent-2", Duration::hours(48), 2, BookingStatus::Upcoming);
    let third = seed(&h, "parent-3", Duration::hours(48), 2, BookingStatus::Upcoming);
    h.refunds.fail_for(second);

    let report = h.orchestrator.cancel_class(h.class.id).await.unwrap();

    assert_eq!(report.cancelled, 3);
    assert_eq!(report.refunds_processed, 2);
    assert_eq!(report.refunds_delayed, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(report.remote_sync, RemoteSync::Synced);
    assert!(report.is_partial_failure());
    assert_eq!(h.api.cancelled_classes(), vec![h.class.id]);

    for booking_id in [first, second, third] {
        assert_eq!(status_of(&h, &booking_id), BookingStatus::Cancelled);
    }

    let processed: usize = ["parent-1", "parent-2", "parent-3"]
        .iter()
        .map(|p| titled(&h, p, "Refund processed").len())
        .sum();
    assert_eq!(processed, 2);
    assert_eq!(titled(&h, "parent-2", "Refund delayed: contact support").len(), 1);

    // Provider cancelled, each parent is told
    for parent in ["parent-1", "parent-2", "parent-3"] {
        assert_eq!(titled(&h, parent, "Booking cancelled").len(), 1);
    }
    assert_eq!(h.orchestrator.pending_refunds().len(), 1);
}

#[tokio::test]
async fn test_bulk_cancellation_survives_remote_failure() {
    let h = harness();
    let upcoming = seed(&h, "parent-1", Duration::hours(30), 1, BookingStatus::Upcoming);
    let pending = seed(&h, "parent-2", Duration::hours(30), 1, BookingStatus::Pending);
    h.api.set_offline(true);

    let report = h.orchestrator.cancel_class(h.class.id).await.unwrap();

    assert!(matches!(report.remote_sync, RemoteSync::Failed { .. }));
    assert!(report.is_partial_failure());
    assert_eq!(report.cancelled, 1);
    assert_eq!(status_of(&h, &upcoming), BookingStatus::Cancelled);
    // Only upcoming bookings are part of the batch
    assert_eq!(status_of(&h, &pending), BookingStatus::Pending);
}

#[tokio::test]
async fn test_delete_class_cancels_bookings() {
    let h = harness();
    let booking_id = seed(&h, "parent-1", Duration::hours(72), 1, BookingStatus::Upcoming);

    let report = h.orchestrator.delete_class(h.class.id).await.unwrap();

    assert_eq!(report.remote_sync, RemoteSync::Synced);
    assert_eq!(report.refunds_processed, 1);
    assert_eq!(status_of(&h, &booking_id), BookingStatus::Cancelled);
    assert_eq!(h.orchestrator.refresh_catalog().await.unwrap(), 0);

    // Provider cancelled, so the email goes to the parent
    let sent = h.outbox.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "parent-1");
}

#[tokio::test]
async fn test_cancellation_in_flight_is_rejected() {
    let h = harness_with(SimulatedRefundProvider::new(std::time::Duration::from_millis(300)), false);
    let booking_id = seed(&h, "parent-1", Duration::hours(48), 1, BookingStatus::Upcoming);

    let handle = h
        .orchestrator
        .cancel_booking_detached(booking_id, CancellationInitiator::Parent);

    // Wait for the transition, the refund is still sleeping
    for _ in 0..100 {
        if status_of(&h, &booking_id) == BookingStatus::Cancelled {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    assert_eq!(status_of(&h, &booking_id), BookingStatus::Cancelled);

    let second = h
        .orchestrator
        .cancel_booking(booking_id, CancellationInitiator::Parent)
        .await;
    assert!(matches!(
        second,
        Err(BookingError::InvalidState { status: BookingStatus::Cancelled, .. })
    ));

    let first = handle.await.unwrap().unwrap();
    assert!(matches!(first.refund, RefundResult::Processed { .. }));
    assert_eq!(h.refunds.attempts(), 1);
}

#[tokio::test]
async fn test_detached_refund_completes_after_handle_dropped() {
    let h = harness_with(SimulatedRefundProvider::new(std::time::Duration::from_millis(50)), false);
    let booking_id = seed(&h, "parent-1", Duration::hours(48), 1, BookingStatus::Upcoming);

    drop(
        h.orchestrator
            .cancel_booking_detached(booking_id, CancellationInitiator::Provider),
    );

    let mut delivered = false;
    for _ in 0..100 {
        if !titled(&h, "parent-1", "Refund processed").is_empty() {
            delivered = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(delivered);
    assert_eq!(
        h.orchestrator.refund_entry(&booking_id).unwrap().state,
        RefundState::Processed
    );
}

#[tokio::test]
async fn test_delayed_refund_retry() {
    let h = harness();
    let booking_id = seed(&h, "parent-1", Duration::hours(48), 2, BookingStatus::Upcoming);
    h.refunds.fail_for(booking_id);

    let outcome = h
        .orchestrator
        .cancel_booking(booking_id, CancellationInitiator::Parent)
        .await
        .unwrap();
    assert!(matches!(outcome.refund, RefundResult::Delayed { .. }));
    assert_eq!(status_of(&h, &booking_id), BookingStatus::Cancelled);
    assert_eq!(titled(&h, "parent-1", "Refund delayed: contact support").len(), 1);

    h.refunds.recover(booking_id);
    let retried = h.orchestrator.retry_refund(booking_id).await.unwrap();
    assert!(matches!(retried.refund, RefundResult::Processed { .. }));
    assert_eq!(retried.refund_amount, dec!(28.01));
    assert_eq!(titled(&h, "parent-1", "Refund processed").len(), 1);

    let again = h.orchestrator.retry_refund(booking_id).await;
    assert!(matches!(again, Err(BookingError::InvalidState { .. })));
    assert_eq!(h.refunds.attempts(), 2);
}

#[tokio::test]
async fn test_bulk_cancellation_finishes_when_caller_gives_up() {
    let h = harness_with(SimulatedRefundProvider::new(std::time::Duration::from_millis(200)), false);
    let booking_id = seed(&h, "parent-1", Duration::hours(48), 2, BookingStatus::Upcoming);

    let abandoned = tokio::time::timeout(
        std::time::Duration::from_millis(50),
        h.orchestrator.cancel_class(h.class.id),
    )
    .await;
    assert!(abandoned.is_err());

    tokio::time::sleep(std::time::Duration::from_millis(400)).await;

    assert_eq!(status_of(&h, &booking_id), BookingStatus::Cancelled);
    assert_eq!(titled(&h, "parent-1", "Refund processed").len(), 1);
    assert_eq!(
        h.orchestrator.refund_entry(&booking_id).unwrap().state,
        RefundState::Processed
    );
    assert!(h.orchestrator.pending_refunds().is_empty());
    assert_eq!(h.api.cancelled_classes(), vec![h.class.id]);
}

#[tokio::test]
async fn test_refund_retry_finishes_when_caller_gives_up() {
    let h = harness_with(SimulatedRefundProvider::new(std::time::Duration::from_millis(200)), false);
    let booking_id = seed(&h, "parent-1", Duration::hours(48), 2, BookingStatus::Upcoming);
    h.refunds.fail_for(booking_id);

    let outcome = h
        .orchestrator
        .cancel_booking(booking_id, CancellationInitiator::Parent)
        .await
        .unwrap();
    assert!(matches!(outcome.refund, RefundResult::Delayed { .. }));

    h.refunds.recover(booking_id);
    let abandoned = tokio::time::timeout(
        std::time::Duration::from_millis(50),
        h.orchestrator.retry_refund(booking_id),
    )
    .await;
    assert!(abandoned.is_err());

    // The retry is still talking to the provider
    let racing = h.orchestrator.retry_refund(booking_id).await;
    match racing {
        Err(BookingError::InvalidState { reason, .. }) => {
            assert!(reason.contains("still being sent"), "unexpected reason: {}", reason)
        }
        other => panic!("expected InvalidState, got {:?}", other),
    }

    tokio::time::sleep(std::time::Duration::from_millis(400)).await;

    assert_eq!(
        h.orchestrator.refund_entry(&booking_id).unwrap().state,
        RefundState::Processed
    );
    assert_eq!(titled(&h, "parent-1", "Refund processed").len(), 1);
    assert!(h.orchestrator.pending_refunds().is_empty());
    assert_eq!(h.refunds.attempts(), 2);
}

#[tokio::test]
async fn test_stale_copy_cannot_reopen_cancelled_booking() {
    let h = harness();
    let booking_id = seed(&h, "parent-1", Duration::hours(48), 2, BookingStatus::Upcoming);
    let stale = h.orchestrator.store().get(&booking_id).unwrap();

    h.orchestrator
        .cancel_booking(booking_id, CancellationInitiator::Parent)
        .await
        .unwrap();

    let reopened = h.orchestrator.store().upsert(stale);
    assert_eq!(
        reopened.unwrap_err(),
        StoreError::InvalidTransition {
            from: BookingStatus::Cancelled,
            to: BookingStatus::Upcoming,
        }
    );
    assert_eq!(status_of(&h, &booking_id), BookingStatus::Cancelled);

    let again = h
        .orchestrator
        .cancel_booking(booking_id, CancellationInitiator::Parent)
        .await;
    assert!(matches!(again, Err(BookingError::InvalidState { .. })));
    assert_eq!(titled(&h, "parent-1", "Refund processed").len(), 1);
    assert_eq!(h.refunds.attempts(), 1);
}

#[tokio::test]
async fn test_events_are_broadcast() {
    let h = harness();
    let mut events = h.orchestrator.subscribe();
    let booking_id = seed(&h, "parent-1", Duration::hours(48), 1, BookingStatus::Upcoming);

    h.orchestrator
        .cancel_booking(booking_id, CancellationInitiator::Parent)
        .await
        .unwrap();

    let first = events.recv().await.unwrap();
    assert!(matches!(first, BookingEvent::RefundProcessed { .. }));
    let second = events.recv().await.unwrap();
    assert!(matches!(second, BookingEvent::BookingCancelled { initiated_by: CancellationInitiator::Parent, .. }));
    assert_eq!(second.booking_id(), booking_id);
}

#[tokio::test]
async fn test_booking_request_then_confirmation() {
    let h = harness();
    let request = BookingRequest {
        class_id: h.class.id,
        user_id: "parent-9".to_string(),
        scheduled_at: Utc::now() + Duration::days(4),
        number_of_participants: 2,
        children: vec![Uuid::new_v4(), Uuid::new_v4()],
        special_requirements: Some("One child uses a wheelchair".to_string()),
    };

    let booked = h.orchestrator.book_class(request).await.unwrap();
    assert_eq!(booked.status(), BookingStatus::Pending);
    assert_eq!(booked.class_name(), "Junior Swimming");
    assert_eq!(titled(&h, "provider-1", "New booking request").len(), 1);

    let confirmed = h.orchestrator.confirm_booking(booked.id()).await.unwrap();
    assert_eq!(confirmed.status(), BookingStatus::Upcoming);
    assert_eq!(titled(&h, "parent-9", "Booking confirmed").len(), 1);

    // Confirming twice is a store-level transition error
    let again = h.orchestrator.confirm_booking(booked.id()).await;
    assert!(matches!(again, Err(BookingError::InvalidTransition { .. })));
}

#[tokio::test]
async fn test_auto_confirmed_booking_is_upcoming() {
    let h = harness_with(SimulatedRefundProvider::instant(), true);
    let booked = h
        .orchestrator
        .book_class(BookingRequest {
            class_id: h.class.id,
            user_id: "parent-4".to_string(),
            scheduled_at: Utc::now() + Duration::days(1),
            number_of_participants: 1,
            children: Vec::new(),
            special_requirements: None,
        })
        .await
        .unwrap();

    assert_eq!(booked.status(), BookingStatus::Upcoming);
    assert_eq!(titled(&h, "parent-4", "Booking confirmed").len(), 1);
}

#[tokio::test]
async fn test_booking_validation() {
    let h = harness();
    let unknown = Uuid::new_v4();
    let result = h
        .orchestrator
        .book_class(BookingRequest {
            class_id: unknown,
            user_id: "parent-1".to_string(),
            scheduled_at: Utc::now() + Duration::days(1),
            number_of_participants: 1,
            children: Vec::new(),
            special_requirements: None,
        })
        .await;
    assert_eq!(result.unwrap_err(), BookingError::ClassNotFound(unknown));

    let result = h
        .orchestrator
        .book_class(BookingRequest {
            class_id: h.class.id,
            user_id: "parent-1".to_string(),
            scheduled_at: Utc::now() + Duration::days(1),
            number_of_participants: 0,
            children: Vec::new(),
            special_requirements: None,
        })
        .await;
    assert!(matches!(result, Err(BookingError::Validation(_))));
    assert!(h.orchestrator.store().is_empty());
}

#[derive(Default)]
struct MemorySnapshot {
    saved: Mutex<Vec<EnhancedBooking>>,
}

#[async_trait]
impl SnapshotRepository for MemorySnapshot {
    async fn save(&self, bookings: &[EnhancedBooking]) -> CoreResult<()> {
        *self.saved.lock().unwrap() = bookings.to_vec();
        Ok(())
    }

    async fn load(&self) -> CoreResult<Vec<EnhancedBooking>> {
        Ok(self.saved.lock().unwrap().clone())
    }
}

#[tokio::test]
async fn test_snapshot_write_through_and_restore() {
    let class = swimming_class(false);
    let snapshot = Arc::new(MemorySnapshot::default());
    let api = Arc::new(InMemoryClassApi::new(vec![class.clone()]));

    let orchestrator = CancellationOrchestrator::new(
        Arc::new(BookingStore::new()),
        Arc::new(SimulatedRefundProvider::instant()),
        api.clone(),
        Arc::new(NotificationCenter::new()),
    )
    .with_snapshot(snapshot.clone());

    let mut booking = Booking::new(class.id, "parent-1", Utc::now() + Duration::days(3), 1).unwrap();
    booking.status = BookingStatus::Upcoming;
    let enhanced = EnhancedBooking::new(booking, class.snapshot()).unwrap();
    let booking_id = enhanced.id();
    orchestrator.store().upsert(enhanced).unwrap();

    orchestrator
        .cancel_booking(booking_id, CancellationInitiator::Parent)
        .await
        .unwrap();

    let restored = CancellationOrchestrator::new(
        Arc::new(BookingStore::new()),
        Arc::new(SimulatedRefundProvider::instant()),
        api,
        Arc::new(NotificationCenter::new()),
    )
    .with_snapshot(snapshot);

    assert_eq!(restored.restore_snapshot().await.unwrap(), 1);
    assert_eq!(
        restored.store().get(&booking_id).unwrap().status(),
        BookingStatus::Cancelled
    );
}

#[tokio::test]
async fn test_preview_leaves_booking_untouched() {
    let h = harness();
    let booking_id = seed(&h, "parent-1", Duration::hours(48), 2, BookingStatus::Upcoming);

    let decision = h.orchestrator.preview_cancellation(booking_id).unwrap();
    assert!(decision.refund_eligible);
    assert_eq!(decision.refund_amount, dec!(28.01));
    assert_eq!(status_of(&h, &booking_id), BookingStatus::Upcoming);
    assert!(h.orchestrator.notifications().is_empty());

    let finished = seed(&h, "parent-1", Duration::hours(-3), 2, BookingStatus::Completed);
    assert!(matches!(
        h.orchestrator.preview_cancellation(finished),
        Err(BookingError::InvalidState { status: BookingStatus::Completed, .. })
    ));
}

#[tokio::test]
async fn test_attendance_only_after_class() {
    let h = harness();
    let future = seed(&h, "parent-1", Duration::hours(5), 1, BookingStatus::Upcoming);
    let past = seed(&h, "parent-1", Duration::hours(-2), 1, BookingStatus::InProgress);

    let early = h.orchestrator.complete_booking(future, true).await;
    assert!(matches!(early, Err(BookingError::Validation(_))));
    assert_eq!(status_of(&h, &future), BookingStatus::Upcoming);

    let completed = h.orchestrator.complete_booking(past, true).await.unwrap();
    assert_eq!(completed.status(), BookingStatus::Completed);
    assert!(completed.booking.attended);
}
