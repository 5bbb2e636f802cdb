use chrono::{DateTime, Utc};
use classbook_core::refund::RefundProvider;
use classbook_core::remote::ClassApiClient;
use classbook_core::repository::SnapshotRepository;
use classbook_shared::{
    Booking, BookingEvent, BookingStatus, CancellationInitiator, ClassSummary, EnhancedBooking,
    Notification, NotificationAction, NotificationCategory,
};
use futures_util::future::join_all;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::BookingError;
use crate::ledger::{RefundEntry, RefundLedger, RefundState};
use crate::notifications::{
    compose_cancellation_email, format_class_date, LogMailTransport, MailTransport,
    NotificationCenter,
};
use crate::policy::{CancellationOutcome, CancellationPolicy, RefundDecision, RefundResult};
use crate::store::BookingStore;

/// A parent asking for places in a class
#[derive(Debug, Clone, Deserialize)]
pub struct BookingRequest {
    pub class_id: Uuid,
    pub user_id: String,
    pub scheduled_at: DateTime<Utc>,
    pub number_of_participants: u32,
    #[serde(default)]
    pub children: Vec<Uuid>,
    pub special_requirements: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemoteSync {
    Synced,
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkCancellationItem {
    pub booking_id: Uuid,
    pub outcome: Option<CancellationOutcome>,
    pub error: Option<String>,
}

/// Everything that happened while cancelling a whole class
#[derive(Debug, Clone, Serialize)]
pub struct BulkCancellationReport {
    pub class_id: Uuid,
    pub remote_sync: RemoteSync,
    pub results: Vec<BulkCancellationItem>,
    pub cancelled: usize,
    pub refunds_processed: usize,
    pub refunds_delayed: usize,
    pub no_refund: usize,
    pub failed: usize,
}

impl BulkCancellationReport {
    fn collect(
        class_id: Uuid,
        remote_sync: RemoteSync,
        results: Vec<(Uuid, Result<CancellationOutcome, BookingError>)>,
    ) -> Self {
        let mut report = Self {
            class_id,
            remote_sync,
            results: Vec::with_capacity(results.len()),
            cancelled: 0,
            refunds_processed: 0,
            refunds_delayed: 0,
            no_refund: 0,
            failed: 0,
        };

        for (booking_id, result) in results {
            match result {
                Ok(outcome) => {
                    report.cancelled += 1;
                    match outcome.refund {
                        RefundResult::Processed { .. } => report.refunds_processed += 1,
                        RefundResult::Delayed { .. } => report.refunds_delayed += 1,
                        RefundResult::NotApplicable => report.no_refund += 1,
                    }
                    report.results.push(BulkCancellationItem {
                        booking_id,
                        outcome: Some(outcome),
                        error: None,
                    });
                }
                Err(e) => {
                    report.failed += 1;
                    report.results.push(BulkCancellationItem {
                        booking_id,
                        outcome: None,
                        error: Some(e.to_string()),
                    });
                }
            }
        }
        report
    }

    /// Something needs a human: a delayed refund, a booking that could not be cancelled,
    /// or a backend that never heard about it
    pub fn is_partial_failure(&self) -> bool {
        self.refunds_delayed > 0 || self.failed > 0 || self.remote_sync != RemoteSync::Synced
    }

    pub fn summary(&self) -> String {
        format!(
            "{} cancelled ({} refunded, {} refund delayed, {} without refund), {} failed",
            self.cancelled, self.refunds_processed, self.refunds_delayed, self.no_refund, self.failed
        )
    }
}

/// Marks a booking id busy until dropped
struct InFlight<'a> {
    ids: &'a Mutex<HashSet<Uuid>>,
    booking_id: Uuid,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.booking_id);
    }
}

/// Drives booking requests, confirmations and cancellations end to end.
///
/// Store reads and writes are synchronous; the refund provider is the only call that
/// waits. Work on one booking id is serialized through the in-flight set, work on
/// different ids runs independently.
pub struct CancellationOrchestrator {
    store: Arc<BookingStore>,
    refunds: Arc<dyn RefundProvider>,
    class_api: Arc<dyn ClassApiClient>,
    notifications: Arc<NotificationCenter>,
    mailer: Arc<dyn MailTransport>,
    snapshot: Option<Arc<dyn SnapshotRepository>>,
    policy: CancellationPolicy,
    ledger: RefundLedger,
    in_flight: Mutex<HashSet<Uuid>>,
    catalog: RwLock<HashMap<Uuid, ClassSummary>>,
    events: broadcast::Sender<BookingEvent>,
}

impl CancellationOrchestrator {
    pub fn new(
        store: Arc<BookingStore>,
        refunds: Arc<dyn RefundProvider>,
        class_api: Arc<dyn ClassApiClient>,
        notifications: Arc<NotificationCenter>,
    ) -> Self {
        let (events, _) = broadcast::channel(100);
        Self {
            store,
            refunds,
            class_api,
            notifications,
            mailer: Arc::new(LogMailTransport),
            snapshot: None,
            policy: CancellationPolicy::default(),
            ledger: RefundLedger::new(),
            in_flight: Mutex::new(HashSet::new()),
            catalog: RwLock::new(HashMap::new()),
            events,
        }
    }

    pub fn with_policy(mut self, policy: CancellationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_mailer(mut self, mailer: Arc<dyn MailTransport>) -> Self {
        self.mailer = mailer;
        self
    }

    pub fn with_snapshot(mut self, snapshot: Arc<dyn SnapshotRepository>) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    pub fn store(&self) -> &Arc<BookingStore> {
        &self.store
    }

    pub fn notifications(&self) -> &Arc<NotificationCenter> {
        &self.notifications
    }

    pub fn policy(&self) -> &CancellationPolicy {
        &self.policy
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BookingEvent> {
        self.events.subscribe()
    }

    pub fn refund_entry(&self, booking_id: &Uuid) -> Option<RefundEntry> {
        self.ledger.get(booking_id)
    }

    pub fn pending_refunds(&self) -> Vec<RefundEntry> {
        self.ledger.delayed()
    }

    /// Money that actually went back to parents this session
    pub fn total_refunded(&self) -> Decimal {
        self.ledger.total_refunded()
    }

    // ------------------------------------------------------------------
    // Catalog and booking creation
    // ------------------------------------------------------------------

    /// Pull class listings from the backend into the local cache
    pub async fn refresh_catalog(&self) -> Result<usize, BookingError> {
        let classes = self.class_api.fetch_classes().await.map_err(|e| {
            let err = BookingError::RemoteSyncFailed(e.to_string());
            warn!("{}", err);
            err
        })?;

        let mut catalog = self.catalog.write().unwrap_or_else(PoisonError::into_inner);
        catalog.clear();
        for class in classes {
            catalog.insert(class.id, class);
        }
        info!("Class catalog refreshed: {} classes", catalog.len());
        Ok(catalog.len())
    }

    fn cached_class(&self, class_id: &Uuid) -> Option<ClassSummary> {
        self.catalog
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(class_id)
            .cloned()
    }

    /// Book places in a class. The booking lands in `PENDING`, or straight in
    /// `UPCOMING` when the provider auto-confirms.
    pub async fn book_class(&self, request: BookingRequest) -> Result<EnhancedBooking, BookingError> {
        let class = match self.cached_class(&request.class_id) {
            Some(class) => class,
            None => {
                self.refresh_catalog().await?;
                self.cached_class(&request.class_id)
                    .ok_or(BookingError::ClassNotFound(request.class_id))?
            }
        };

        if request.scheduled_at <= Utc::now() {
            return Err(BookingError::Validation(
                "Cannot book a class that has already started".to_string(),
            ));
        }

        let mut booking = Booking::new(
            class.id,
            request.user_id,
            request.scheduled_at,
            request.number_of_participants,
        )?
        .with_children(request.children);
        if let Some(requirements) = request.special_requirements {
            booking = booking.with_special_requirements(requirements);
        }

        // Draft → Pending, then Pending → Upcoming for auto-confirming providers
        booking.update_status(BookingStatus::Pending);
        if class.auto_confirm {
            booking.update_status(BookingStatus::Upcoming);
        }

        let enhanced = EnhancedBooking::new(booking, class.snapshot())?;
        self.store.upsert(enhanced.clone())?;
        info!(
            "Booking {} created for class {} ({})",
            enhanced.id(),
            class.id,
            enhanced.status()
        );

        let date = format_class_date(&enhanced);
        if class.auto_confirm {
            self.notifications.emit(
                Notification::new(
                    enhanced.booking.user_id.clone(),
                    "Booking confirmed",
                    format!("You're booked into {} on {}.", class.name, date),
                    NotificationCategory::Booking,
                )
                .with_action(NotificationAction::open_booking(enhanced.id())),
            );
        } else {
            self.notifications.emit(
                Notification::new(
                    class.provider_id.clone(),
                    "New booking request",
                    format!(
                        "{} place(s) requested for {} on {}.",
                        enhanced.booking.number_of_participants, class.name, date
                    ),
                    NotificationCategory::Booking,
                )
                .with_action(NotificationAction::open_booking(enhanced.id())),
            );
        }

        self.publish(BookingEvent::BookingRequested {
            booking_id: enhanced.id(),
            class_id: class.id,
            timestamp: Utc::now().timestamp(),
        });
        self.persist().await;
        Ok(enhanced)
    }

    /// Provider accepts a pending booking
    pub async fn confirm_booking(&self, booking_id: Uuid) -> Result<EnhancedBooking, BookingError> {
        let confirmed = self.store.transition(&booking_id, BookingStatus::Upcoming)?;
        info!("Booking {} confirmed", booking_id);

        self.notifications.emit(
            Notification::new(
                confirmed.booking.user_id.clone(),
                "Booking confirmed",
                format!(
                    "{} confirmed your booking for {} on {}.",
                    confirmed.provider_name(),
                    confirmed.class_name(),
                    format_class_date(&confirmed)
                ),
                NotificationCategory::Booking,
            )
            .with_action(NotificationAction::open_booking(booking_id)),
        );

        self.publish(BookingEvent::BookingConfirmed {
            booking_id,
            timestamp: Utc::now().timestamp(),
        });
        self.persist().await;
        Ok(confirmed)
    }

    /// Provider closes out a class for one booking and records whether the children came
    pub async fn complete_booking(
        &self,
        booking_id: Uuid,
        attended: bool,
    ) -> Result<EnhancedBooking, BookingError> {
        let completed = self.store.complete(&booking_id, attended, Utc::now())?;
        info!("Booking {} completed (attended: {})", booking_id, attended);
        self.persist().await;
        Ok(completed)
    }

    // ------------------------------------------------------------------
    // Cancellation
    // ------------------------------------------------------------------

    /// What cancelling now would refund, without touching anything
    pub fn preview_cancellation(&self, booking_id: Uuid) -> Result<RefundDecision, BookingError> {
        let booking = self
            .store
            .get(&booking_id)
            .ok_or(BookingError::NotFound(booking_id))?;
        if booking.status() != BookingStatus::Upcoming {
            return Err(BookingError::not_cancellable(booking.status()));
        }
        Ok(self.policy.evaluate(
            Utc::now(),
            booking.booking.scheduled_at,
            booking.price(),
            booking.booking.number_of_participants,
        ))
    }

    /// Cancel one upcoming booking, refund it when the policy allows, and tell both sides
    pub async fn cancel_booking(
        &self,
        booking_id: Uuid,
        initiated_by: CancellationInitiator,
    ) -> Result<CancellationOutcome, BookingError> {
        let outcome = self.cancel_single(booking_id, initiated_by).await?;
        self.persist().await;
        Ok(outcome)
    }

    /// Same as `cancel_booking` on a background task. Dropping the handle (the screen went
    /// away) does not stop the refund or its notification.
    pub fn cancel_booking_detached(
        self: &Arc<Self>,
        booking_id: Uuid,
        initiated_by: CancellationInitiator,
    ) -> JoinHandle<Result<CancellationOutcome, BookingError>> {
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move { orchestrator.cancel_booking(booking_id, initiated_by).await })
    }

    /// Provider cancels a whole class. Each upcoming booking is handled on its own;
    /// one failure never stops the rest.
    ///
    /// Runs on its own task: dropping the returned future does not stop refunds that
    /// have started.
    pub async fn cancel_class(
        self: &Arc<Self>,
        class_id: Uuid,
    ) -> Result<BulkCancellationReport, BookingError> {
        let orchestrator = Arc::clone(self);
        let task = tokio::spawn(async move {
            let remote_sync = match orchestrator.class_api.cancel_class_remote(class_id).await {
                Ok(()) => RemoteSync::Synced,
                Err(e) => orchestrator.remote_failure(e.to_string()),
            };

            let report = orchestrator.cancel_bookings_for_class(class_id, remote_sync).await;
            orchestrator.persist().await;
            report
        });
        task.await.map_err(|e| BookingError::Interrupted(e.to_string()))
    }

    /// Provider removes a class listing; its upcoming bookings are cancelled as in `cancel_class`
    pub async fn delete_class(
        self: &Arc<Self>,
        class_id: Uuid,
    ) -> Result<BulkCancellationReport, BookingError> {
        let orchestrator = Arc::clone(self);
        let task = tokio::spawn(async move {
            let remote_sync = match orchestrator.class_api.delete_class_remote(class_id).await {
                Ok(()) => RemoteSync::Synced,
                Err(e) => orchestrator.remote_failure(e.to_string()),
            };
            orchestrator
                .catalog
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&class_id);

            let report = orchestrator.cancel_bookings_for_class(class_id, remote_sync).await;
            orchestrator.persist().await;
            report
        });
        task.await.map_err(|e| BookingError::Interrupted(e.to_string()))
    }

    /// Try a delayed refund again. Money still goes out at most once per booking.
    /// Like `cancel_class`, the retry keeps going if the caller goes away.
    pub async fn retry_refund(
        self: &Arc<Self>,
        booking_id: Uuid,
    ) -> Result<CancellationOutcome, BookingError> {
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move { orchestrator.retry_delayed_refund(booking_id).await })
            .await
            .map_err(|e| BookingError::Interrupted(e.to_string()))?
    }

    async fn retry_delayed_refund(&self, booking_id: Uuid) -> Result<CancellationOutcome, BookingError> {
        let in_flight = |status| BookingError::InvalidState {
            status,
            reason: "the refund is still being sent to the payment provider".to_string(),
        };
        let _claim = self
            .claim(booking_id)
            .map_err(|_| in_flight(BookingStatus::Cancelled))?;
        let booking = self
            .store
            .get(&booking_id)
            .ok_or(BookingError::NotFound(booking_id))?;

        let entry = match self.ledger.get(&booking_id) {
            Some(entry) if entry.state == RefundState::Delayed => entry,
            Some(entry) if entry.state == RefundState::InFlight => {
                return Err(in_flight(booking.status()))
            }
            Some(_) => {
                return Err(BookingError::InvalidState {
                    status: booking.status(),
                    reason: "the refund has already been processed".to_string(),
                })
            }
            None => {
                return Err(BookingError::InvalidState {
                    status: booking.status(),
                    reason: "no refund is waiting to be retried".to_string(),
                })
            }
        };

        let refund = self.refund(&booking, entry.amount).await;
        let outcome = CancellationOutcome {
            booking_id,
            refund_eligible: true,
            refund_amount: entry.amount,
            service_fee: self.policy.service_fee,
            explanation: "Retry of a delayed refund.".to_string(),
            refund,
        };
        self.notify_outcome(&booking, &outcome);
        Ok(outcome)
    }

    async fn cancel_bookings_for_class(
        &self,
        class_id: Uuid,
        remote_sync: RemoteSync,
    ) -> BulkCancellationReport {
        let targets = self.store.upcoming_for_class(&class_id);
        info!("Cancelling {} upcoming bookings for class {}", targets.len(), class_id);

        let results = join_all(targets.iter().map(|booking| {
            let booking_id = booking.id();
            async move {
                let result = self
                    .cancel_single(booking_id, CancellationInitiator::Provider)
                    .await;
                (booking_id, result)
            }
        }))
        .await;

        let report = BulkCancellationReport::collect(class_id, remote_sync, results);
        if report.is_partial_failure() {
            warn!("Class {} cancellation finished with problems: {}", class_id, report.summary());
        } else {
            info!("Class {} cancelled: {}", class_id, report.summary());
        }
        report
    }

    async fn cancel_single(
        &self,
        booking_id: Uuid,
        initiated_by: CancellationInitiator,
    ) -> Result<CancellationOutcome, BookingError> {
        let _claim = self.claim(booking_id)?;

        let booking = self
            .store
            .get(&booking_id)
            .ok_or(BookingError::NotFound(booking_id))?;
        if booking.status() != BookingStatus::Upcoming {
            return Err(BookingError::not_cancellable(booking.status()));
        }

        let decision = self.policy.evaluate(
            Utc::now(),
            booking.booking.scheduled_at,
            booking.price(),
            booking.booking.number_of_participants,
        );

        // Nothing below runs unless the booking really moved to CANCELLED
        let cancelled = self.store.transition(&booking_id, BookingStatus::Cancelled)?;
        info!(
            "Booking {} cancelled by {} (refund eligible: {}, amount: {})",
            booking_id, initiated_by, decision.refund_eligible, decision.refund_amount
        );

        let refund = if decision.refund_eligible {
            self.refund(&cancelled, decision.refund_amount).await
        } else {
            RefundResult::NotApplicable
        };
        let outcome = CancellationOutcome::new(booking_id, decision, refund);

        self.notify_outcome(&cancelled, &outcome);
        self.notify_cancelled(&cancelled, initiated_by, &outcome).await;
        self.publish(BookingEvent::BookingCancelled {
            booking_id,
            class_id: cancelled.booking.class_id,
            initiated_by,
            refund_amount: outcome.refund_amount,
            timestamp: Utc::now().timestamp(),
        });

        Ok(outcome)
    }

    /// The only step that waits. Failures become `Delayed`, never an error.
    async fn refund(&self, booking: &EnhancedBooking, amount: Decimal) -> RefundResult {
        let booking_id = booking.id();
        let currency = booking.class.currency.as_str();

        if let Err(state) = self.ledger.begin(booking_id, amount, currency) {
            warn!("Refund for booking {} is already {:?}, not sending again", booking_id, state);
            return match self.ledger.get(&booking_id).and_then(|e| e.reference) {
                Some(reference) => RefundResult::Processed { reference },
                None => RefundResult::Delayed {
                    reason: "A refund for this booking is already in progress".to_string(),
                },
            };
        }

        match self.refunds.attempt_refund(booking_id, amount, currency).await {
            Ok(receipt) => {
                info!("Refund {} of {} {} processed", receipt.id, amount, currency);
                self.ledger.record_processed(booking_id, receipt.id.clone());
                self.publish(BookingEvent::RefundProcessed {
                    booking_id,
                    amount,
                    timestamp: Utc::now().timestamp(),
                });
                RefundResult::Processed {
                    reference: receipt.id,
                }
            }
            Err(e) => {
                let failure = BookingError::RefundFailed {
                    booking_id,
                    reason: e.to_string(),
                };
                warn!("{}", failure);
                self.ledger.record_delayed(booking_id, e.to_string());
                self.publish(BookingEvent::RefundDelayed {
                    booking_id,
                    amount,
                    reason: e.to_string(),
                    timestamp: Utc::now().timestamp(),
                });
                RefundResult::Delayed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Exactly one message to the parent about their money
    fn notify_outcome(&self, booking: &EnhancedBooking, outcome: &CancellationOutcome) {
        let title = match outcome.refund {
            RefundResult::Processed { .. } => "Refund processed",
            RefundResult::Delayed { .. } => "Refund delayed: contact support",
            RefundResult::NotApplicable => "No refund due",
        };
        let message = format!(
            "{} ({}): {}",
            booking.class_name(),
            format_class_date(booking),
            outcome.summary(&booking.class.currency)
        );

        self.notifications.emit(
            Notification::new(
                booking.booking.user_id.clone(),
                title,
                message,
                NotificationCategory::Payment,
            )
            .with_action(NotificationAction::open_booking(booking.id())),
        );
    }

    /// Tell the other side: provider cancels → parent, parent cancels → provider
    async fn notify_cancelled(
        &self,
        booking: &EnhancedBooking,
        initiated_by: CancellationInitiator,
        outcome: &CancellationOutcome,
    ) {
        let recipient = match initiated_by {
            CancellationInitiator::Provider => booking.booking.user_id.clone(),
            CancellationInitiator::Parent => booking.class.provider_id.clone(),
        };

        self.notifications.emit(
            Notification::new(
                recipient.clone(),
                "Booking cancelled",
                format!(
                    "{} on {} was cancelled by the {}. {}",
                    booking.class_name(),
                    format_class_date(booking),
                    initiated_by,
                    outcome.summary(&booking.class.currency)
                ),
                NotificationCategory::Booking,
            )
            .with_action(NotificationAction::open_booking(booking.id())),
        );

        let email = compose_cancellation_email(&recipient, booking, initiated_by, outcome);
        if let Err(e) = self.mailer.deliver(&email).await {
            warn!("Cancellation email for booking {} not delivered: {}", booking.id(), e);
        }
    }

    fn claim(&self, booking_id: Uuid) -> Result<InFlight<'_>, BookingError> {
        let mut ids = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if !ids.insert(booking_id) {
            debug!("Booking {} is already being cancelled", booking_id);
            return Err(BookingError::InvalidState {
                status: BookingStatus::Cancelled,
                reason: "a cancellation for this booking is already in progress".to_string(),
            });
        }
        Ok(InFlight {
            ids: &self.in_flight,
            booking_id,
        })
    }

    fn remote_failure(&self, reason: String) -> RemoteSync {
        let err = BookingError::RemoteSyncFailed(reason.clone());
        warn!("{}; continuing with local state", err);
        RemoteSync::Failed { reason }
    }

    fn publish(&self, event: BookingEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    // ------------------------------------------------------------------
    // Local snapshot
    // ------------------------------------------------------------------

    async fn persist(&self) {
        if let Some(snapshot) = &self.snapshot {
            if let Err(e) = snapshot.save(&self.store.snapshot()).await {
                warn!("Booking snapshot not written: {}", e);
            }
        }
    }

    /// Load the saved booking list into the store. Returns how many bookings came back.
    pub async fn restore_snapshot(&self) -> Result<usize, BookingError> {
        let Some(snapshot) = &self.snapshot else {
            return Ok(0);
        };
        let bookings = snapshot
            .load()
            .await
            .map_err(|e| BookingError::Snapshot(e.to_string()))?;
        Ok(self.store.restore(bookings))
    }
}
