use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefundState {
    InFlight,
    Processed,
    /// Provider call failed; can be retried
    Delayed,
}

/// One booking's refund, at most one per booking id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundEntry {
    pub booking_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub state: RefundState,
    pub reference: Option<String>,
    pub last_error: Option<String>,
    pub attempts: u32,
    pub updated_at: DateTime<Utc>,
}

/// Records every refund the orchestrator starts so money never goes out twice
pub struct RefundLedger {
    entries: Mutex<HashMap<Uuid, RefundEntry>>,
}

impl RefundLedger {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Claim the right to call the refund provider for this booking.
    /// Refused with the blocking state while a call is in flight or once one succeeded.
    pub fn begin(&self, booking_id: Uuid, amount: Decimal, currency: &str) -> Result<(), RefundState> {
        let mut entries = self.lock();
        match entries.get_mut(&booking_id) {
            Some(entry) if entry.state == RefundState::Delayed => {
                entry.state = RefundState::InFlight;
                entry.attempts += 1;
                entry.updated_at = Utc::now();
                Ok(())
            }
            Some(entry) => Err(entry.state),
            None => {
                entries.insert(
                    booking_id,
                    RefundEntry {
                        booking_id,
                        amount,
                        currency: currency.to_string(),
                        state: RefundState::InFlight,
                        reference: None,
                        last_error: None,
                        attempts: 1,
                        updated_at: Utc::now(),
                    },
                );
                Ok(())
            }
        }
    }

    pub fn record_processed(&self, booking_id: Uuid, reference: String) {
        if let Some(entry) = self.lock().get_mut(&booking_id) {
            entry.state = RefundState::Processed;
            entry.reference = Some(reference);
            entry.last_error = None;
            entry.updated_at = Utc::now();
        }
    }

    pub fn record_delayed(&self, booking_id: Uuid, reason: String) {
        if let Some(entry) = self.lock().get_mut(&booking_id) {
            entry.state = RefundState::Delayed;
            entry.last_error = Some(reason);
            entry.updated_at = Utc::now();
        }
    }

    pub fn get(&self, booking_id: &Uuid) -> Option<RefundEntry> {
        self.lock().get(booking_id).cloned()
    }

    /// Refunds waiting for a retry, oldest failure first
    pub fn delayed(&self) -> Vec<RefundEntry> {
        let mut delayed: Vec<RefundEntry> = self
            .lock()
            .values()
            .filter(|e| e.state == RefundState::Delayed)
            .cloned()
            .collect();
        delayed.sort_by_key(|e| e.updated_at);
        delayed
    }

    pub fn total_refunded(&self) -> Decimal {
        self.lock()
            .values()
            .filter(|e| e.state == RefundState::Processed)
            .map(|e| e.amount)
            .sum()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, RefundEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for RefundLedger {
    fn default() -> Self {
        Self::new()
    }
}
