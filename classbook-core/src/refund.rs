use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

use crate::{CoreError, CoreResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundReceipt {
    pub id: String, // Provider's reference (e.g., re_123)
    pub booking_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

/// Capability to send money back to the parent.
/// A real payment gateway sits behind this in production.
#[async_trait]
pub trait RefundProvider: Send + Sync {
    /// Refund `amount` for a cancelled booking. An `Err` means the money did not move.
    async fn attempt_refund(
        &self,
        booking_id: Uuid,
        amount: Decimal,
        currency: &str,
    ) -> CoreResult<RefundReceipt>;
}

/// Fakes gateway latency with a sleep. Bookings registered through `fail_for`
/// get declined, which is how the delayed-refund path is exercised.
pub struct SimulatedRefundProvider {
    delay: Duration,
    failing: Mutex<HashSet<Uuid>>,
    attempts: AtomicUsize,
}

impl SimulatedRefundProvider {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            failing: Mutex::new(HashSet::new()),
            attempts: AtomicUsize::new(0),
        }
    }

    /// No latency, every refund succeeds
    pub fn instant() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn fail_for(&self, booking_id: Uuid) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(booking_id);
        }
    }

    /// Let a previously declined booking through (gateway recovered)
    pub fn recover(&self, booking_id: Uuid) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.remove(&booking_id);
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RefundProvider for SimulatedRefundProvider {
    async fn attempt_refund(
        &self,
        booking_id: Uuid,
        amount: Decimal,
        currency: &str,
    ) -> CoreResult<RefundReceipt> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let declined = self
            .failing
            .lock()
            .map(|failing| failing.contains(&booking_id))
            .unwrap_or(false);
        if declined {
            tracing::warn!("Simulated refund declined for booking {}", booking_id);
            return Err(CoreError::RefundDeclined(format!(
                "Gateway declined refund for booking {}",
                booking_id
            )));
        }

        tracing::info!("Simulated refund of {} {} for booking {}", amount, currency, booking_id);
        Ok(RefundReceipt {
            id: format!("sim_re_{}", booking_id.simple()),
            booking_id,
            amount,
            currency: currency.to_string(),
            created_at: Utc::now(),
        })
    }
}
