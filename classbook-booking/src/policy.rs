use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Platform fee kept on every refund
pub const DEFAULT_SERVICE_FEE: Decimal = dec!(1.99);

/// Minimum notice for a refund, inclusive
pub const DEFAULT_REFUND_WINDOW_HOURS: i64 = 24;

const MILLIS_PER_HOUR: i64 = 3_600_000;

/// What the time-based refund rules say about one cancellation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RefundDecision {
    pub refund_eligible: bool,
    pub refund_amount: Decimal,
    pub service_fee: Decimal,
    /// Notice given, rounded to one decimal place. Negative once the class has started.
    pub hours_until_class: Decimal,
    pub explanation: String,
}

/// How the refund itself went, filled in by the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefundResult {
    /// Not eligible, nothing was sent to the provider
    NotApplicable,
    Processed { reference: String },
    Delayed { reason: String },
}

/// Result of one cancellation request. Not persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CancellationOutcome {
    pub booking_id: Uuid,
    pub refund_eligible: bool,
    pub refund_amount: Decimal,
    pub service_fee: Decimal,
    pub explanation: String,
    pub refund: RefundResult,
}

impl CancellationOutcome {
    pub fn new(booking_id: Uuid, decision: RefundDecision, refund: RefundResult) -> Self {
        Self {
            booking_id,
            refund_eligible: decision.refund_eligible,
            refund_amount: decision.refund_amount,
            service_fee: decision.service_fee,
            explanation: decision.explanation,
            refund,
        }
    }

    /// The one line the parent sees about their money
    pub fn summary(&self, currency: &str) -> String {
        match &self.refund {
            RefundResult::Processed { .. } => {
                format!("A refund of {} {} has been processed.", self.refund_amount, currency)
            }
            RefundResult::Delayed { .. } => format!(
                "Your refund of {} {} is delayed. Please contact support if it has not arrived within 5 working days.",
                self.refund_amount, currency
            ),
            RefundResult::NotApplicable => self.explanation.clone(),
        }
    }
}

/// Refund rules: full price minus the service fee with enough notice, nothing otherwise
#[derive(Debug, Clone, PartialEq)]
pub struct CancellationPolicy {
    pub window_hours: i64,
    pub service_fee: Decimal,
}

impl Default for CancellationPolicy {
    fn default() -> Self {
        Self {
            window_hours: DEFAULT_REFUND_WINDOW_HOURS,
            service_fee: DEFAULT_SERVICE_FEE,
        }
    }
}

impl CancellationPolicy {
    pub fn new(window_hours: i64, service_fee: Decimal) -> Self {
        Self {
            window_hours,
            service_fee,
        }
    }

    /// Pure: same inputs, same decision
    pub fn evaluate(
        &self,
        now: DateTime<Utc>,
        class_start_time: DateTime<Utc>,
        unit_price: Decimal,
        participant_count: u32,
    ) -> RefundDecision {
        // Compare in whole milliseconds so the window boundary is exact
        let notice_millis = (class_start_time - now).num_milliseconds();
        let hours_until_class =
            (Decimal::from(notice_millis) / Decimal::from(MILLIS_PER_HOUR)).round_dp(1);
        let service_fee = self.service_fee;

        if notice_millis < 0 {
            return RefundDecision {
                refund_eligible: false,
                refund_amount: Decimal::ZERO,
                service_fee,
                hours_until_class,
                explanation: "This class has already occurred, so no refund is due.".to_string(),
            };
        }

        if notice_millis < self.window_hours * MILLIS_PER_HOUR {
            return RefundDecision {
                refund_eligible: false,
                refund_amount: Decimal::ZERO,
                service_fee,
                hours_until_class,
                explanation: format!(
                    "Cancelled with less than {} hours notice. No refund is due for late cancellation.",
                    self.window_hours
                ),
            };
        }

        let gross = unit_price * Decimal::from(participant_count);
        let refund_amount = (gross - service_fee).max(Decimal::ZERO).round_dp(2);

        RefundDecision {
            refund_eligible: true,
            refund_amount,
            service_fee,
            hours_until_class,
            explanation: format!(
                "Cancelled with {} hours notice. {} will be refunded; the {} service fee is non-refundable.",
                hours_until_class, refund_amount, service_fee
            ),
        }
    }
}

/// Default 24 hour window with an explicit fee
pub fn evaluate_cancellation(
    now: DateTime<Utc>,
    class_start_time: DateTime<Utc>,
    unit_price: Decimal,
    participant_count: u32,
    service_fee: Decimal,
) -> RefundDecision {
    CancellationPolicy::new(DEFAULT_REFUND_WINDOW_HOURS, service_fee).evaluate(
        now,
        class_start_time,
        unit_price,
        participant_count,
    )
}
