use rust_decimal::Decimal;
use uuid::Uuid;

use super::booking::CancellationInitiator;

/// Lifecycle events broadcast to in-process subscribers (screens that need to refresh).
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingEvent {
    BookingRequested {
        booking_id: Uuid,
        class_id: Uuid,
        timestamp: i64,
    },
    BookingConfirmed {
        booking_id: Uuid,
        timestamp: i64,
    },
    BookingCancelled {
        booking_id: Uuid,
        class_id: Uuid,
        initiated_by: CancellationInitiator,
        refund_amount: Decimal,
        timestamp: i64,
    },
    RefundProcessed {
        booking_id: Uuid,
        amount: Decimal,
        timestamp: i64,
    },
    RefundDelayed {
        booking_id: Uuid,
        amount: Decimal,
        reason: String,
        timestamp: i64,
    },
}

impl BookingEvent {
    pub fn booking_id(&self) -> Uuid {
        match self {
            BookingEvent::BookingRequested { booking_id, .. }
            | BookingEvent::BookingConfirmed { booking_id, .. }
            | BookingEvent::BookingCancelled { booking_id, .. }
            | BookingEvent::RefundProcessed { booking_id, .. }
            | BookingEvent::RefundDelayed { booking_id, .. } => *booking_id,
        }
    }
}
