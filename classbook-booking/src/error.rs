use classbook_shared::{BookingStatus, ModelError};
use uuid::Uuid;

use crate::store::StoreError;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BookingError {
    #[error("Booking not found: {0}")]
    NotFound(Uuid),

    #[error("Class not found: {0}")]
    ClassNotFound(Uuid),

    #[error("Booking is {status}: {reason}")]
    InvalidState {
        status: BookingStatus,
        reason: String,
    },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition {
        from: BookingStatus,
        to: BookingStatus,
    },

    #[error("Refund failed for booking {booking_id}: {reason}")]
    RefundFailed { booking_id: Uuid, reason: String },

    #[error("Remote sync failed: {0}")]
    RemoteSyncFailed(String),

    #[error("Invalid booking: {0}")]
    Validation(String),

    #[error("Snapshot failed: {0}")]
    Snapshot(String),

    #[error("Background task stopped: {0}")]
    Interrupted(String),
}

impl BookingError {
    /// Why a booking in `status` cannot be cancelled
    pub fn not_cancellable(status: BookingStatus) -> Self {
        let reason = match status {
            BookingStatus::Draft => "the booking was never submitted",
            BookingStatus::Pending => "the provider has not confirmed it yet, withdraw the request instead",
            BookingStatus::InProgress => "the class is already under way",
            BookingStatus::Completed => "the class has already finished",
            BookingStatus::Cancelled => "the booking is already cancelled",
            BookingStatus::Upcoming => "only upcoming bookings can be cancelled",
        };
        BookingError::InvalidState {
            status,
            reason: reason.to_string(),
        }
    }
}

impl From<StoreError> for BookingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => BookingError::NotFound(id),
            StoreError::InvalidTransition { from, to } => BookingError::InvalidTransition { from, to },
            e @ StoreError::AttendanceBeforeStart { .. } => BookingError::Validation(e.to_string()),
        }
    }
}

impl From<ModelError> for BookingError {
    fn from(err: ModelError) -> Self {
        BookingError::Validation(err.to_string())
    }
}
