use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::class::ClassSnapshot;
use super::ModelError;
use crate::pii::Masked;

/// Booking status in the lifecycle.
///
/// ```text
/// DRAFT -> PENDING -> UPCOMING -> COMPLETED
///                              -> CANCELLED
///                              -> IN_PROGRESS -> COMPLETED
/// ```
///
/// Only the tag lives here. Display names and badge colours belong to the presentation layer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Draft,
    Pending,
    Upcoming,
    InProgress,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub const ALL: [BookingStatus; 6] = [
        BookingStatus::Draft,
        BookingStatus::Pending,
        BookingStatus::Upcoming,
        BookingStatus::InProgress,
        BookingStatus::Completed,
        BookingStatus::Cancelled,
    ];

    /// Whether `self -> next` is an edge of the state machine
    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Draft, Pending)
                | (Pending, Upcoming)
                | (Upcoming, Completed)
                | (Upcoming, Cancelled)
                | (Upcoming, InProgress)
                | (InProgress, Completed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }

    /// History statuses sort newest first, everything else soonest first
    pub fn is_history(self) -> bool {
        self.is_terminal()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Draft => "DRAFT",
            BookingStatus::Pending => "PENDING",
            BookingStatus::Upcoming => "UPCOMING",
            BookingStatus::InProgress => "IN_PROGRESS",
            BookingStatus::Completed => "COMPLETED",
            BookingStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who asked for the cancellation. The other side gets told about it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CancellationInitiator {
    Parent,
    Provider,
}

impl fmt::Display for CancellationInitiator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancellationInitiator::Parent => f.write_str("parent"),
            CancellationInitiator::Provider => f.write_str("provider"),
        }
    }
}

/// A parent's reservation of places in a class
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub class_id: Uuid,
    pub user_id: String,
    pub status: BookingStatus,
    pub scheduled_at: DateTime<Utc>,
    pub number_of_participants: u32,
    #[serde(default)]
    pub children: Vec<Uuid>,
    pub special_requirements: Option<Masked<String>>,
    /// Only meaningful once the class has taken place
    #[serde(default)]
    pub attended: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// Start a booking in `DRAFT`
    pub fn new(
        class_id: Uuid,
        user_id: impl Into<String>,
        scheduled_at: DateTime<Utc>,
        number_of_participants: u32,
    ) -> Result<Self, ModelError> {
        if number_of_participants == 0 {
            return Err(ModelError::NoParticipants);
        }

        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            class_id,
            user_id: user_id.into(),
            status: BookingStatus::Draft,
            scheduled_at,
            number_of_participants,
            children: Vec::new(),
            special_requirements: None,
            attended: false,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn with_children(mut self, children: Vec<Uuid>) -> Self {
        self.children = children;
        self
    }

    pub fn with_special_requirements(mut self, requirements: impl Into<String>) -> Self {
        self.special_requirements = Some(Masked(requirements.into()));
        self
    }

    /// Set the status without checking the edge. Callers go through the booking store.
    pub fn update_status(&mut self, new_status: BookingStatus) {
        self.status = new_status;
        self.updated_at = Utc::now();
    }

    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_at <= now
    }
}

/// A booking joined with the class it was made for
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnhancedBooking {
    pub booking: Booking,
    pub class: ClassSnapshot,
}

impl EnhancedBooking {
    pub fn new(booking: Booking, class: ClassSnapshot) -> Result<Self, ModelError> {
        if booking.class_id != class.class_id {
            return Err(ModelError::ClassMismatch {
                booking_id: booking.id,
                booking_class: booking.class_id,
                snapshot_class: class.class_id,
            });
        }
        Ok(Self { booking, class })
    }

    pub fn id(&self) -> Uuid {
        self.booking.id
    }

    pub fn status(&self) -> BookingStatus {
        self.booking.status
    }

    pub fn class_name(&self) -> &str {
        &self.class.name
    }

    pub fn provider_name(&self) -> &str {
        &self.class.provider_name
    }

    /// Per-participant price at booking time
    pub fn price(&self) -> Decimal {
        self.class.price
    }

    pub fn total_price(&self) -> Decimal {
        self.class.price * Decimal::from(self.booking.number_of_participants)
    }
}
