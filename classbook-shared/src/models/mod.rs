pub mod booking;
pub mod class;
pub mod events;
pub mod notification;

pub use booking::{Booking, BookingStatus, CancellationInitiator, EnhancedBooking};
pub use class::{ClassSnapshot, ClassSummary};
pub use notification::{Notification, NotificationAction, NotificationCategory};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    #[error("A booking needs at least one participant")]
    NoParticipants,

    #[error("Booking {booking_id} references class {booking_class}, snapshot is for {snapshot_class}")]
    ClassMismatch {
        booking_id: uuid::Uuid,
        booking_class: uuid::Uuid,
        snapshot_class: uuid::Uuid,
    },
}
