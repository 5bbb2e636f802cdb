pub mod models;
pub mod pii;

pub use models::{
    Booking, BookingStatus, CancellationInitiator, ClassSnapshot, ClassSummary, EnhancedBooking,
    ModelError, Notification, NotificationAction, NotificationCategory,
};
pub use models::events::BookingEvent;
pub use pii::Masked;
