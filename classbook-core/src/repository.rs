use async_trait::async_trait;
use classbook_shared::EnhancedBooking;

use crate::CoreResult;

/// Optional write-through of the booking list so a session can be restored.
/// Nothing in the state machine depends on it.
#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    async fn save(&self, bookings: &[EnhancedBooking]) -> CoreResult<()>;

    /// Empty when nothing was saved yet
    async fn load(&self) -> CoreResult<Vec<EnhancedBooking>>;
}
