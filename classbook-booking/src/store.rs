use chrono::{DateTime, Utc};
use classbook_shared::{Booking, BookingStatus, EnhancedBooking};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

/// Sort direction for read projections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Soonest first, for upcoming queries
    Ascending,
    /// Most recent first, for history queries
    Descending,
}

/// In-memory bookings for one session.
///
/// The keyed map is the only storage. The flat list is derived from it on every read,
/// so the list view and the keyed view cannot disagree. All mutations happen under the
/// write lock, which also serializes operations on the same booking id.
pub struct BookingStore {
    bookings: RwLock<HashMap<Uuid, EnhancedBooking>>,
}

impl BookingStore {
    pub fn new() -> Self {
        Self {
            bookings: RwLock::new(HashMap::new()),
        }
    }

    /// Insert or replace. Returns the previous entry, if any.
    /// Replacing an entry may only keep its status or move it along a valid edge.
    pub fn upsert(&self, booking: EnhancedBooking) -> Result<Option<EnhancedBooking>, StoreError> {
        let mut bookings = self.write();
        if let Some(current) = bookings.get(&booking.id()) {
            let (from, to) = (current.status(), booking.status());
            if from != to && !from.can_transition_to(to) {
                return Err(StoreError::InvalidTransition { from, to });
            }
        }
        Ok(bookings.insert(booking.id(), booking))
    }

    pub fn get(&self, booking_id: &Uuid) -> Option<EnhancedBooking> {
        self.read().get(booking_id).cloned()
    }

    pub fn contains(&self, booking_id: &Uuid) -> bool {
        self.read().contains_key(booking_id)
    }

    /// Move a booking along one edge of the state machine
    pub fn transition(
        &self,
        booking_id: &Uuid,
        new_status: BookingStatus,
    ) -> Result<EnhancedBooking, StoreError> {
        let mut bookings = self.write();
        let entry = bookings
            .get_mut(booking_id)
            .ok_or(StoreError::NotFound(*booking_id))?;

        let current = entry.status();
        if !current.can_transition_to(new_status) {
            return Err(StoreError::InvalidTransition {
                from: current,
                to: new_status,
            });
        }

        entry.booking.update_status(new_status);
        Ok(entry.clone())
    }

    /// Finish a class: status to `COMPLETED` and record attendance.
    /// Attendance can only be confirmed once the scheduled time has passed.
    pub fn complete(
        &self,
        booking_id: &Uuid,
        attended: bool,
        now: DateTime<Utc>,
    ) -> Result<EnhancedBooking, StoreError> {
        let mut bookings = self.write();
        let entry = bookings
            .get_mut(booking_id)
            .ok_or(StoreError::NotFound(*booking_id))?;

        let current = entry.status();
        if !current.can_transition_to(BookingStatus::Completed) {
            return Err(StoreError::InvalidTransition {
                from: current,
                to: BookingStatus::Completed,
            });
        }
        if attended && !entry.booking.has_started(now) {
            return Err(StoreError::AttendanceBeforeStart {
                booking_id: *booking_id,
                scheduled_at: entry.booking.scheduled_at,
            });
        }

        entry.booking.attended = attended;
        entry.booking.update_status(BookingStatus::Completed);
        Ok(entry.clone())
    }

    /// Flat list view, soonest first
    pub fn bookings(&self) -> Vec<Booking> {
        self.select(|_| true, SortOrder::Ascending)
            .into_iter()
            .map(|e| e.booking)
            .collect()
    }

    /// A user's booking history, most recent first
    pub fn all_for_user(&self, user_id: &str) -> Vec<EnhancedBooking> {
        self.select(|b| b.booking.user_id == user_id, SortOrder::Descending)
    }

    /// Class roster, soonest first
    pub fn all_for_class(&self, class_id: &Uuid) -> Vec<EnhancedBooking> {
        self.select(|b| b.booking.class_id == *class_id, SortOrder::Ascending)
    }

    /// `UPCOMING` bookings of a class, soonest first
    pub fn upcoming_for_class(&self, class_id: &Uuid) -> Vec<EnhancedBooking> {
        self.select(
            |b| b.booking.class_id == *class_id && b.status() == BookingStatus::Upcoming,
            SortOrder::Ascending,
        )
    }

    /// Bookings in one status. Terminal statuses are history and come back most recent
    /// first; the rest are soonest first. See `order_for`.
    pub fn filtered_by_status(&self, status: BookingStatus) -> Vec<EnhancedBooking> {
        self.select(|b| b.status() == status, Self::order_for(status))
    }

    pub fn order_for(status: BookingStatus) -> SortOrder {
        if status.is_history() {
            SortOrder::Descending
        } else {
            SortOrder::Ascending
        }
    }

    /// Everything, soonest first. Used for the local snapshot.
    pub fn snapshot(&self) -> Vec<EnhancedBooking> {
        self.select(|_| true, SortOrder::Ascending)
    }

    /// Replace the contents with a previously saved snapshot
    pub fn restore(&self, bookings: Vec<EnhancedBooking>) -> usize {
        let mut map = self.write();
        map.clear();
        for booking in bookings {
            map.insert(booking.id(), booking);
        }
        map.len()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn select<F>(&self, predicate: F, order: SortOrder) -> Vec<EnhancedBooking>
    where
        F: Fn(&EnhancedBooking) -> bool,
    {
        let mut selected: Vec<EnhancedBooking> = self
            .read()
            .values()
            .filter(|b| predicate(b))
            .cloned()
            .collect();

        selected.sort_by(|a, b| {
            let ordering = by_schedule(a, b);
            match order {
                SortOrder::Ascending => ordering,
                SortOrder::Descending => ordering.reverse(),
            }
        });
        selected
    }

    // A panic while holding the lock cannot leave a half-applied entry (every mutation
    // is a single assignment), so a poisoned map is still consistent.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<Uuid, EnhancedBooking>> {
        self.bookings.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Uuid, EnhancedBooking>> {
        self.bookings.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for BookingStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Scheduled time, then id so equal times still sort the same way every call
fn by_schedule(a: &EnhancedBooking, b: &EnhancedBooking) -> Ordering {
    a.booking
        .scheduled_at
        .cmp(&b.booking.scheduled_at)
        .then_with(|| a.id().cmp(&b.id()))
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("Booking not found: {0}")]
    NotFound(Uuid),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition {
        from: BookingStatus,
        to: BookingStatus,
    },

    #[error("Booking {booking_id} cannot be marked attended before {scheduled_at}")]
    AttendanceBeforeStart {
        booking_id: Uuid,
        scheduled_at: DateTime<Utc>,
    },
}
