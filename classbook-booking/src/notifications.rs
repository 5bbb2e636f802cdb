use async_trait::async_trait;
use classbook_core::CoreResult;
use classbook_shared::{CancellationInitiator, EnhancedBooking, Notification};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use crate::policy::CancellationOutcome;

/// In-app notifications for every user of the session.
/// Only the read flag ever changes; entries go away on explicit delete.
pub struct NotificationCenter {
    notifications: RwLock<Vec<Notification>>,
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self {
            notifications: RwLock::new(Vec::new()),
        }
    }

    pub fn emit(&self, notification: Notification) -> Uuid {
        let id = notification.id;
        tracing::debug!(
            "Notification for {}: {} ({:?})",
            notification.user_id,
            notification.title,
            notification.category
        );
        self.write().push(notification);
        id
    }

    /// Newest first
    pub fn for_user(&self, user_id: &str) -> Vec<Notification> {
        self.read()
            .iter()
            .rev()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn unread_count(&self, user_id: &str) -> usize {
        self.read()
            .iter()
            .filter(|n| n.user_id == user_id && !n.is_read)
            .count()
    }

    /// `false` when no such notification exists
    pub fn mark_read(&self, notification_id: &Uuid) -> bool {
        match self.write().iter_mut().find(|n| n.id == *notification_id) {
            Some(notification) => {
                notification.mark_read();
                true
            }
            None => false,
        }
    }

    pub fn mark_all_read(&self, user_id: &str) -> usize {
        let mut changed = 0;
        for notification in self.write().iter_mut().filter(|n| n.user_id == user_id && !n.is_read) {
            notification.mark_read();
            changed += 1;
        }
        changed
    }

    pub fn delete(&self, notification_id: &Uuid) -> bool {
        let mut notifications = self.write();
        let before = notifications.len();
        notifications.retain(|n| n.id != *notification_id);
        notifications.len() != before
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Notification>> {
        self.notifications.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Notification>> {
        self.notifications.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Email delivery lives outside this subsystem
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn deliver(&self, message: &EmailMessage) -> CoreResult<()>;
}

/// Writes the message to the log instead of sending it
pub struct LogMailTransport;

#[async_trait]
impl MailTransport for LogMailTransport {
    async fn deliver(&self, message: &EmailMessage) -> CoreResult<()> {
        tracing::info!("Email to {}: {}", message.to, message.subject);
        Ok(())
    }
}

/// Keeps sent messages in memory, for local runs and tests
pub struct OutboxMailTransport {
    sent: Mutex<Vec<EmailMessage>>,
}

impl OutboxMailTransport {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl Default for OutboxMailTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MailTransport for OutboxMailTransport {
    async fn deliver(&self, message: &EmailMessage) -> CoreResult<()> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.clone());
        Ok(())
    }
}

pub fn format_class_date(booking: &EnhancedBooking) -> String {
    booking
        .booking
        .scheduled_at
        .format("%A %-d %B %Y at %H:%M")
        .to_string()
}

pub fn compose_cancellation_email(
    recipient: &str,
    booking: &EnhancedBooking,
    initiated_by: CancellationInitiator,
    outcome: &CancellationOutcome,
) -> EmailMessage {
    let cancelled_by = match initiated_by {
        CancellationInitiator::Provider => format!("{} has cancelled", booking.provider_name()),
        CancellationInitiator::Parent => "The parent has cancelled".to_string(),
    };

    let mut body = String::new();
    body.push_str("Hello,\n\n");
    body.push_str(&format!(
        "{} the booking for {} on {}.\n\n",
        cancelled_by,
        booking.class_name(),
        format_class_date(booking)
    ));
    body.push_str(&format!("Location: {}\n", booking.class.location));
    body.push_str(&format!("Participants: {}\n", booking.booking.number_of_participants));
    body.push_str(&format!("Booking reference: {}\n\n", booking.id()));
    body.push_str(&outcome.summary(&booking.class.currency));
    body.push_str("\n\nThe Classbook team\n");

    EmailMessage {
        to: recipient.to_string(),
        subject: format!("Booking cancelled: {}", booking.class_name()),
        body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{evaluate_cancellation, RefundResult, DEFAULT_SERVICE_FEE};
    use chrono::{Duration, Utc};
    use classbook_shared::{Booking, ClassSnapshot, NotificationCategory};
    use rust_decimal_macros::dec;

    #[test]
    fn test_read_flags_and_delete() {
        let center = NotificationCenter::new();
        let first = center.emit(Notification::new("parent-1", "One", "first", NotificationCategory::Booking));
        center.emit(Notification::new("parent-1", "Two", "second", NotificationCategory::Payment));
        center.emit(Notification::new("parent-2", "Other", "not yours", NotificationCategory::System));

        let mine = center.for_user("parent-1");
        assert_eq!(mine.len(), 2);
        assert_eq!(mine[0].title, "Two");
        assert_eq!(center.unread_count("parent-1"), 2);

        assert!(center.mark_read(&first));
        assert_eq!(center.unread_count("parent-1"), 1);
        assert_eq!(center.mark_all_read("parent-1"), 1);
        assert_eq!(center.unread_count("parent-1"), 0);
        assert_eq!(center.unread_count("parent-2"), 1);

        assert!(center.delete(&first));
        assert!(!center.delete(&first));
        assert!(!center.mark_read(&first));
        assert_eq!(center.len(), 2);
    }

    #[test]
    fn test_cancellation_email() {
        let class_id = Uuid::new_v4();
        let scheduled = Utc::now() + Duration::days(2);
        let booking = Booking::new(class_id, "parent-1", scheduled, 2).unwrap();
        let class = ClassSnapshot {
            class_id,
            name: "Toddler Gym".to_string(),
            provider_id: "provider-9".to_string(),
            provider_name: "Bounce".to_string(),
            location: "Sports Hall".to_string(),
            price: dec!(15.00),
            currency: "GBP".to_string(),
        };
        let enhanced = EnhancedBooking::new(booking, class).unwrap();
        let decision = evaluate_cancellation(Utc::now(), scheduled, dec!(15.00), 2, DEFAULT_SERVICE_FEE);
        let outcome = CancellationOutcome::new(
            enhanced.id(),
            decision,
            RefundResult::Processed { reference: "sim_re_1".to_string() },
        );

        let email = compose_cancellation_email("parent-1", &enhanced, CancellationInitiator::Provider, &outcome);
        assert_eq!(email.to, "parent-1");
        assert_eq!(email.subject, "Booking cancelled: Toddler Gym");
        assert!(email.body.contains("Bounce has cancelled"));
        assert!(email.body.contains("28.01 GBP"));
        assert!(email.body.contains("Sports Hall"));
    }

    #[tokio::test]
    async fn test_outbox_keeps_messages() {
        let outbox = OutboxMailTransport::new();
        let message = EmailMessage {
            to: "provider-1".to_string(),
            subject: "Booking cancelled: Judo".to_string(),
            body: "...".to_string(),
        };
        outbox.deliver(&message).await.unwrap();
        assert_eq!(outbox.sent(), vec![message]);
    }
}
