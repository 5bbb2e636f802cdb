use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A class as listed by the remote API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassSummary {
    pub id: Uuid,
    pub name: String,
    pub provider_id: String,
    pub provider_name: String,
    pub location: String,
    /// Price per participant
    pub price: Decimal,
    pub currency: String,
    /// Providers that skip manual confirmation get bookings straight into `UPCOMING`
    #[serde(default)]
    pub auto_confirm: bool,
}

impl ClassSummary {
    /// Freeze the descriptive fields at booking time
    pub fn snapshot(&self) -> ClassSnapshot {
        ClassSnapshot {
            class_id: self.id,
            name: self.name.clone(),
            provider_id: self.provider_id.clone(),
            provider_name: self.provider_name.clone(),
            location: self.location.clone(),
            price: self.price,
            currency: self.currency.clone(),
        }
    }
}

/// Denormalized class details carried by an `EnhancedBooking`.
/// Never updated after the booking is made, even if the class listing changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassSnapshot {
    pub class_id: Uuid,
    pub name: String,
    pub provider_id: String,
    pub provider_name: String,
    pub location: String,
    pub price: Decimal,
    pub currency: String,
}
