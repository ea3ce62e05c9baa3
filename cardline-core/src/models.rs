use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::CoreError;

/// Order status in the fulfillment lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Completed => "completed",
            OrderStatus::Failed => "failed",
        }
    }

    /// A processing or completed order owns its reference number; another
    /// submission for it must not reach the provider.
    pub fn holds_reference(&self) -> bool {
        matches!(self, OrderStatus::Processing | OrderStatus::Completed)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "processing" => Ok(OrderStatus::Processing),
            "completed" => Ok(OrderStatus::Completed),
            "failed" => Ok(OrderStatus::Failed),
            other => Err(CoreError::ValidationError(format!("Unknown order status: {}", other))),
        }
    }
}

/// The person the gift card is issued to
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Recipient {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BillingAddress {
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    pub city: String,
    pub region: String,
    pub country: String,
    pub postcode: String,
}

/// Fields written when an order is first taken in
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub reference_number: String,
    pub sku: String,
    pub price: Decimal,
    pub quantity: i32,
    pub recipient: Recipient,
    pub billing_address: BillingAddress,
    pub payment_order_id: String,
    pub payment_id: Option<String>,
    pub order_index: i32,
}

/// One gift-card purchase, keyed by its reference number.
///
/// `card_number` and `card_pin` hold ciphertext (or an empty string when the
/// provider returned nothing); plaintext never lands here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub reference_number: String,
    pub sku: String,
    pub price: Decimal,
    pub quantity: i32,
    pub recipient: Recipient,
    pub billing_address: BillingAddress,
    pub status: OrderStatus,
    pub retry_count: i32,
    pub last_retry_at: Option<DateTime<Utc>>,
    pub provider_order_id: Option<String>,
    pub card_number: Option<String>,
    pub card_pin: Option<String>,
    pub card_validity: Option<String>,
    pub issuance_date: Option<String>,
    pub balance: Option<Decimal>,
    pub error_message: Option<String>,
    pub provider_response: Option<serde_json::Value>,
    pub payment_order_id: String,
    pub payment_id: Option<String>,
    pub order_index: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn from_new(new: NewOrder) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            reference_number: new.reference_number,
            sku: new.sku,
            price: new.price,
            quantity: new.quantity,
            recipient: new.recipient,
            billing_address: new.billing_address,
            status: OrderStatus::Pending,
            retry_count: 0,
            last_retry_at: None,
            provider_order_id: None,
            card_number: None,
            card_pin: None,
            card_validity: None,
            issuance_date: None,
            balance: None,
            error_message: None,
            provider_response: None,
            payment_order_id: new.payment_order_id,
            payment_id: new.payment_id,
            order_index: new.order_index,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a partial update in place. Mirrors what the SQL repository does.
    pub fn apply(&mut self, update: &OrderUpdate) {
        let now = Utc::now();
        if let Some(status) = update.status {
            self.status = status;
        }
        if update.bump_retry {
            self.retry_count += 1;
            self.last_retry_at = Some(now);
        }
        if let Some(id) = &update.provider_order_id {
            self.provider_order_id = Some(id.clone());
        }
        if let Some(number) = &update.card_number {
            self.card_number = Some(number.clone());
        }
        if let Some(pin) = &update.card_pin {
            self.card_pin = Some(pin.clone());
        }
        if let Some(validity) = &update.card_validity {
            self.card_validity = Some(validity.clone());
        }
        if let Some(date) = &update.issuance_date {
            self.issuance_date = Some(date.clone());
        }
        if let Some(balance) = update.balance {
            self.balance = Some(balance);
        }
        if let Some(message) = &update.error_message {
            self.error_message = message.clone();
        }
        if let Some(raw) = &update.provider_response {
            self.provider_response = Some(raw.clone());
        }
        self.updated_at = now;
    }
}

/// Partial update of an order. `None` leaves a column untouched.
///
/// `error_message` is doubly optional: `Some(None)` clears it.
/// `bump_retry` increments `retry_count` and stamps `last_retry_at`; the
/// count is never written as an absolute value, so it cannot go backwards.
#[derive(Debug, Clone, Default)]
pub struct OrderUpdate {
    pub status: Option<OrderStatus>,
    pub bump_retry: bool,
    pub provider_order_id: Option<String>,
    pub card_number: Option<String>,
    pub card_pin: Option<String>,
    pub card_validity: Option<String>,
    pub issuance_date: Option<String>,
    pub balance: Option<Decimal>,
    pub error_message: Option<Option<String>>,
    pub provider_response: Option<serde_json::Value>,
}

impl OrderUpdate {
    pub fn status(status: OrderStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(Some(message.into()));
        self
    }

    pub fn clear_error(mut self) -> Self {
        self.error_message = Some(None);
        self
    }

    pub fn bump_retry(mut self) -> Self {
        self.bump_retry = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn new_order() -> NewOrder {
        NewOrder {
            reference_number: "GC-1".to_string(),
            sku: "GC100".to_string(),
            price: dec!(500),
            quantity: 1,
            recipient: Recipient {
                first_name: "Asha".to_string(),
                last_name: "Rao".to_string(),
                email: "asha@example.com".to_string(),
                phone: "+919800000000".to_string(),
            },
            billing_address: BillingAddress {
                line1: "12 MG Road".to_string(),
                line2: None,
                city: "Bengaluru".to_string(),
                region: "Karnataka".to_string(),
                country: "IN".to_string(),
                postcode: "560001".to_string(),
            },
            payment_order_id: "pay_ord_1".to_string(),
            payment_id: None,
            order_index: 0,
        }
    }

    #[test]
    fn test_new_order_starts_pending() {
        let order = Order::from_new(new_order());
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.retry_count, 0);
        assert!(order.error_message.is_none());
    }

    #[test]
    fn test_apply_bumps_retry_and_clears_error() {
        let mut order = Order::from_new(new_order());
        order.apply(&OrderUpdate::status(OrderStatus::Pending).with_error("provider down").bump_retry());
        assert_eq!(order.retry_count, 1);
        assert!(order.last_retry_at.is_some());
        assert_eq!(order.error_message.as_deref(), Some("provider down"));

        order.apply(&OrderUpdate::status(OrderStatus::Completed).clear_error());
        assert_eq!(order.retry_count, 1);
        assert!(order.error_message.is_none());
        assert_eq!(order.status, OrderStatus::Completed);
    }

    #[test]
    fn test_status_round_trip_through_str() {
        for status in [OrderStatus::Pending, OrderStatus::Processing, OrderStatus::Completed, OrderStatus::Failed] {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert!("shipped".parse::<OrderStatus>().is_err());
        assert!(OrderStatus::Processing.holds_reference());
        assert!(!OrderStatus::Failed.holds_reference());
    }
}
