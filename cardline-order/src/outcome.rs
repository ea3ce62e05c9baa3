use cardline_core::provider::CardEntry;
use cardline_core::{CoreError, OrderStatus};
use cardline_shared::Masked;
use serde::Serialize;

/// A card handed back to the caller on completion. Secrets stay masked in logs.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IssuedCard {
    pub card_number: Masked<String>,
    pub card_pin: Masked<String>,
    pub validity: Option<String>,
    pub issuance_date: Option<String>,
}

impl From<&CardEntry> for IssuedCard {
    fn from(entry: &CardEntry) -> Self {
        Self {
            card_number: Masked::new(entry.card_number.clone().unwrap_or_default()),
            card_pin: Masked::new(entry.card_pin.clone().unwrap_or_default()),
            validity: entry.validity.clone(),
            issuance_date: entry.issuance_date.clone(),
        }
    }
}

/// Result of a successful or deferred fulfillment call
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderOutcome {
    pub reference_number: String,
    pub status: OrderStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cards: Option<Vec<IssuedCard>>,
}

impl OrderOutcome {
    pub fn new(reference_number: impl Into<String>, status: OrderStatus, message: impl Into<String>) -> Self {
        Self {
            reference_number: reference_number.into(),
            status,
            message: message.into(),
            cards: None,
        }
    }

    pub fn with_cards(mut self, cards: Vec<IssuedCard>) -> Self {
        self.cards = Some(cards);
        self
    }

    /// True when the order is queued for a later attempt
    pub fn is_deferred(&self) -> bool {
        self.status == OrderStatus::Pending
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Invalid {field}: {reason}")]
    InvalidInput { field: &'static str, reason: String },

    #[error("No active provider credential")]
    Unauthenticated,

    #[error(
        "Order {reference_number} was rejected by the provider: {message}. \
         If your payment was deducted, contact support with this reference number for a refund."
    )]
    ProviderRejected { reference_number: String, message: String },

    #[error("Order not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Internal(#[from] CoreError),
}

pub type OrderResult = Result<OrderOutcome, OrderError>;
