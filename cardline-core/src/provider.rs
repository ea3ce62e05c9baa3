use async_trait::async_trait;
use cardline_shared::{mask_card_number, Masked};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::signing::RequestSignature;

// ============================================================================
// Outbound order payload
// ============================================================================

/// Body posted to the provider's order endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderOrderRequest {
    pub address: ProviderAddress,
    pub billing: ProviderAddress,
    pub payments: Vec<PaymentLine>,
    pub ref_no: String,
    pub sync_only: bool,
    pub delivery_mode: String,
    pub products: Vec<ProductLine>,
    /// Marks how the order entered the pipeline (intake vs forced resync)
    pub remarks: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderAddress {
    pub firstname: String,
    pub lastname: String,
    pub email: String,
    pub telephone: String,
    pub line1: String,
    pub line2: String,
    pub city: String,
    pub region: String,
    pub country: String,
    pub postcode: String,
    pub bill_to_this: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentLine {
    pub code: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub po_number: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProductLine {
    pub sku: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub qty: i32,
}

// ============================================================================
// Provider reply
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CardEntry {
    #[serde(default, deserialize_with = "lenient_text")]
    pub card_number: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub card_pin: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub validity: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub issuance_date: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSettlement {
    #[serde(default, deserialize_with = "lenient_amount")]
    pub balance: Option<Decimal>,
}

/// Typed view of a successful (2xx) provider reply.
///
/// Every field is read on its own: a field of an unexpected type is dropped
/// without discarding the cards next to it.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderOrderResponse {
    #[serde(default, deserialize_with = "lenient_text")]
    pub order_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient_entries")]
    pub cards: Vec<CardEntry>,
    #[serde(default, deserialize_with = "lenient_entries")]
    pub payments: Vec<PaymentSettlement>,
}

/// Strings as-is, numbers in their JSON text form, anything else absent
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(scalar_text(&Value::deserialize(deserializer)?))
}

fn lenient_amount<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Decimal>, D::Error> {
    let Some(text) = scalar_text(&Value::deserialize(deserializer)?) else {
        return Ok(None);
    };
    let text = text.trim();
    Ok(Decimal::from_str(text).or_else(|_| Decimal::from_scientific(text)).ok())
}

fn lenient_entries<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let entries = match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match serde_json::from_value(item) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!("Skipping unreadable provider reply entry: {}", e);
                    None
                }
            })
            .collect(),
        Value::Null => Vec::new(),
        other => {
            tracing::warn!("Expected a list in provider reply, got {}", other);
            Vec::new()
        }
    };
    Ok(entries)
}

/// A 2xx reply, kept both raw (for audit) and parsed
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub raw: Value,
    pub order: ProviderOrderResponse,
}

impl ProviderResponse {
    /// Parse leniently: a body we cannot read yields no cards rather than an error,
    /// since the provider has already accepted the order.
    pub fn from_raw(raw: Value) -> Self {
        let order = match serde_json::from_value::<ProviderOrderResponse>(raw.clone()) {
            Ok(order) => order,
            Err(e) => {
                tracing::warn!("Unreadable provider order response: {}", e);
                ProviderOrderResponse::default()
            }
        };
        Self { raw, order }
    }

    pub fn first_card(&self) -> Option<&CardEntry> {
        self.order.cards.first()
    }

    pub fn settled_balance(&self) -> Option<Decimal> {
        self.order.payments.iter().find_map(|p| p.balance)
    }

    /// Raw reply with card numbers reduced to their last four digits and
    /// PINs blanked, suitable for the audit column.
    pub fn redacted_raw(&self) -> Value {
        let mut raw = self.raw.clone();
        if let Some(cards) = raw.get_mut("cards").and_then(Value::as_array_mut) {
            for card in cards.iter_mut() {
                if let Some(number) = card.get_mut("cardNumber") {
                    let masked = scalar_text(number).map(|n| mask_card_number(&n));
                    if let Some(masked) = masked {
                        *number = Value::String(masked);
                    }
                }
                if let Some(pin) = card.get_mut("cardPin") {
                    if !pin.is_null() {
                        *pin = Value::String("****".to_string());
                    }
                }
            }
        }
        raw
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Timeout,
    /// DNS failure, connection refused, TLS handshake
    Connect,
    Other,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Timeout => f.write_str("timeout"),
            TransportKind::Connect => f.write_str("connect"),
            TransportKind::Other => f.write_str("transport"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// No structured reply: the request never produced an HTTP response
    #[error("Provider unreachable ({kind}): {message}")]
    Unavailable { kind: TransportKind, message: String },

    /// The provider answered with a non-success status
    #[error("Provider returned status {status}: {body}")]
    Rejected { status: u16, body: Value },
}

// ============================================================================
// Contract
// ============================================================================

/// Everything a single provider call needs. Built fresh for every attempt.
#[derive(Debug, Clone)]
pub struct SignedSubmission {
    pub bearer: Masked<String>,
    pub signature: RequestSignature,
    pub payload: Value,
}

#[async_trait]
pub trait GiftCardProvider: Send + Sync {
    /// Absolute URL orders are posted to; it is part of the signed material
    fn order_url(&self) -> String;

    async fn submit_order(&self, submission: &SignedSubmission) -> Result<ProviderResponse, ProviderError>;
}
