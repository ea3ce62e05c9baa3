use cardline_core::{BillingAddress, NewOrder, Recipient};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::str::FromStr;
use uuid::Uuid;

use crate::outcome::OrderError;

/// Prices are stored as NUMERIC(12, 2)
const MAX_PRICE_SCALE: u32 = 2;
const MAX_PRICE_INTEGER_DIGITS: u32 = 10;

/// Purchase intent as sent by the caller, after upstream payment succeeded.
///
/// Numbers may arrive as JSON strings or numbers; everything is checked in
/// `validate`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderIntent {
    #[serde(default)]
    pub reference_number: Option<String>,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub price: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub quantity: Option<String>,
    #[serde(default)]
    pub payment_order_id: Option<String>,
    #[serde(default)]
    pub payment_id: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub billing_address: Option<BillingAddress>,
    #[serde(default)]
    pub order_index: Option<i32>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!("expected string or number, got {}", other))),
    }
}

/// An intent that passed validation
#[derive(Debug, Clone)]
pub struct ValidatedIntent {
    pub reference_number: Option<String>,
    pub sku: String,
    pub price: Decimal,
    pub quantity: i32,
    pub recipient: Recipient,
    pub billing_address: Option<BillingAddress>,
    pub payment_order_id: String,
    pub payment_id: Option<String>,
    pub order_index: i32,
}

impl ValidatedIntent {
    pub fn into_new_order(self, reference_number: String, default_address: &BillingAddress) -> NewOrder {
        NewOrder {
            reference_number,
            sku: self.sku,
            price: self.price,
            quantity: self.quantity,
            recipient: self.recipient,
            billing_address: self.billing_address.unwrap_or_else(|| default_address.clone()),
            payment_order_id: self.payment_order_id,
            payment_id: self.payment_id,
            order_index: self.order_index,
        }
    }
}

fn required(field: &'static str, value: &Option<String>) -> Result<String, OrderError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(OrderError::InvalidInput {
            field,
            reason: "is required".to_string(),
        }),
    }
}

impl OrderIntent {
    /// Check the intent without touching any store
    pub fn validate(&self) -> Result<ValidatedIntent, OrderError> {
        let recipient = Recipient {
            first_name: required("firstName", &self.first_name)?,
            last_name: required("lastName", &self.last_name)?,
            email: required("email", &self.email)?,
            phone: required("phone", &self.phone)?,
        };
        let sku = required("sku", &self.sku)?;
        let price_raw = required("price", &self.price)?;
        let payment_order_id = required("paymentOrderId", &self.payment_order_id)?;
        let quantity_raw = required("quantity", &self.quantity)?;

        let price = Decimal::from_str(&price_raw).map_err(|_| OrderError::InvalidInput {
            field: "price",
            reason: format!("'{}' is not a number", price_raw),
        })?;
        if price <= Decimal::ZERO {
            return Err(OrderError::InvalidInput {
                field: "price",
                reason: "must be greater than zero".to_string(),
            });
        }
        if price.normalize().scale() > MAX_PRICE_SCALE {
            return Err(OrderError::InvalidInput {
                field: "price",
                reason: format!("must have at most {} decimal places", MAX_PRICE_SCALE),
            });
        }
        if !within_amount_range(price) {
            return Err(OrderError::InvalidInput {
                field: "price",
                reason: format!("must have at most {} integer digits", MAX_PRICE_INTEGER_DIGITS),
            });
        }

        let quantity = quantity_raw
            .parse::<i32>()
            .ok()
            .filter(|q| *q > 0)
            .ok_or_else(|| OrderError::InvalidInput {
                field: "quantity",
                reason: format!("'{}' is not a positive integer", quantity_raw),
            })?;

        // The provider is charged price x quantity in one payment line
        let total = price.checked_mul(Decimal::from(quantity));
        if !total.is_some_and(within_amount_range) {
            return Err(OrderError::InvalidInput {
                field: "price",
                reason: format!("total for quantity {} is out of range", quantity),
            });
        }

        let reference_number = self
            .reference_number
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string);

        Ok(ValidatedIntent {
            reference_number,
            sku,
            price,
            quantity,
            recipient,
            billing_address: self.billing_address.clone(),
            payment_order_id,
            payment_id: self.payment_id.clone().filter(|p| !p.trim().is_empty()),
            order_index: self.order_index.unwrap_or(0),
        })
    }
}

fn within_amount_range(amount: Decimal) -> bool {
    amount.trunc() < Decimal::from(10_i64.pow(MAX_PRICE_INTEGER_DIGITS))
}

/// Format: {PREFIX}-{yyyymmddHHMMSS}-{8 hex}
pub fn generate_reference(prefix: &str) -> String {
    let timestamp = Utc::now().format("%Y%m%d%H%M%S");
    let short_id = Uuid::new_v4().simple().to_string()[..8].to_uppercase();
    format!("{}-{}-{}", prefix, timestamp, short_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn valid() -> OrderIntent {
        OrderIntent {
            sku: Some("GC100".to_string()),
            price: Some("500".to_string()),
            quantity: Some("1".to_string()),
            payment_order_id: Some("pay_ord_1".to_string()),
            first_name: Some("Asha".to_string()),
            last_name: Some("Rao".to_string()),
            email: Some("asha@example.com".to_string()),
            phone: Some("+919800000000".to_string()),
            ..Default::default()
        }
    }

    fn failed_field(intent: OrderIntent) -> &'static str {
        match intent.validate() {
            Err(OrderError::InvalidInput { field, .. }) => field,
            other => panic!("expected InvalidInput, got {:?}", other),
        }
    }

    #[test]
    fn test_valid_intent() {
        let validated = valid().validate().unwrap();
        assert_eq!(validated.price, dec!(500));
        assert_eq!(validated.quantity, 1);
        assert!(validated.reference_number.is_none());
        assert_eq!(validated.order_index, 0);
    }

    #[test]
    fn test_missing_identity_fields() {
        assert_eq!(failed_field(OrderIntent { first_name: None, ..valid() }), "firstName");
        assert_eq!(failed_field(OrderIntent { last_name: Some("  ".to_string()), ..valid() }), "lastName");
        assert_eq!(failed_field(OrderIntent { email: Some(String::new()), ..valid() }), "email");
        assert_eq!(failed_field(OrderIntent { phone: None, ..valid() }), "phone");
    }

    #[test]
    fn test_missing_order_fields() {
        assert_eq!(failed_field(OrderIntent { sku: None, ..valid() }), "sku");
        assert_eq!(failed_field(OrderIntent { price: None, ..valid() }), "price");
        assert_eq!(failed_field(OrderIntent { payment_order_id: None, ..valid() }), "paymentOrderId");
        assert_eq!(failed_field(OrderIntent { quantity: None, ..valid() }), "quantity");
    }

    #[test]
    fn test_price_must_be_positive_number() {
        assert_eq!(failed_field(OrderIntent { price: Some("abc".to_string()), ..valid() }), "price");
        assert_eq!(failed_field(OrderIntent { price: Some("0".to_string()), ..valid() }), "price");
        assert_eq!(failed_field(OrderIntent { price: Some("-5".to_string()), ..valid() }), "price");
    }

    #[test]
    fn test_price_must_fit_storage() {
        assert_eq!(failed_field(OrderIntent { price: Some("0.001".to_string()), ..valid() }), "price");
        assert_eq!(failed_field(OrderIntent { price: Some("12345678901".to_string()), ..valid() }), "price");

        let validated = OrderIntent { price: Some("9999999999.99".to_string()), ..valid() }.validate().unwrap();
        assert_eq!(validated.price, dec!(9999999999.99));
        assert_eq!(OrderIntent { price: Some("500.10".to_string()), ..valid() }.validate().unwrap().price, dec!(500.10));
    }

    #[test]
    fn test_total_amount_must_not_overflow() {
        let huge = OrderIntent {
            price: Some("79228162514264337593543950335".to_string()),
            quantity: Some("2".to_string()),
            ..valid()
        };
        assert_eq!(failed_field(huge), "price");

        let too_many = OrderIntent {
            price: Some("99999999.99".to_string()),
            quantity: Some("200".to_string()),
            ..valid()
        };
        assert_eq!(failed_field(too_many), "price");
    }

    #[test]
    fn test_quantity_must_be_positive_integer() {
        assert_eq!(failed_field(OrderIntent { quantity: Some("0".to_string()), ..valid() }), "quantity");
        assert_eq!(failed_field(OrderIntent { quantity: Some("1.5".to_string()), ..valid() }), "quantity");
        assert_eq!(failed_field(OrderIntent { quantity: Some("two".to_string()), ..valid() }), "quantity");
    }

    #[test]
    fn test_deserialize_numbers_or_strings() {
        let intent: OrderIntent = serde_json::from_value(json!({
            "referenceNumber": " GC-77 ",
            "sku": "GC100",
            "price": 250.5,
            "quantity": 2,
            "paymentOrderId": "pay_ord_1",
            "firstName": "Asha",
            "lastName": "Rao",
            "email": "asha@example.com",
            "phone": "+919800000000"
        }))
        .unwrap();
        let validated = intent.validate().unwrap();
        assert_eq!(validated.price, dec!(250.5));
        assert_eq!(validated.quantity, 2);
        assert_eq!(validated.reference_number.as_deref(), Some("GC-77"));
    }

    #[test]
    fn test_generated_reference_shape() {
        let reference = generate_reference("GC");
        let parts: Vec<&str> = reference.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "GC");
        assert_eq!(parts[1].len(), 14);
        assert_eq!(parts[2].len(), 8);
        assert_ne!(reference, generate_reference("GC"));
    }
}
