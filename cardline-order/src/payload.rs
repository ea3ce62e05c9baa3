use cardline_core::provider::{PaymentLine, ProductLine, ProviderAddress, ProviderOrderRequest};
use cardline_core::{CoreError, CoreResult, Order};
use rust_decimal::Decimal;

/// Payment method code for stored-value (prepaid) settlement
const PAYMENT_CODE: &str = "svc";
const DELIVERY_MODE: &str = "API";

/// How an order reached the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionMode {
    /// Synchronous order placed at intake
    Intake,
    /// Operator-triggered resubmission of a stuck order
    ForcedResync,
}

impl SubmissionMode {
    pub fn remarks(&self) -> &'static str {
        match self {
            SubmissionMode::Intake => "sync-order",
            SubmissionMode::ForcedResync => "force-resync",
        }
    }
}

/// Build the provider order body from a stored order
pub fn build_order_request(order: &Order, mode: SubmissionMode) -> CoreResult<ProviderOrderRequest> {
    let amount = order
        .price
        .checked_mul(Decimal::from(order.quantity))
        .ok_or_else(|| CoreError::ValidationError(format!("Order {} total overflows", order.reference_number)))?;

    let address = ProviderAddress {
        firstname: order.recipient.first_name.clone(),
        lastname: order.recipient.last_name.clone(),
        email: order.recipient.email.clone(),
        telephone: order.recipient.phone.clone(),
        line1: order.billing_address.line1.clone(),
        line2: order.billing_address.line2.clone().unwrap_or_default(),
        city: order.billing_address.city.clone(),
        region: order.billing_address.region.clone(),
        country: order.billing_address.country.clone(),
        postcode: order.billing_address.postcode.clone(),
        bill_to_this: true,
    };

    Ok(ProviderOrderRequest {
        billing: address.clone(),
        address,
        payments: vec![PaymentLine {
            code: PAYMENT_CODE.to_string(),
            amount,
            po_number: order.reference_number.clone(),
        }],
        ref_no: order.reference_number.clone(),
        sync_only: true,
        delivery_mode: DELIVERY_MODE.to_string(),
        products: vec![ProductLine {
            sku: order.sku.clone(),
            price: order.price,
            qty: order.quantity,
        }],
        remarks: mode.remarks().to_string(),
    })
}
