use cardline_core::cipher::{seal_card_field, Cipher};
use cardline_core::credential::{AccessToken, CredentialStore};
use cardline_core::provider::{GiftCardProvider, ProviderResponse, SignedSubmission, TransportKind};
use cardline_core::repository::{Insertion, OrderRepository};
use cardline_core::signing::RequestSigner;
use cardline_core::{BillingAddress, CoreError, Order, OrderStatus, OrderUpdate};
use cardline_shared::Masked;
use rust_decimal::Decimal;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::classify::{classify, Failure};
use crate::intent::{generate_reference, OrderIntent};
use crate::outcome::{IssuedCard, OrderError, OrderOutcome, OrderResult};
use crate::payload::{build_order_request, SubmissionMode};

/// Told to the caller whenever fulfillment is deferred; details go to `error_message`
pub(crate) const QUEUED_MESSAGE: &str = "Your order has been received and will be fulfilled shortly";
const NO_CREDENTIAL_MESSAGE: &str = "No active provider credential; order queued for fulfillment";
const NO_CARDS_MESSAGE: &str = "Provider returned no cards; order queued for retry";
const INTERNAL_MESSAGE: &str = "Internal error during fulfillment; order queued for retry";

#[derive(Debug, Clone)]
pub struct FulfillmentSettings {
    /// Provider attempts per intake call, counting credential re-mints
    pub max_attempts: u32,
    pub reference_prefix: String,
    /// Used when the intent carries no billing address
    pub default_address: BillingAddress,
}

impl FulfillmentSettings {
    pub fn new(default_address: BillingAddress) -> Self {
        Self {
            max_attempts: 2,
            reference_prefix: "GC".to_string(),
            default_address,
        }
    }
}

/// How the bounded submission loop ended
#[derive(Debug)]
pub(crate) enum LoopOutcome {
    Issued(ProviderResponse),
    /// 2xx without a card list
    NoCards(ProviderResponse),
    Rejected { status: u16, message: String },
    Unavailable { kind: TransportKind, message: String },
    /// The last allowed attempt was refused for its credential
    CredentialRejected { message: String },
}

/// Turns purchase intents into issued gift cards.
///
/// Depends only on the store, credential, signer, cipher and provider
/// contracts; holds no mutable state of its own, so one instance serves
/// every request.
pub struct FulfillmentOrchestrator {
    pub(crate) orders: Arc<dyn OrderRepository>,
    pub(crate) credentials: Arc<dyn CredentialStore>,
    pub(crate) signer: Arc<dyn RequestSigner>,
    pub(crate) cipher: Arc<dyn Cipher>,
    pub(crate) provider: Arc<dyn GiftCardProvider>,
    pub(crate) settings: FulfillmentSettings,
}

impl FulfillmentOrchestrator {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        credentials: Arc<dyn CredentialStore>,
        signer: Arc<dyn RequestSigner>,
        cipher: Arc<dyn Cipher>,
        provider: Arc<dyn GiftCardProvider>,
        settings: FulfillmentSettings,
    ) -> Self {
        Self {
            orders,
            credentials,
            signer,
            cipher,
            provider,
            settings,
        }
    }

    /// Fulfill a paid purchase intent.
    ///
    /// Provider outages and credential trouble come back as a deferred
    /// `pending` outcome; only bad input, a provider business rejection and
    /// internal failures are errors.
    pub async fn place_order(&self, intent: OrderIntent) -> OrderResult {
        // 1. Validate before touching any store
        let validated = intent.validate()?;
        let reference = validated
            .reference_number
            .clone()
            .unwrap_or_else(|| generate_reference(&self.settings.reference_prefix));

        // 2. Fast path for a reference that is already in flight or done
        let held = [OrderStatus::Processing, OrderStatus::Completed];
        if let Some(existing) = self.orders.find_by_reference(&reference, Some(&held)).await? {
            info!("Order {} already {}, skipping provider call", reference, existing.status);
            return Ok(already_satisfied(&existing));
        }

        // 3. Insert-or-fetch; the unique reference closes the race with step 2
        let new_order = validated.into_new_order(reference.clone(), &self.settings.default_address);
        let order = match self.orders.create(new_order).await? {
            Insertion::Created(order) => {
                info!("Order {} created for sku {}", order.reference_number, order.sku);
                order
            }
            Insertion::Existing(order) if order.status.holds_reference() => {
                info!("Order {} already {}, skipping provider call", reference, order.status);
                return Ok(already_satisfied(&order));
            }
            Insertion::Existing(order) => {
                info!("Order {} exists as {}, driving it again", reference, order.status);
                order
            }
        };

        // 4. Without a credential the order waits for the next pass
        let Some(token) = self.credentials.get_active().await? else {
            warn!("No active provider credential, deferring order {}", reference);
            self.orders
                .update(&reference, OrderUpdate::status(OrderStatus::Pending).with_error(NO_CREDENTIAL_MESSAGE))
                .await?;
            return Ok(OrderOutcome::new(reference, OrderStatus::Pending, QUEUED_MESSAGE));
        };

        // 5. Build the payload, then claim the order; only one caller can win
        let payload = self.payload_for(&order, SubmissionMode::Intake)?;
        let claim_from = [OrderStatus::Pending, OrderStatus::Failed];
        if self.orders.claim_for_processing(&reference, &claim_from, false).await?.is_none() {
            return self.current_outcome(&reference).await;
        }

        // 6. Submit and settle; internal errors must not leave it processing
        let result = self.drive_intake(&reference, token, &payload).await;
        if let Err(OrderError::Internal(err)) = &result {
            self.release(&reference, err, true).await;
        }
        result
    }

    async fn drive_intake(&self, reference: &str, token: AccessToken, payload: &Value) -> OrderResult {
        let outcome = self.submit_with_retry(reference, token, payload).await?;

        match outcome {
            LoopOutcome::Issued(response) => self.complete(reference, &response).await,
            LoopOutcome::NoCards(response) => {
                warn!("Provider accepted order {} without cards, deferring", reference);
                let mut update = OrderUpdate::status(OrderStatus::Pending)
                    .with_error(NO_CARDS_MESSAGE)
                    .bump_retry();
                update.provider_response = Some(response.redacted_raw());
                self.orders.update(reference, update).await?;
                Ok(OrderOutcome::new(reference, OrderStatus::Pending, QUEUED_MESSAGE))
            }
            LoopOutcome::Unavailable { kind, message } => {
                warn!("Provider unavailable ({}) for order {}: {}", kind, reference, message);
                let detail = format!("Provider unavailable ({}): {}", kind, message);
                self.defer(reference, detail).await
            }
            LoopOutcome::CredentialRejected { message } => {
                warn!("Provider kept rejecting the credential for order {}: {}", reference, message);
                let detail = format!("Provider rejected the credential: {}", message);
                self.defer(reference, detail).await
            }
            LoopOutcome::Rejected { status, message } => {
                error!("Provider rejected order {} with status {}: {}", reference, status, message);
                self.orders
                    .update(reference, OrderUpdate::status(OrderStatus::Failed).with_error(message.clone()))
                    .await?;
                Err(OrderError::ProviderRejected {
                    reference_number: reference.to_string(),
                    message,
                })
            }
        }
    }

    /// Revert to pending with a retry bump so a later pass picks it up
    async fn defer(&self, reference: &str, detail: String) -> OrderResult {
        self.orders
            .update(
                reference,
                OrderUpdate::status(OrderStatus::Pending).with_error(detail).bump_retry(),
            )
            .await?;
        Ok(OrderOutcome::new(reference, OrderStatus::Pending, QUEUED_MESSAGE))
    }

    /// Up to `max_attempts` signed submissions. Only a credential rejection
    /// moves on to another attempt, after minting a new token.
    pub(crate) async fn submit_with_retry(
        &self,
        reference: &str,
        mut token: AccessToken,
        payload: &Value,
    ) -> Result<LoopOutcome, OrderError> {
        let max_attempts = self.settings.max_attempts.max(1);
        let url = self.provider.order_url();
        let mut attempt = 0;

        loop {
            attempt += 1;
            // Every attempt gets its own timestamp
            let submission = self.sign(&url, &token, payload)?;
            info!("Submitting order {} (attempt {}/{})", reference, attempt, max_attempts);

            let err = match self.provider.submit_order(&submission).await {
                Ok(response) if response.first_card().is_some() => return Ok(LoopOutcome::Issued(response)),
                Ok(response) => return Ok(LoopOutcome::NoCards(response)),
                Err(err) => err,
            };

            match classify(&err) {
                Failure::CredentialRejected { message } => {
                    warn!("Credential rejected on attempt {} for order {}: {}", attempt, reference, message);
                    if attempt >= max_attempts {
                        return Ok(LoopOutcome::CredentialRejected { message });
                    }
                    token = self.credentials.mint_new().await?;
                    info!("Minted new provider credential {}", token.id);
                }
                Failure::ProviderRejected { status, message } => {
                    return Ok(LoopOutcome::Rejected { status, message });
                }
                Failure::ProviderUnavailable { kind, message } => {
                    return Ok(LoopOutcome::Unavailable { kind, message });
                }
            }
        }
    }

    pub(crate) fn sign(&self, url: &str, token: &AccessToken, payload: &Value) -> Result<SignedSubmission, CoreError> {
        let signature = self.signer.sign("POST", url, payload)?;
        Ok(SignedSubmission {
            bearer: Masked::new(token.bearer()),
            signature,
            payload: payload.clone(),
        })
    }

    pub(crate) fn payload_for(&self, order: &Order, mode: SubmissionMode) -> Result<Value, CoreError> {
        let request = build_order_request(order, mode)?;
        serde_json::to_value(request)
            .map_err(|e| CoreError::InternalError(format!("Failed to encode provider payload: {}", e)))
    }

    /// Persist a successful issuance. Card secrets are sealed before the write
    /// and the stored audit payload is redacted.
    pub(crate) async fn complete(&self, reference: &str, response: &ProviderResponse) -> OrderResult {
        let card = response.first_card().cloned().unwrap_or_default();
        let update = OrderUpdate {
            status: Some(OrderStatus::Completed),
            provider_order_id: Some(response.order.order_id.clone().unwrap_or_default()),
            card_number: Some(seal_card_field(self.cipher.as_ref(), card.card_number.as_deref())?),
            card_pin: Some(seal_card_field(self.cipher.as_ref(), card.card_pin.as_deref())?),
            card_validity: card.validity.clone(),
            issuance_date: card.issuance_date.clone(),
            balance: Some(response.settled_balance().unwrap_or(Decimal::ZERO)),
            provider_response: Some(response.redacted_raw()),
            ..Default::default()
        }
        .clear_error();

        let order = self.orders.update(reference, update).await?;
        info!("Order {} completed (provider order {:?})", reference, order.provider_order_id);

        let cards = response.order.cards.iter().map(IssuedCard::from).collect();
        Ok(OrderOutcome::new(reference, OrderStatus::Completed, "Gift card issued").with_cards(cards))
    }

    /// Put a claimed order back to pending after an internal failure
    pub(crate) async fn release(&self, reference: &str, err: &CoreError, bump_retry: bool) {
        error!("Internal error while fulfilling order {}: {}", reference, err);
        let mut update = OrderUpdate::status(OrderStatus::Pending).with_error(INTERNAL_MESSAGE);
        update.bump_retry = bump_retry;
        if let Err(e) = self.orders.update(reference, update).await {
            error!("Failed to release order {} after internal error: {}", reference, e);
        }
    }

    async fn current_outcome(&self, reference: &str) -> OrderResult {
        match self.orders.find_by_reference(reference, None).await? {
            Some(order) => {
                info!("Order {} was claimed elsewhere ({})", reference, order.status);
                Ok(already_satisfied(&order))
            }
            None => Err(OrderError::NotFound(reference.to_string())),
        }
    }

    /// Look an order up by reference number
    pub async fn find_order(&self, reference: &str) -> Result<Order, OrderError> {
        self.orders
            .find_by_reference(reference, None)
            .await?
            .ok_or_else(|| OrderError::NotFound(reference.to_string()))
    }
}

pub(crate) fn already_satisfied(order: &Order) -> OrderOutcome {
    let message = match order.status {
        OrderStatus::Completed => "Order already fulfilled",
        OrderStatus::Processing => "Order is already being processed",
        _ => QUEUED_MESSAGE,
    };
    OrderOutcome::new(order.reference_number.clone(), order.status, message)
}
