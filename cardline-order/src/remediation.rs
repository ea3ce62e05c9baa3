//! Operator-triggered resubmission of orders that did not complete.
//!
//! One signed attempt, no credential re-mint. The retry counter is bumped
//! when the order is claimed, whatever the attempt turns out to be.

use cardline_core::credential::AccessToken;
use cardline_core::{OrderStatus, OrderUpdate};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::classify::{classify, Failure};
use crate::orchestrator::{already_satisfied, FulfillmentOrchestrator, QUEUED_MESSAGE};
use crate::outcome::{OrderError, OrderOutcome, OrderResult};
use crate::payload::SubmissionMode;

const UNAVAILABLE_MESSAGE: &str = "Provider temporarily unavailable, will retry automatically";
const NO_CARDS_MESSAGE: &str = "Provider returned no cards on forced resync";

impl FulfillmentOrchestrator {
    pub async fn force_update_order(&self, reference: &str) -> OrderResult {
        // 1. Locate the order; nothing is written for an unknown reference
        let order = self
            .orders
            .find_by_reference(reference, None)
            .await?
            .ok_or_else(|| OrderError::NotFound(reference.to_string()))?;

        if order.status == OrderStatus::Completed {
            info!("Order {} already completed, nothing to resync", reference);
            return Ok(already_satisfied(&order));
        }

        // 2. Remediation needs a credential up front
        let token = self.credentials.get_active().await?.ok_or(OrderError::Unauthenticated)?;

        // 3. Claim with a retry bump
        let payload = self.payload_for(&order, SubmissionMode::ForcedResync)?;
        let claim_from = [OrderStatus::Pending, OrderStatus::Processing, OrderStatus::Failed];
        let Some(claimed) = self.orders.claim_for_processing(reference, &claim_from, true).await? else {
            // Completed between the read and the claim
            let current = self.find_order(reference).await?;
            return Ok(already_satisfied(&current));
        };
        info!("Force-updating order {} (retry {})", reference, claimed.retry_count);

        let result = self.resync(reference, &token, &payload).await;
        if let Err(OrderError::Internal(err)) = &result {
            self.release(reference, err, false).await;
        }
        result
    }

    async fn resync(&self, reference: &str, token: &AccessToken, payload: &Value) -> OrderResult {
        let submission = self.sign(&self.provider.order_url(), token, payload)?;

        let err = match self.provider.submit_order(&submission).await {
            Ok(response) if response.first_card().is_some() => return self.complete(reference, &response).await,
            Ok(response) => {
                warn!("Forced resync of order {} returned no cards", reference);
                let mut update = OrderUpdate::status(OrderStatus::Pending).with_error(NO_CARDS_MESSAGE);
                update.provider_response = Some(response.redacted_raw());
                self.orders.update(reference, update).await?;
                return Ok(OrderOutcome::new(reference, OrderStatus::Pending, QUEUED_MESSAGE));
            }
            Err(err) => err,
        };

        match classify(&err) {
            Failure::ProviderUnavailable { kind, message } => {
                warn!("Provider unavailable ({}) on forced resync of {}: {}", kind, reference, message);
                self.orders
                    .update(reference, OrderUpdate::status(OrderStatus::Pending).with_error(UNAVAILABLE_MESSAGE))
                    .await?;
                Ok(OrderOutcome::new(reference, OrderStatus::Pending, UNAVAILABLE_MESSAGE))
            }
            Failure::CredentialRejected { message } | Failure::ProviderRejected { message, .. } => {
                error!("Forced resync of order {} failed: {}", reference, message);
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
}
