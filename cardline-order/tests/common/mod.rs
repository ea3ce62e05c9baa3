#![allow(dead_code)]

use async_trait::async_trait;
use cardline_core::cipher::{AesGcmCipher, Cipher};
use cardline_core::credential::{AccessToken, CredentialStore};
use cardline_core::provider::{GiftCardProvider, ProviderError, ProviderResponse, SignedSubmission, TransportKind};
use cardline_core::repository::OrderRepository;
use cardline_core::{BillingAddress, CoreError, CoreResult, NewOrder, Recipient};
use cardline_order::{FulfillmentOrchestrator, FulfillmentSettings, OrderIntent};
use cardline_provider::HmacRequestSigner;
use cardline_store::{InMemoryCredentialStore, InMemoryOrderRepository};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const ORDER_URL: &str = "https://provider.test/rest/v3/orders";
pub const SIGNING_SECRET: &str = "test-signing-secret";
pub const CARD_NUMBER: &str = "6001220012345678";
pub const CARD_PIN: &str = "123456";

/// Provider double that plays back a script and records every submission
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<Value, ProviderError>>>,
    calls: Mutex<Vec<SignedSubmission>>,
    delay: Duration,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Result<Value, ProviderError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
            delay: Duration::from_millis(5),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<SignedSubmission> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl GiftCardProvider for ScriptedProvider {
    fn order_url(&self) -> String {
        ORDER_URL.to_string()
    }

    async fn submit_order(&self, submission: &SignedSubmission) -> Result<ProviderResponse, ProviderError> {
        self.calls.lock().unwrap().push(submission.clone());
        // Keeps consecutive signatures on distinct millisecond timestamps
        tokio::time::sleep(self.delay).await;
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(raw)) => Ok(ProviderResponse::from_raw(raw)),
            Some(Err(err)) => Err(err),
            None => Err(unreachable_provider()),
        }
    }
}

/// Has a token to hand out but cannot rotate it
pub struct BrokenMintStore;

#[async_trait]
impl CredentialStore for BrokenMintStore {
    async fn get_active(&self) -> CoreResult<Option<AccessToken>> {
        Ok(Some(AccessToken::new("tok_initial", None)))
    }

    async fn mint_new(&self) -> CoreResult<AccessToken> {
        Err(CoreError::CredentialError("token endpoint returned 500".to_string()))
    }
}

/// Refuses to seal anything
pub struct BrokenCipher;

impl Cipher for BrokenCipher {
    fn encrypt(&self, _plaintext: &str) -> CoreResult<String> {
        Err(CoreError::CipherError("key unavailable".to_string()))
    }
}

pub const INTERNAL_ERROR_MESSAGE: &str = "Internal error during fulfillment; order queued for retry";

pub fn card_reply() -> Value {
    json!({
        "orderId": "PRV-1001",
        "status": "COMPLETE",
        "cards": [{
            "cardNumber": CARD_NUMBER,
            "cardPin": CARD_PIN,
            "validity": "2027-10-17",
            "issuanceDate": "2026-10-17"
        }],
        "payments": [{"code": "svc", "balance": 500}]
    })
}

pub fn timeout() -> ProviderError {
    ProviderError::Unavailable {
        kind: TransportKind::Timeout,
        message: "operation timed out".to_string(),
    }
}

pub fn unreachable_provider() -> ProviderError {
    ProviderError::Unavailable {
        kind: TransportKind::Connect,
        message: "connection refused".to_string(),
    }
}

pub fn rejected(status: u16, body: Value) -> ProviderError {
    ProviderError::Rejected { status, body }
}

pub fn address() -> BillingAddress {
    BillingAddress {
        line1: "12 MG Road".to_string(),
        line2: None,
        city: "Bengaluru".to_string(),
        region: "Karnataka".to_string(),
        country: "IN".to_string(),
        postcode: "560001".to_string(),
    }
}

pub fn intent(reference: Option<&str>) -> OrderIntent {
    OrderIntent {
        reference_number: reference.map(str::to_string),
        sku: Some("GC100".to_string()),
        price: Some("500".to_string()),
        quantity: Some("1".to_string()),
        payment_order_id: Some("pay_ord_1".to_string()),
        payment_id: Some("pay_1".to_string()),
        first_name: Some("Asha".to_string()),
        last_name: Some("Rao".to_string()),
        email: Some("asha@example.com".to_string()),
        phone: Some("+919800000000".to_string()),
        ..Default::default()
    }
}

pub fn new_order(reference: &str) -> NewOrder {
    NewOrder {
        reference_number: reference.to_string(),
        sku: "GC100".to_string(),
        price: dec!(500),
        quantity: 1,
        recipient: Recipient {
            first_name: "Asha".to_string(),
            last_name: "Rao".to_string(),
            email: "asha@example.com".to_string(),
            phone: "+919800000000".to_string(),
        },
        billing_address: address(),
        payment_order_id: "pay_ord_1".to_string(),
        payment_id: None,
        order_index: 0,
    }
}

pub struct Harness {
    pub orchestrator: Arc<FulfillmentOrchestrator>,
    pub orders: InMemoryOrderRepository,
    pub credentials: InMemoryCredentialStore,
    pub provider: Arc<ScriptedProvider>,
    pub cipher: AesGcmCipher,
}

impl Harness {
    pub fn new(script: Vec<Result<Value, ProviderError>>) -> Self {
        Self::build(ScriptedProvider::new(script), InMemoryCredentialStore::with_active("tok_initial"))
    }

    pub fn without_token(script: Vec<Result<Value, ProviderError>>) -> Self {
        Self::build(ScriptedProvider::new(script), InMemoryCredentialStore::new())
    }

    pub fn build(provider: ScriptedProvider, credentials: InMemoryCredentialStore) -> Self {
        let orders = InMemoryOrderRepository::new();
        let provider = Arc::new(provider);
        let cipher = AesGcmCipher::new(&[7u8; 32]).unwrap();

        let orchestrator = FulfillmentOrchestrator::new(
            Arc::new(orders.clone()),
            Arc::new(credentials.clone()),
            Arc::new(HmacRequestSigner::new(SIGNING_SECRET)),
            Arc::new(cipher.clone()),
            provider.clone(),
            FulfillmentSettings::new(address()),
        );

        Self {
            orchestrator: Arc::new(orchestrator),
            orders,
            credentials,
            provider,
            cipher,
        }
    }

    /// Swap in other credential and cipher implementations
    pub fn with_parts(
        provider: ScriptedProvider,
        credentials: Arc<dyn CredentialStore>,
        cipher: Arc<dyn Cipher>,
    ) -> Self {
        let mut harness = Self::build(provider, InMemoryCredentialStore::new());
        harness.orchestrator = Arc::new(FulfillmentOrchestrator::new(
            Arc::new(harness.orders.clone()),
            credentials,
            Arc::new(HmacRequestSigner::new(SIGNING_SECRET)),
            cipher,
            harness.provider.clone(),
            FulfillmentSettings::new(address()),
        ));
        harness
    }

    pub async fn stored(&self, reference: &str) -> cardline_core::Order {
        self.orders.find_by_reference(reference, None).await.unwrap().unwrap()
    }
}
