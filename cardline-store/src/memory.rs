use async_trait::async_trait;
use cardline_core::credential::{AccessToken, CredentialStore, TokenIssuer};
use cardline_core::repository::{Insertion, OrderRepository};
use cardline_core::{CoreError, CoreResult, NewOrder, Order, OrderStatus, OrderUpdate};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// A thread-safe in-memory order store keyed by reference number.
///
/// Every operation runs under one write lock, which gives the same
/// insert-or-fetch and compare-and-set guarantees as the SQL store.
#[derive(Default, Clone)]
pub struct InMemoryOrderRepository {
    orders: Arc<RwLock<HashMap<String, Order>>>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.orders.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.orders.read().await.is_empty()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn create(&self, order: NewOrder) -> CoreResult<Insertion> {
        let mut orders = self.orders.write().await;
        if let Some(existing) = orders.get(&order.reference_number) {
            return Ok(Insertion::Existing(existing.clone()));
        }
        let created = Order::from_new(order);
        orders.insert(created.reference_number.clone(), created.clone());
        Ok(Insertion::Created(created))
    }

    async fn find_by_reference(
        &self,
        reference_number: &str,
        statuses: Option<&[OrderStatus]>,
    ) -> CoreResult<Option<Order>> {
        let orders = self.orders.read().await;
        Ok(orders
            .get(reference_number)
            .filter(|order| statuses.map_or(true, |allowed| allowed.contains(&order.status)))
            .cloned())
    }

    async fn update(&self, reference_number: &str, update: OrderUpdate) -> CoreResult<Order> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(reference_number)
            .ok_or_else(|| CoreError::NotFound(reference_number.to_string()))?;
        order.apply(&update);
        Ok(order.clone())
    }

    async fn claim_for_processing(
        &self,
        reference_number: &str,
        from: &[OrderStatus],
        bump_retry: bool,
    ) -> CoreResult<Option<Order>> {
        let mut orders = self.orders.write().await;
        let Some(order) = orders.get_mut(reference_number) else {
            return Ok(None);
        };
        if !from.contains(&order.status) {
            return Ok(None);
        }
        let mut update = OrderUpdate::status(OrderStatus::Processing);
        update.bump_retry = bump_retry;
        order.apply(&update);
        Ok(Some(order.clone()))
    }
}

/// In-memory credential store for tests and local runs.
///
/// Without an issuer, minted tokens are random local values.
#[derive(Default, Clone)]
pub struct InMemoryCredentialStore {
    tokens: Arc<RwLock<Vec<AccessToken>>>,
    issuer: Option<Arc<dyn TokenIssuer>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with one active token
    pub fn with_active(value: impl Into<String>) -> Self {
        Self {
            tokens: Arc::new(RwLock::new(vec![AccessToken::new(value, None)])),
            issuer: None,
        }
    }

    pub fn with_issuer(mut self, issuer: Arc<dyn TokenIssuer>) -> Self {
        self.issuer = Some(issuer);
        self
    }

    /// Every token ever stored, active or not
    pub async fn token_count(&self) -> usize {
        self.tokens.read().await.len()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn get_active(&self) -> CoreResult<Option<AccessToken>> {
        let now = Utc::now();
        let tokens = self.tokens.read().await;
        Ok(tokens.iter().rev().find(|t| t.is_usable(now)).cloned())
    }

    async fn mint_new(&self) -> CoreResult<AccessToken> {
        let token = match &self.issuer {
            Some(issuer) => AccessToken::from_issued(issuer.issue().await?),
            None => AccessToken::new(format!("local-{}", Uuid::new_v4().simple()), None),
        };

        let mut tokens = self.tokens.write().await;
        for existing in tokens.iter_mut() {
            existing.is_active = false;
        }
        tokens.push(token.clone());
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardline_core::{BillingAddress, Recipient};
    use rust_decimal_macros::dec;

    fn new_order(reference: &str) -> NewOrder {
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
            billing_address: BillingAddress {
                line1: "12 MG Road".to_string(),
                line2: None,
                city: "Bengaluru".to_string(),
                region: "Karnataka".to_string(),
                country: "IN".to_string(),
                postcode: "560001".to_string(),
            },
            payment_order_id: "pay_ord_1".to_string(),
            payment_id: Some("pay_1".to_string()),
            order_index: 0,
        }
    }

    #[tokio::test]
    async fn test_create_is_insert_or_fetch() {
        let repo = InMemoryOrderRepository::new();

        let first = repo.create(new_order("GC-1")).await.unwrap();
        assert!(matches!(first, Insertion::Created(_)));

        let second = repo.create(new_order("GC-1")).await.unwrap();
        assert!(matches!(second, Insertion::Existing(_)));
        assert_eq!(repo.len().await, 1);
    }

    #[tokio::test]
    async fn test_find_respects_status_filter() {
        let repo = InMemoryOrderRepository::new();
        repo.create(new_order("GC-1")).await.unwrap();

        let claimed = [OrderStatus::Processing, OrderStatus::Completed];
        assert!(repo.find_by_reference("GC-1", Some(&claimed)).await.unwrap().is_none());
        assert!(repo.find_by_reference("GC-1", None).await.unwrap().is_some());
        assert!(repo.find_by_reference("GC-2", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_claim_only_succeeds_once() {
        let repo = InMemoryOrderRepository::new();
        repo.create(new_order("GC-1")).await.unwrap();

        let from = [OrderStatus::Pending, OrderStatus::Failed];
        let first = repo.claim_for_processing("GC-1", &from, false).await.unwrap();
        assert_eq!(first.unwrap().status, OrderStatus::Processing);

        let second = repo.claim_for_processing("GC-1", &from, false).await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn test_update_missing_order_is_not_found() {
        let repo = InMemoryOrderRepository::new();
        let err = repo.update("nope", OrderUpdate::status(OrderStatus::Failed)).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_mint_rotates_active_token() {
        let store = InMemoryCredentialStore::with_active("first");
        let before = store.get_active().await.unwrap().unwrap();
        assert_eq!(before.value.expose(), "first");

        let minted = store.mint_new().await.unwrap();
        let after = store.get_active().await.unwrap().unwrap();
        assert_eq!(after.id, minted.id);
        assert_ne!(after.value.expose(), "first");
        assert_eq!(store.token_count().await, 2);
    }

    #[tokio::test]
    async fn test_empty_store_has_no_active_token() {
        let store = InMemoryCredentialStore::new();
        assert!(store.get_active().await.unwrap().is_none());
    }
}
