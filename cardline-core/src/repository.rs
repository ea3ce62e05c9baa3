use async_trait::async_trait;

use crate::models::{NewOrder, Order, OrderStatus, OrderUpdate};
use crate::CoreResult;

/// Result of inserting an order under a reference number
#[derive(Debug, Clone)]
pub enum Insertion {
    /// A fresh `pending` row was written
    Created(Order),
    /// The reference number was already taken; this is the stored row
    Existing(Order),
}

/// Repository trait for gift-card order data access.
///
/// Reference numbers are unique at the store level. `create` is an atomic
/// insert-or-fetch and `claim_for_processing` is a compare-and-set, so two
/// concurrent callers can never both move the same order to `processing`.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn create(&self, order: NewOrder) -> CoreResult<Insertion>;

    /// Look an order up, optionally only when its status is one of `statuses`
    async fn find_by_reference(
        &self,
        reference_number: &str,
        statuses: Option<&[OrderStatus]>,
    ) -> CoreResult<Option<Order>>;

    /// Apply a partial update. Fails with `NotFound` when the order is absent.
    async fn update(&self, reference_number: &str, update: OrderUpdate) -> CoreResult<Order>;

    /// Move the order to `processing` only if its current status is one of
    /// `from`. Returns `None` when another caller got there first.
    async fn claim_for_processing(
        &self,
        reference_number: &str,
        from: &[OrderStatus],
        bump_retry: bool,
    ) -> CoreResult<Option<Order>>;
}
