use async_trait::async_trait;
use cardline_core::repository::{Insertion, OrderRepository};
use cardline_core::{BillingAddress, CoreError, CoreResult, NewOrder, Order, OrderStatus, OrderUpdate, Recipient};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

const ORDER_COLUMNS: &str = "id, reference_number, sku, price, quantity, first_name, last_name, email, phone, \
    billing_address, status, retry_count, last_retry_at, provider_order_id, card_number, card_pin, \
    card_validity, issuance_date, balance, error_message, provider_response, payment_order_id, \
    payment_id, order_index, created_at, updated_at";

pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, reference_number: &str) -> CoreResult<Option<Order>> {
        let sql = format!("SELECT {} FROM gift_card_orders WHERE reference_number = $1", ORDER_COLUMNS);
        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(reference_number)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;
        row.map(Order::try_from).transpose()
    }
}

fn storage(err: sqlx::Error) -> CoreError {
    CoreError::StorageError(err.to_string())
}

fn status_names(statuses: &[OrderStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    reference_number: String,
    sku: String,
    price: Decimal,
    quantity: i32,
    first_name: String,
    last_name: String,
    email: String,
    phone: String,
    billing_address: Json<BillingAddress>,
    status: String,
    retry_count: i32,
    last_retry_at: Option<chrono::DateTime<chrono::Utc>>,
    provider_order_id: Option<String>,
    card_number: Option<String>,
    card_pin: Option<String>,
    card_validity: Option<String>,
    issuance_date: Option<String>,
    balance: Option<Decimal>,
    error_message: Option<String>,
    provider_response: Option<Value>,
    payment_order_id: String,
    payment_id: Option<String>,
    order_index: i32,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = CoreError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Order {
            id: row.id,
            reference_number: row.reference_number,
            sku: row.sku,
            price: row.price,
            quantity: row.quantity,
            recipient: Recipient {
                first_name: row.first_name,
                last_name: row.last_name,
                email: row.email,
                phone: row.phone,
            },
            billing_address: row.billing_address.0,
            status: row.status.parse()?,
            retry_count: row.retry_count,
            last_retry_at: row.last_retry_at,
            provider_order_id: row.provider_order_id,
            card_number: row.card_number,
            card_pin: row.card_pin,
            card_validity: row.card_validity,
            issuance_date: row.issuance_date,
            balance: row.balance,
            error_message: row.error_message,
            provider_response: row.provider_response,
            payment_order_id: row.payment_order_id,
            payment_id: row.payment_id,
            order_index: row.order_index,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn create(&self, order: NewOrder) -> CoreResult<Insertion> {
        // ON CONFLICT DO NOTHING returns no row when the reference is taken,
        // which turns the insert into an atomic insert-or-fetch.
        let sql = format!(
            r#"
            INSERT INTO gift_card_orders (id, reference_number, sku, price, quantity, first_name, last_name, email, phone,
                                          billing_address, status, retry_count, payment_order_id, payment_id, order_index)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'pending', 0, $11, $12, $13)
            ON CONFLICT (reference_number) DO NOTHING
            RETURNING {}
            "#,
            ORDER_COLUMNS
        );

        let inserted = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(&order.reference_number)
            .bind(&order.sku)
            .bind(order.price)
            .bind(order.quantity)
            .bind(&order.recipient.first_name)
            .bind(&order.recipient.last_name)
            .bind(&order.recipient.email)
            .bind(&order.recipient.phone)
            .bind(Json(&order.billing_address))
            .bind(&order.payment_order_id)
            .bind(&order.payment_id)
            .bind(order.order_index)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;

        match inserted {
            Some(row) => Ok(Insertion::Created(Order::try_from(row)?)),
            None => {
                let existing = self.fetch(&order.reference_number).await?.ok_or_else(|| {
                    CoreError::StorageError(format!(
                        "Reference {} conflicted but no row was found",
                        order.reference_number
                    ))
                })?;
                Ok(Insertion::Existing(existing))
            }
        }
    }

    async fn find_by_reference(
        &self,
        reference_number: &str,
        statuses: Option<&[OrderStatus]>,
    ) -> CoreResult<Option<Order>> {
        let sql = format!(
            "SELECT {} FROM gift_card_orders WHERE reference_number = $1 AND ($2::text[] IS NULL OR status = ANY($2))",
            ORDER_COLUMNS
        );
        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(reference_number)
            .bind(statuses.map(status_names))
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;
        row.map(Order::try_from).transpose()
    }

    async fn update(&self, reference_number: &str, update: OrderUpdate) -> CoreResult<Order> {
        let sql = format!(
            r#"
            UPDATE gift_card_orders SET
                status = COALESCE($2, status),
                retry_count = retry_count + $3,
                last_retry_at = CASE WHEN $3 > 0 THEN NOW() ELSE last_retry_at END,
                provider_order_id = COALESCE($4, provider_order_id),
                card_number = COALESCE($5, card_number),
                card_pin = COALESCE($6, card_pin),
                card_validity = COALESCE($7, card_validity),
                issuance_date = COALESCE($8, issuance_date),
                balance = COALESCE($9, balance),
                error_message = CASE WHEN $10 THEN $11 ELSE error_message END,
                provider_response = COALESCE($12, provider_response),
                updated_at = NOW()
            WHERE reference_number = $1
            RETURNING {}
            "#,
            ORDER_COLUMNS
        );

        let (touch_error, error_message) = match update.error_message {
            Some(message) => (true, message),
            None => (false, None),
        };

        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(reference_number)
            .bind(update.status.map(|s| s.as_str()))
            .bind(if update.bump_retry { 1i32 } else { 0i32 })
            .bind(update.provider_order_id)
            .bind(update.card_number)
            .bind(update.card_pin)
            .bind(update.card_validity)
            .bind(update.issuance_date)
            .bind(update.balance)
            .bind(touch_error)
            .bind(error_message)
            .bind(update.provider_response)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;

        match row {
            Some(row) => Order::try_from(row),
            None => Err(CoreError::NotFound(reference_number.to_string())),
        }
    }

    async fn claim_for_processing(
        &self,
        reference_number: &str,
        from: &[OrderStatus],
        bump_retry: bool,
    ) -> CoreResult<Option<Order>> {
        let sql = format!(
            r#"
            UPDATE gift_card_orders SET
                status = 'processing',
                retry_count = retry_count + $2,
                last_retry_at = CASE WHEN $2 > 0 THEN NOW() ELSE last_retry_at END,
                updated_at = NOW()
            WHERE reference_number = $1 AND status = ANY($3)
            RETURNING {}
            "#,
            ORDER_COLUMNS
        );

        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(reference_number)
            .bind(if bump_retry { 1i32 } else { 0i32 })
            .bind(status_names(from))
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;
        row.map(Order::try_from).transpose()
    }
}
