use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use cardline_core::{Order, OrderStatus};
use cardline_order::{OrderIntent, OrderOutcome};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

/// Stored order as shown to operators. Card secrets are never included.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    pub id: Uuid,
    pub reference_number: String,
    pub sku: String,
    pub price: Decimal,
    pub quantity: i32,
    pub status: OrderStatus,
    pub retry_count: i32,
    pub last_retry_at: Option<DateTime<Utc>>,
    pub provider_order_id: Option<String>,
    pub card_validity: Option<String>,
    pub issuance_date: Option<String>,
    pub balance: Option<Decimal>,
    pub error_message: Option<String>,
    pub payment_order_id: String,
    pub order_index: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Order> for OrderSummary {
    fn from(order: Order) -> Self {
        Self {
            id: order.id,
            reference_number: order.reference_number,
            sku: order.sku,
            price: order.price,
            quantity: order.quantity,
            status: order.status,
            retry_count: order.retry_count,
            last_retry_at: order.last_retry_at,
            provider_order_id: order.provider_order_id,
            card_validity: order.card_validity,
            issuance_date: order.issuance_date,
            balance: order.balance,
            error_message: order.error_message,
            payment_order_id: order.payment_order_id,
            order_index: order.order_index,
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/orders", post(place_order))
        .route("/v1/orders/{reference}", get(get_order))
        .route("/v1/orders/{reference}/force-update", post(force_update_order))
}

/// Completed orders answer 200; anything still queued answers 202
fn status_code(outcome: &OrderOutcome) -> StatusCode {
    match outcome.status {
        OrderStatus::Completed => StatusCode::OK,
        _ => StatusCode::ACCEPTED,
    }
}

/// POST /v1/orders
async fn place_order(
    State(state): State<AppState>,
    Json(intent): Json<OrderIntent>,
) -> Result<(StatusCode, Json<OrderOutcome>), AppError> {
    let outcome = state.orchestrator.place_order(intent).await?;
    tracing::info!("Order {} answered with status {}", outcome.reference_number, outcome.status);
    Ok((status_code(&outcome), Json(outcome)))
}

/// POST /v1/orders/{reference}/force-update
async fn force_update_order(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<(StatusCode, Json<OrderOutcome>), AppError> {
    tracing::info!("Force update requested for order {}", reference);
    let outcome = state.orchestrator.force_update_order(&reference).await?;
    Ok((status_code(&outcome), Json(outcome)))
}

/// GET /v1/orders/{reference}
async fn get_order(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<Json<OrderSummary>, AppError> {
    let order = state.orchestrator.find_order(&reference).await?;
    Ok(Json(order.into()))
}
