use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use cardline_order::OrderError;
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    ValidationError(String),
    AuthenticationError(String),
    /// The provider refused the order; carries the refund hint
    ProviderRejected { reference_number: String, message: String },
    NotFoundError(String),
    Anyhow(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, json!({ "error": msg })),
            AppError::ProviderRejected { reference_number, message } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "error": message, "referenceNumber": reference_number, "status": "failed" }),
            ),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {:#}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal Server Error" }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<OrderError> for AppError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::InvalidInput { .. } => AppError::ValidationError(err.to_string()),
            OrderError::Unauthenticated => AppError::AuthenticationError(err.to_string()),
            OrderError::ProviderRejected { ref reference_number, .. } => AppError::ProviderRejected {
                reference_number: reference_number.clone(),
                message: err.to_string(),
            },
            OrderError::NotFound(_) => AppError::NotFoundError(err.to_string()),
            OrderError::Internal(inner) => AppError::Anyhow(inner.into()),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Anyhow(err)
    }
}
