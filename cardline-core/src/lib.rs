pub mod models;
pub mod repository;
pub mod credential;
pub mod signing;
pub mod cipher;
pub mod provider;

pub use models::{BillingAddress, NewOrder, Order, OrderStatus, OrderUpdate, Recipient};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Order not found: {0}")]
    NotFound(String),
    #[error("Storage error: {0}")]
    StorageError(String),
    #[error("Credential error: {0}")]
    CredentialError(String),
    #[error("Request signing failed: {0}")]
    SigningError(String),
    #[error("Encryption failed: {0}")]
    CipherError(String),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
