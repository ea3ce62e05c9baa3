pub mod app_config;
pub mod database;
pub mod order_repo;
pub mod token_repo;
pub mod memory;

pub use database::DbClient;
pub use memory::{InMemoryCredentialStore, InMemoryOrderRepository};
pub use order_repo::PgOrderRepository;
pub use token_repo::PgCredentialStore;
