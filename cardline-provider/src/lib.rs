//! Outbound HTTP integration with the gift-card issuance provider.

pub mod client;
pub mod signer;

pub use client::{HttpProviderClient, ProviderSettings};
pub use signer::HmacRequestSigner;
