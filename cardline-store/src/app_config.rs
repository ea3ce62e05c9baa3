use cardline_core::BillingAddress;
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub provider: ProviderConfig,
    pub cipher: CipherConfig,
    pub fulfillment: FulfillmentConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 5 }

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub order_path: String,
    pub token_path: String,
    pub client_id: String,
    pub client_secret: String,
    pub signing_secret: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_timeout_seconds() -> u64 { 30 }

#[derive(Debug, Deserialize, Clone)]
pub struct CipherConfig {
    /// Base64 of a 32-byte AES-256 key
    pub key: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FulfillmentConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_reference_prefix")]
    pub reference_prefix: String,
    /// Used when the caller does not send a billing address
    pub default_address: BillingAddress,
}

fn default_max_attempts() -> u32 { 2 }

fn default_reference_prefix() -> String { "GC".to_string() }

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides are optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `CARDLINE_PROVIDER__CLIENT_SECRET=...`
            .add_source(config::Environment::with_prefix("CARDLINE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
