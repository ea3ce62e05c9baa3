use anyhow::Context;
use cardline_api::{app, AppState};
use cardline_core::cipher::AesGcmCipher;
use cardline_order::{FulfillmentOrchestrator, FulfillmentSettings};
use cardline_provider::{HmacRequestSigner, HttpProviderClient, ProviderSettings};
use cardline_shared::Masked;
use cardline_store::app_config::Config;
use cardline_store::{DbClient, PgCredentialStore, PgOrderRepository};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cardline_api=debug,cardline_order=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Cardline API on port {}", config.server.port);

    // Postgres
    let db = DbClient::new(&config.database.url, config.database.max_connections)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;

    // Provider
    let provider = Arc::new(HttpProviderClient::new(ProviderSettings {
        base_url: config.provider.base_url.clone(),
        order_path: config.provider.order_path.clone(),
        token_path: config.provider.token_path.clone(),
        client_id: config.provider.client_id.clone(),
        client_secret: Masked::new(config.provider.client_secret.clone()),
        timeout: Duration::from_secs(config.provider.timeout_seconds),
    })?);

    let cipher = AesGcmCipher::from_base64_key(&config.cipher.key).context("Invalid cipher key")?;

    let settings = FulfillmentSettings {
        max_attempts: config.fulfillment.max_attempts,
        reference_prefix: config.fulfillment.reference_prefix.clone(),
        default_address: config.fulfillment.default_address.clone(),
    };

    let orchestrator = FulfillmentOrchestrator::new(
        Arc::new(PgOrderRepository::new(db.pool.clone())),
        Arc::new(PgCredentialStore::new(db.pool.clone(), provider.clone())),
        Arc::new(HmacRequestSigner::new(config.provider.signing_secret.clone())),
        Arc::new(cipher),
        provider,
        settings,
    );

    let app = app(AppState::new(orchestrator));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
