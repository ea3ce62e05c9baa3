use async_trait::async_trait;
use cardline_core::credential::{AccessToken, CredentialStore, TokenIssuer};
use cardline_core::{CoreError, CoreResult};
use cardline_shared::Masked;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Advisory lock key serializing token rotation across processes
const TOKEN_ROTATION_LOCK: i64 = 0x6361_7264_746f_6b;

/// Postgres-backed credential store. Minting goes through a `TokenIssuer`
/// and swaps the active row in one transaction.
pub struct PgCredentialStore {
    pool: PgPool,
    issuer: Arc<dyn TokenIssuer>,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool, issuer: Arc<dyn TokenIssuer>) -> Self {
        Self { pool, issuer }
    }
}

#[derive(sqlx::FromRow)]
struct TokenRow {
    id: Uuid,
    token: String,
    is_active: bool,
    expires_at: Option<chrono::DateTime<chrono::Utc>>,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<TokenRow> for AccessToken {
    fn from(row: TokenRow) -> Self {
        AccessToken {
            id: row.id,
            value: Masked::new(row.token),
            is_active: row.is_active,
            expires_at: row.expires_at,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn get_active(&self) -> CoreResult<Option<AccessToken>> {
        let row = sqlx::query_as::<_, TokenRow>(
            r#"
            SELECT id, token, is_active, expires_at, created_at
            FROM provider_tokens
            WHERE is_active AND (expires_at IS NULL OR expires_at > NOW())
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CoreError::StorageError(e.to_string()))?;

        Ok(row.map(AccessToken::from))
    }

    async fn mint_new(&self) -> CoreResult<AccessToken> {
        let token = AccessToken::from_issued(self.issuer.issue().await?);

        let mut tx = self.pool.begin().await.map_err(|e| CoreError::StorageError(e.to_string()))?;

        // Concurrent rotations would otherwise both see the old row and race
        // on the single-active index; held until commit
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(TOKEN_ROTATION_LOCK)
            .execute(&mut *tx)
            .await
            .map_err(|e| CoreError::StorageError(e.to_string()))?;

        sqlx::query("UPDATE provider_tokens SET is_active = FALSE WHERE is_active")
            .execute(&mut *tx)
            .await
            .map_err(|e| CoreError::StorageError(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO provider_tokens (id, token, is_active, expires_at, created_at)
            VALUES ($1, $2, TRUE, $3, $4)
            "#,
        )
        .bind(token.id)
        .bind(token.value.expose())
        .bind(token.expires_at)
        .bind(token.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| CoreError::StorageError(e.to_string()))?;

        tx.commit().await.map_err(|e| CoreError::StorageError(e.to_string()))?;

        info!("Minted provider token {} (expires {:?})", token.id, token.expires_at);
        Ok(token)
    }
}
