use async_trait::async_trait;
use cardline_shared::Masked;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::CoreResult;

/// Bearer credential for the gift-card provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessToken {
    pub id: Uuid,
    pub value: Masked<String>,
    pub is_active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(value: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            value: Masked::new(value.into()),
            is_active: true,
            expires_at,
            created_at: Utc::now(),
        }
    }

    pub fn from_issued(issued: IssuedToken) -> Self {
        // A lifetime too large to represent is treated as no expiry
        let expires_at = issued
            .expires_in_seconds
            .and_then(Duration::try_seconds)
            .and_then(|ttl| Utc::now().checked_add_signed(ttl));
        Self::new(issued.value, expires_at)
    }

    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at.map_or(true, |at| at > now)
    }

    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.value.expose())
    }
}

/// A token freshly handed out by the provider
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub value: String,
    pub expires_in_seconds: Option<i64>,
}

/// Holds the single active provider token.
///
/// Rotation can happen at any time (another request, an external job), so
/// callers must not assume the token they read is still the active one when
/// the provider checks it.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get_active(&self) -> CoreResult<Option<AccessToken>>;

    /// Obtain a new token, make it the active one and return it
    async fn mint_new(&self) -> CoreResult<AccessToken>;
}

/// Source of new tokens (the provider's token endpoint in production)
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    async fn issue(&self) -> CoreResult<IssuedToken>;
}
