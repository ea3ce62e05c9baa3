use async_trait::async_trait;
use cardline_core::credential::{IssuedToken, TokenIssuer};
use cardline_core::provider::{GiftCardProvider, ProviderError, ProviderResponse, SignedSubmission, TransportKind};
use cardline_core::{CoreError, CoreResult};
use cardline_shared::Masked;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

const MAX_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub base_url: String,
    pub order_path: String,
    pub token_path: String,
    pub client_id: String,
    pub client_secret: Masked<String>,
    /// Hard limit for one provider call; expiry is reported as a timeout
    pub timeout: Duration,
}

/// reqwest-backed client for the gift-card provider
#[derive(Clone)]
pub struct HttpProviderClient {
    client: Client,
    settings: ProviderSettings,
}

#[derive(Debug, Deserialize)]
struct TokenReply {
    #[serde(alias = "accessToken", alias = "token")]
    access_token: String,
    #[serde(default, alias = "expiresIn")]
    expires_in: Option<i64>,
}

impl HttpProviderClient {
    pub fn new(settings: ProviderSettings) -> CoreResult<Self> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .connect_timeout(settings.timeout.min(MAX_CONNECT_TIMEOUT))
            .build()
            .map_err(|e| CoreError::InternalError(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, settings })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.settings.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

fn transport_error(err: reqwest::Error) -> ProviderError {
    let kind = if err.is_timeout() {
        TransportKind::Timeout
    } else if err.is_connect() {
        TransportKind::Connect
    } else {
        TransportKind::Other
    };
    ProviderError::Unavailable {
        kind,
        message: err.to_string(),
    }
}

/// Provider bodies are usually JSON; anything else is kept as a string
fn parse_body(text: String) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(&text).unwrap_or(Value::String(text))
}

#[async_trait]
impl GiftCardProvider for HttpProviderClient {
    fn order_url(&self) -> String {
        self.url(&self.settings.order_path)
    }

    async fn submit_order(&self, submission: &SignedSubmission) -> Result<ProviderResponse, ProviderError> {
        let url = self.order_url();
        debug!("POST {} (dateAtClient={})", url, submission.signature.timestamp);

        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, submission.bearer.expose().as_str())
            .header("signature", submission.signature.signature.as_str())
            .header("dateAtClient", submission.signature.timestamp.as_str())
            .header(CONTENT_TYPE, "application/json")
            .json(&submission.payload)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = parse_body(response.text().await.map_err(transport_error)?);

        if status.is_success() {
            Ok(ProviderResponse::from_raw(body))
        } else {
            warn!("Provider rejected order request with status {}", status);
            Err(ProviderError::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[async_trait]
impl TokenIssuer for HttpProviderClient {
    async fn issue(&self) -> CoreResult<IssuedToken> {
        let response = self
            .client
            .post(self.url(&self.settings.token_path))
            .json(&json!({
                "clientId": self.settings.client_id,
                "clientSecret": self.settings.client_secret.expose(),
                "grantType": "client_credentials",
            }))
            .send()
            .await
            .map_err(|e| CoreError::CredentialError(format!("Token request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CoreError::CredentialError(format!(
                "Token endpoint returned {}: {}",
                status, body
            )));
        }

        let reply: TokenReply = response
            .json()
            .await
            .map_err(|e| CoreError::CredentialError(format!("Unreadable token reply: {}", e)))?;

        Ok(IssuedToken {
            value: reply.access_token,
            expires_in_seconds: reply.expires_in,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardline_core::signing::RequestSignature;
    use tokio::net::TcpListener;

    fn settings(base_url: String, timeout: Duration) -> ProviderSettings {
        ProviderSettings {
            base_url,
            order_path: "/rest/v3/orders".to_string(),
            token_path: "/oauth2/token".to_string(),
            client_id: "client".to_string(),
            client_secret: Masked::new("secret".to_string()),
            timeout,
        }
    }

    fn submission() -> SignedSubmission {
        SignedSubmission {
            bearer: Masked::new("Bearer t".to_string()),
            signature: RequestSignature {
                signature: "abc".to_string(),
                timestamp: "2026-10-17T10:00:00.000Z".to_string(),
            },
            payload: json!({"refNo": "GC-1"}),
        }
    }

    #[test]
    fn test_order_url_joins_cleanly() {
        let client = HttpProviderClient::new(settings("https://cards.example/".to_string(), Duration::from_secs(30))).unwrap();
        assert_eq!(client.order_url(), "https://cards.example/rest/v3/orders");
    }

    #[test]
    fn test_parse_body_keeps_non_json() {
        assert_eq!(parse_body("".to_string()), Value::Null);
        assert_eq!(parse_body("{\"a\":1}".to_string()), json!({"a": 1}));
        assert_eq!(parse_body("Bad Gateway".to_string()), json!("Bad Gateway"));
    }

    #[tokio::test]
    async fn test_refused_connection_is_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = HttpProviderClient::new(settings(format!("http://{}", addr), Duration::from_secs(5))).unwrap();
        let err = client.submit_order(&submission()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn test_silent_provider_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            // Accept and hold the socket without ever answering
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let client = HttpProviderClient::new(settings(format!("http://{}", addr), Duration::from_millis(200))).unwrap();
        let err = client.submit_order(&submission()).await.unwrap_err();
        assert!(matches!(
            err,
            ProviderError::Unavailable { kind: TransportKind::Timeout, .. }
        ));
    }
}
