//! Maps provider failures onto the fulfillment error taxonomy.
//!
//! Error bodies come back in several shapes; `ErrorShape` names each of
//! them so `classify` can match exhaustively instead of probing fields.

use cardline_core::provider::{ProviderError, TransportKind};
use serde_json::Value;

/// Codes that mean "the bearer token was not accepted"
const CREDENTIAL_CODES: &[&str] = &[
    "401",
    "unauthorized",
    "invalid_token",
    "token_expired",
    "expired_token",
    "invalid_grant",
    "oauth_token_rejected",
];

const CREDENTIAL_PHRASES: &[&str] = &[
    "invalid token",
    "invalid access token",
    "token is invalid",
    "token expired",
    "token has expired",
    "expired token",
    "unauthorized",
    "unauthorised",
    "authentication failed",
];

/// Gateway statuses mean the provider itself was not reached
const GATEWAY_STATUSES: &[u16] = &[502, 503, 504];

#[derive(Debug, Clone, PartialEq)]
pub enum ErrorShape {
    /// `{"code": 5001, "message": "..."}`; code may be a number or a string
    Coded { code: String, message: Option<String> },
    /// `{"error": {"code": ..., "message": ...}}`
    Nested { code: Option<String>, message: Option<String> },
    /// `{"error": "invalid_token", "error_description": "..."}`
    ErrorText { error: String, description: Option<String> },
    /// `{"message": "..."}`
    Message(String),
    /// Non-JSON body or JSON we do not recognise
    Opaque(String),
    Empty,
}

fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl ErrorShape {
    pub fn from_body(body: &Value) -> Self {
        match body {
            Value::Null => ErrorShape::Empty,
            Value::String(s) if s.trim().is_empty() => ErrorShape::Empty,
            Value::String(s) => ErrorShape::Opaque(s.clone()),
            Value::Object(map) => {
                if let Some(code) = text(map.get("code")) {
                    return ErrorShape::Coded {
                        code,
                        message: text(map.get("message")),
                    };
                }
                match map.get("error") {
                    Some(Value::Object(inner)) => ErrorShape::Nested {
                        code: text(inner.get("code")),
                        message: text(inner.get("message")),
                    },
                    Some(Value::String(error)) => ErrorShape::ErrorText {
                        error: error.clone(),
                        description: text(map.get("error_description")).or_else(|| text(map.get("message"))),
                    },
                    _ => match text(map.get("message")) {
                        Some(message) => ErrorShape::Message(message),
                        None => ErrorShape::Opaque(body.to_string()),
                    },
                }
            }
            other => ErrorShape::Opaque(other.to_string()),
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            ErrorShape::Coded { code, .. } => Some(code),
            ErrorShape::Nested { code, .. } => code.as_deref(),
            ErrorShape::ErrorText { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Most human-readable description available
    pub fn message(&self) -> Option<String> {
        match self {
            ErrorShape::Coded { code, message } => message.clone().or_else(|| Some(format!("Provider error code {}", code))),
            ErrorShape::Nested { code, message } => message.clone().or_else(|| code.clone()),
            ErrorShape::ErrorText { error, description } => description.clone().or_else(|| Some(error.clone())),
            ErrorShape::Message(message) => Some(message.clone()),
            ErrorShape::Opaque(raw) => Some(raw.clone()),
            ErrorShape::Empty => None,
        }
    }

    fn rejects_credential(&self) -> bool {
        let code_hit = self
            .code()
            .map(|c| CREDENTIAL_CODES.contains(&c.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        let message_hit = self
            .message()
            .map(|m| {
                let m = m.to_ascii_lowercase();
                CREDENTIAL_PHRASES.iter().any(|phrase| m.contains(phrase))
            })
            .unwrap_or(false);
        code_hit || message_hit
    }
}

/// What the orchestrator should do about a failed provider call
#[derive(Debug, Clone, PartialEq)]
pub enum Failure {
    /// The token was refused; minting a new one may help
    CredentialRejected { message: String },
    /// Business error from the provider (bad sku, out of stock, ...)
    ProviderRejected { status: u16, message: String },
    /// Nothing structured came back: timeout, DNS, refused, gateway down
    ProviderUnavailable { kind: TransportKind, message: String },
}

fn body_status(body: &Value) -> Option<u16> {
    match body.get("status")? {
        Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

pub fn classify(err: &ProviderError) -> Failure {
    match err {
        ProviderError::Unavailable { kind, message } => Failure::ProviderUnavailable {
            kind: *kind,
            message: message.clone(),
        },
        ProviderError::Rejected { status, body } => {
            let shape = ErrorShape::from_body(body);
            let message = shape
                .message()
                .unwrap_or_else(|| format!("Provider returned status {}", status));

            if *status == 401 || body_status(body) == Some(401) || shape.rejects_credential() {
                Failure::CredentialRejected { message }
            } else if GATEWAY_STATUSES.contains(status) {
                Failure::ProviderUnavailable {
                    kind: TransportKind::Other,
                    message: format!("gateway status {}: {}", status, message),
                }
            } else {
                Failure::ProviderRejected {
                    status: *status,
                    message,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rejected(status: u16, body: Value) -> Failure {
        classify(&ProviderError::Rejected { status, body })
    }

    #[test]
    fn test_http_401_is_credential_rejection() {
        assert!(matches!(rejected(401, Value::Null), Failure::CredentialRejected { .. }));
    }

    #[test]
    fn test_credential_rejection_in_other_encodings() {
        assert!(matches!(
            rejected(400, json!({"code": "INVALID_TOKEN", "message": "bad"})),
            Failure::CredentialRejected { .. }
        ));
        assert!(matches!(
            rejected(403, json!({"error": "invalid_token", "error_description": "expired"})),
            Failure::CredentialRejected { .. }
        ));
        assert!(matches!(
            rejected(400, json!({"error": {"code": 9, "message": "OAuth token has expired"}})),
            Failure::CredentialRejected { .. }
        ));
        assert!(matches!(
            rejected(400, json!({"status": 401, "message": "nope"})),
            Failure::CredentialRejected { .. }
        ));
        assert!(matches!(
            rejected(400, json!({"code": 401})),
            Failure::CredentialRejected { .. }
        ));
    }

    #[test]
    fn test_business_error_is_terminal() {
        let failure = rejected(400, json!({"status": 400, "message": "Invalid SKU"}));
        assert_eq!(
            failure,
            Failure::ProviderRejected {
                status: 400,
                message: "Invalid SKU".to_string()
            }
        );
    }

    #[test]
    fn test_gateway_errors_are_unavailable() {
        assert!(matches!(
            rejected(503, json!("Service Unavailable")),
            Failure::ProviderUnavailable { .. }
        ));
    }

    #[test]
    fn test_transport_errors_are_unavailable() {
        let failure = classify(&ProviderError::Unavailable {
            kind: TransportKind::Timeout,
            message: "timed out".to_string(),
        });
        assert!(matches!(
            failure,
            Failure::ProviderUnavailable { kind: TransportKind::Timeout, .. }
        ));
    }

    #[test]
    fn test_shapes() {
        assert_eq!(ErrorShape::from_body(&Value::Null), ErrorShape::Empty);
        assert_eq!(
            ErrorShape::from_body(&json!({"code": 5001})),
            ErrorShape::Coded { code: "5001".to_string(), message: None }
        );
        assert_eq!(
            ErrorShape::from_body(&json!({"message": "Out of stock"})),
            ErrorShape::Message("Out of stock".to_string())
        );
        assert_eq!(
            ErrorShape::from_body(&json!("<html>bad gateway</html>")).message().as_deref(),
            Some("<html>bad gateway</html>")
        );
        assert_eq!(rejected(422, Value::Null), Failure::ProviderRejected {
            status: 422,
            message: "Provider returned status 422".to_string()
        });
    }
}
