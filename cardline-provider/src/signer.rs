use cardline_core::signing::{RequestSignature, RequestSigner};
use cardline_core::{CoreError, CoreResult};
use cardline_shared::Masked;
use chrono::{SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha512;

type HmacSha512 = Hmac<Sha512>;

/// HMAC-SHA512 request signer.
///
/// Base string: `METHOD&enc(url)&enc(canonical payload)&enc(timestamp)`,
/// where `enc` is percent-encoding and the payload is JSON with object keys
/// sorted at every level. The signature is lowercase hex.
pub struct HmacRequestSigner {
    secret: Masked<String>,
}

impl HmacRequestSigner {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: Masked::new(secret.into()),
        }
    }

    /// Signature for an explicit timestamp
    pub fn sign_at(&self, method: &str, url: &str, payload: &Value, timestamp: &str) -> CoreResult<String> {
        let base = base_string(method, url, payload, timestamp);
        let mut mac = HmacSha512::new_from_slice(self.secret.expose().as_bytes())
            .map_err(|e| CoreError::SigningError(e.to_string()))?;
        mac.update(base.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

impl RequestSigner for HmacRequestSigner {
    fn sign(&self, method: &str, url: &str, payload: &Value) -> CoreResult<RequestSignature> {
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let signature = self.sign_at(method, url, payload, &timestamp)?;
        Ok(RequestSignature { signature, timestamp })
    }
}

fn base_string(method: &str, url: &str, payload: &Value, timestamp: &str) -> String {
    format!(
        "{}&{}&{}&{}",
        method.to_uppercase(),
        urlencoding::encode(url),
        urlencoding::encode(&canonical_json(payload)),
        urlencoding::encode(timestamp)
    )
}

/// Compact JSON with sorted object keys, independent of map ordering features
fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|key| format!("{}:{}", Value::String(key.clone()), canonical_json(&map[key])))
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        other => other.to_string(),
    }
}
