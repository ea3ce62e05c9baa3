use serde_json::Value;

use crate::CoreResult;

/// Signature headers for one provider call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSignature {
    pub signature: String,
    /// Client-side timestamp the signature is bound to
    pub timestamp: String,
}

/// Signs an outbound provider request.
///
/// Implementations must take a fresh timestamp on every call and must be
/// deterministic for identical (method, url, payload, timestamp).
pub trait RequestSigner: Send + Sync {
    fn sign(&self, method: &str, url: &str, payload: &Value) -> CoreResult<RequestSignature>;
}
