use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::sync::Arc;

use crate::{CoreError, CoreResult};

const NONCE_LEN: usize = 12;

/// Encrypts card secrets before they are persisted
pub trait Cipher: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> CoreResult<String>;
}

/// Encrypt a card field, or store an empty string when the provider sent none.
/// Empty values never go through the cipher.
pub fn seal_card_field(cipher: &dyn Cipher, value: Option<&str>) -> CoreResult<String> {
    match value {
        Some(v) if !v.is_empty() => cipher.encrypt(v),
        _ => Ok(String::new()),
    }
}

/// AES-256-GCM with a random nonce per value.
///
/// Output format: base64(`nonce (12 bytes)` || `ciphertext`).
#[derive(Clone)]
pub struct AesGcmCipher {
    cipher: Arc<Aes256Gcm>,
}

impl AesGcmCipher {
    pub fn new(key: &[u8]) -> CoreResult<Self> {
        if key.len() != 32 {
            return Err(CoreError::CipherError(
                "Encryption key must be exactly 32 bytes for AES-256-GCM".to_string(),
            ));
        }
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| CoreError::CipherError(format!("Failed to initialize AES-256-GCM: {}", e)))?;
        Ok(Self { cipher: Arc::new(cipher) })
    }

    pub fn from_base64_key(encoded: &str) -> CoreResult<Self> {
        let key = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CoreError::CipherError(format!("Encryption key is not valid base64: {}", e)))?;
        Self::new(&key)
    }

    /// Reverse of `encrypt`; used by consumers that reveal a stored card
    pub fn decrypt(&self, encoded: &str) -> CoreResult<String> {
        let data = STANDARD
            .decode(encoded)
            .map_err(|e| CoreError::CipherError(format!("Ciphertext is not valid base64: {}", e)))?;
        if data.len() <= NONCE_LEN {
            return Err(CoreError::CipherError("Ciphertext too short (missing nonce)".to_string()));
        }
        let (nonce, ciphertext) = data.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CoreError::CipherError("Decryption failed".to_string()))?;
        String::from_utf8(plaintext).map_err(|e| CoreError::CipherError(e.to_string()))
    }
}

impl Cipher for AesGcmCipher {
    fn encrypt(&self, plaintext: &str) -> CoreResult<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| CoreError::CipherError("Encryption failed".to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(sealed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> AesGcmCipher {
        AesGcmCipher::new(&[7u8; 32]).unwrap()
    }

    #[test]
    fn test_ciphertext_differs_from_plaintext() {
        let cipher = cipher();
        let sealed = cipher.encrypt("6001220012345678").unwrap();
        assert_ne!(sealed, "6001220012345678");
        assert_eq!(cipher.decrypt(&sealed).unwrap(), "6001220012345678");
    }

    #[test]
    fn test_nonce_is_fresh_per_call() {
        let cipher = cipher();
        let a = cipher.encrypt("1234").unwrap();
        let b = cipher.encrypt("1234").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_empty_fields_skip_cipher() {
        let cipher = cipher();
        assert_eq!(seal_card_field(&cipher, None).unwrap(), "");
        assert_eq!(seal_card_field(&cipher, Some("")).unwrap(), "");
        assert_ne!(seal_card_field(&cipher, Some("987654")).unwrap(), "987654");
    }

    #[test]
    fn test_rejects_short_key() {
        assert!(AesGcmCipher::new(&[1u8; 16]).is_err());
        assert!(AesGcmCipher::from_base64_key("not base64!").is_err());
    }
}
