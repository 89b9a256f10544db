//! Webhook signature verification.
//!
//! Paystack signs every webhook with HMAC-SHA512 keyed by the account secret
//! and sends the lowercase hex digest in `x-paystack-signature`. The digest
//! covers the body bytes exactly as sent, so verification must run on the raw
//! request body before any JSON parsing.

use std::fmt;

use hmac::{Hmac, Mac};
use sha2::Sha512;

use crate::error::SignatureError;

type HmacSha512 = Hmac<Sha512>;

/// Header carrying the webhook signature
pub const SIGNATURE_HEADER: &str = "x-paystack-signature";

/// Verifies webhook signatures against the configured secret.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: Vec<u8>,
}

impl fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl SignatureVerifier {
    /// Create a verifier for `secret`
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    fn mac(&self) -> Result<HmacSha512, SignatureError> {
        HmacSha512::new_from_slice(&self.secret).map_err(|_| SignatureError::Mismatch)
    }

    /// Check `signature_header` against the HMAC of `raw_body`.
    ///
    /// The comparison is constant-time (`Mac::verify_slice`).
    pub fn verify(&self, raw_body: &[u8], signature_header: &str) -> Result<(), SignatureError> {
        let provided =
            hex::decode(signature_header.trim()).map_err(|_| SignatureError::InvalidEncoding)?;

        let mut mac = self.mac()?;
        mac.update(raw_body);
        mac.verify_slice(&provided)
            .map_err(|_| SignatureError::Mismatch)
    }

    /// Hex signature for `raw_body`, as Paystack would send it
    pub fn sign(&self, raw_body: &[u8]) -> Result<String, SignatureError> {
        let mut mac = self.mac()?;
        mac.update(raw_body);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

/// One-shot check of `signature_header` over `raw_body` with `secret`
pub fn verify_signature(raw_body: &[u8], signature_header: &str, secret: &str) -> bool {
    SignatureVerifier::new(secret)
        .verify(raw_body, signature_header)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "sk_test_secret";

    #[test]
    fn test_valid_signature() {
        let verifier = SignatureVerifier::new(SECRET);
        let body = br#"{"event":"charge.success","data":{}}"#;
        let signature = verifier.sign(body).unwrap();

        assert_eq!(signature.len(), 128);
        assert!(verifier.verify(body, &signature).is_ok());
        assert!(verify_signature(body, &signature, SECRET));
    }

    #[test]
    fn test_uppercase_hex_accepted() {
        let verifier = SignatureVerifier::new(SECRET);
        let body = b"{}";
        let signature = verifier.sign(body).unwrap().to_uppercase();
        assert!(verifier.verify(body, &signature).is_ok());
    }

    #[test]
    fn test_reserialized_body_fails() {
        let verifier = SignatureVerifier::new(SECRET);
        let raw = br#"{"event": "charge.success", "data": {"amount": 500000}}"#;
        let signature = verifier.sign(raw).unwrap();

        let reparsed: serde_json::Value = serde_json::from_slice(raw).unwrap();
        let reserialized = serde_json::to_vec(&reparsed).unwrap();
        assert_ne!(reserialized.as_slice(), raw.as_slice());
        assert_eq!(
            verifier.verify(&reserialized, &signature),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_wrong_secret_fails() {
        let body = b"{}";
        let signature = SignatureVerifier::new("other").sign(body).unwrap();
        assert!(!verify_signature(body, &signature, SECRET));
    }

    #[test]
    fn test_malformed_headers() {
        let verifier = SignatureVerifier::new(SECRET);
        assert_eq!(
            verifier.verify(b"{}", "not-hex"),
            Err(SignatureError::InvalidEncoding)
        );
        assert_eq!(verifier.verify(b"{}", "abcd"), Err(SignatureError::Mismatch));
        assert_eq!(verifier.verify(b"{}", ""), Err(SignatureError::Mismatch));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let rendered = format!("{:?}", SignatureVerifier::new(SECRET));
        assert!(!rendered.contains(SECRET));
    }
}
