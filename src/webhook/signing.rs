//! HMAC-SHA256 request signing.
//!
//! The signature covers the exact request body bytes and travels as
//! `X-Webhook-Signature: sha256=<hex>`. Receivers recompute it with their
//! copy of the secret.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the body signature.
pub const SIGNATURE_HEADER: &str = "x-webhook-signature";
/// Header carrying the event tag.
pub const EVENT_HEADER: &str = "x-webhook-event";
/// Header carrying the per-attempt delivery ID.
pub const DELIVERY_HEADER: &str = "x-webhook-delivery";

const SIGNATURE_PREFIX: &str = "sha256=";

/// Hex-encoded HMAC-SHA256 of `body` keyed by `secret`.
#[must_use]
pub fn compute_signature(secret: &str, body: &[u8]) -> String {
    // HMAC accepts keys of any length, so this never fails.
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return String::new();
    };
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Full header value: `sha256=<hex>`.
#[must_use]
pub fn signature_header_value(secret: &str, body: &[u8]) -> String {
    format!("{SIGNATURE_PREFIX}{}", compute_signature(secret, body))
}

/// Checks a received header value in constant time.
#[must_use]
pub fn verify_signature(secret: &str, body: &[u8], header_value: &str) -> bool {
    let Some(received) = header_value.strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };
    let expected = compute_signature(secret, body);
    expected.len() == received.len() && bool::from(expected.as_bytes().ct_eq(received.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector() {
        // RFC 4231 test case 2.
        let sig = compute_signature("Jefe", b"what do ya want for nothing?");
        assert_eq!(
            sig,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn header_value_round_trips() {
        let body = br#"{"event":"user.created"}"#;
        let header = signature_header_value("k", body);
        assert!(header.starts_with("sha256="));
        assert!(verify_signature("k", body, &header));
    }

    #[test]
    fn rejects_tampering() {
        let header = signature_header_value("k", b"original");
        assert!(!verify_signature("k", b"tampered", &header));
        assert!(!verify_signature("other", b"original", &header));
        assert!(!verify_signature("k", b"original", "md5=abc"));
    }
}
