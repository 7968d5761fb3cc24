// HMAC-SHA256 signing for block broadcast requests.
//
// The signature travels in the X-Broadcast-Signature header as
// `sha256=<lowercase hex>` computed over the exact raw request body.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const BROADCAST_SIGNATURE_HEADER: &str = "X-Broadcast-Signature";

const SIGNATURE_PREFIX: &str = "sha256=";

/// Compute the header value for an outbound broadcast body.
pub fn generate_broadcast_signature(secret: &[u8], body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(body);
    let digest = mac.finalize();
    format!("{}{}", SIGNATURE_PREFIX, hex::encode(digest.into_bytes()))
}

/// Verify an inbound `X-Broadcast-Signature` header against the raw body.
///
/// Accepts the value with or without the `sha256=` prefix.
pub fn verify_broadcast_signature(secret: &[u8], body: &[u8], header_value: &str) -> bool {
    let provided = header_value
        .strip_prefix(SIGNATURE_PREFIX)
        .unwrap_or(header_value);
    let expected = generate_broadcast_signature(secret, body);
    let expected = &expected[SIGNATURE_PREFIX.len()..];
    constant_time_compare(expected.as_bytes(), provided.as_bytes())
}

/// Constant-time comparison to prevent timing attacks
pub fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify() {
        let secret = b"shared-secret";
        let body = br#"{"block_hash":"00","block_height":1}"#;
        let header = generate_broadcast_signature(secret, body);
        assert!(header.starts_with("sha256="));
        assert!(verify_broadcast_signature(secret, body, &header));
    }

    #[test]
    fn verify_accepts_bare_hex() {
        let secret = b"shared-secret";
        let body = b"payload";
        let header = generate_broadcast_signature(secret, body);
        let bare = header.strip_prefix("sha256=").unwrap();
        assert!(verify_broadcast_signature(secret, body, bare));
    }

    #[test]
    fn tampered_body_fails() {
        let secret = b"shared-secret";
        let header = generate_broadcast_signature(secret, b"payload");
        assert!(!verify_broadcast_signature(secret, b"payload2", &header));
    }

    #[test]
    fn wrong_secret_fails() {
        let header = generate_broadcast_signature(b"secret-a", b"payload");
        assert!(!verify_broadcast_signature(b"secret-b", b"payload", &header));
    }

    #[test]
    fn compare_rejects_length_mismatch() {
        assert!(!constant_time_compare(b"abc", b"abcd"));
        assert!(constant_time_compare(b"abc", b"abc"));
    }
}
