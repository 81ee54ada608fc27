// src/webhook/hmac.rs
//
// HMAC-SHA256 signing and constant-time verification, generalized from this
// codebase's `webhook.rs::sign_payload`/`verify_signature` (which sign an
// outgoing `{timestamp}.{body}` message). The receiver here verifies an
// *incoming* delivery against the raw, unprefixed body, per spec §3/§4.1
// invariant: "HMAC-SHA256(secret, raw body) equals the header value."

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::util::ct_eq;

type HmacSha256 = Hmac<Sha256>;

/// Hex-encoded HMAC-SHA256 digest of `body` under `secret`.
pub fn hex_digest(secret: &[u8], body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a delivery per spec §3: `verified` iff the secret is non-empty,
/// a signature header was present, and the digests match under constant-time
/// comparison. A mismatch or absence never implies rejection — callers decide
/// what to do with `verified = false` (spec §4.1, §7).
pub fn verify(secret: &[u8], body: &[u8], signature_header: Option<&str>) -> bool {
    if secret.is_empty() {
        return false;
    }
    let Some(header) = signature_header else {
        return false;
    };
    let expected = hex_digest(secret, body);
    ct_eq(expected.as_bytes(), header.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verifies_matching_signature() {
        let secret = b"s3cret";
        let body = br#"{"x":1}"#;
        let sig = hex_digest(secret, body);
        assert!(verify(secret, body, Some(&sig)));
    }

    #[test]
    fn flipped_bit_fails_verification() {
        let secret = b"s3cret";
        let body = br#"{"x":1}"#;
        let mut sig = hex_digest(secret, body).into_bytes();
        // Flip the last hex character to something else, corrupting one bit
        // of the encoded digest.
        let last = sig.len() - 1;
        sig[last] = if sig[last] == b'0' { b'1' } else { b'0' };
        let sig = String::from_utf8(sig).unwrap();

        assert!(!verify(secret, body, Some(&sig)));
    }

    #[test]
    fn empty_secret_never_verifies() {
        let body = br#"{"x":1}"#;
        let sig = hex_digest(b"anything", body);
        assert!(!verify(b"", body, Some(&sig)));
    }

    #[test]
    fn missing_header_never_verifies() {
        let secret = b"s3cret";
        let body = br#"{"x":1}"#;
        assert!(!verify(secret, body, None));
    }
}
