//! Version-control webhook signature verification (HMAC-SHA256).
//!
//! The signature arrives in the `X-Hub-Signature-256` header as
//! `sha256=<hex>`. Comparison is constant-time via [`Mac::verify_slice`].

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the payload signature.
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

const SIGNATURE_PREFIX: &str = "sha256=";

/// Parse a `sha256=<hex>` header into raw digest bytes.
///
/// Returns `None` for a missing prefix or invalid hex.
pub fn parse_signature_header(header: &str) -> Option<Vec<u8>> {
    let hex_sig = header.trim().strip_prefix(SIGNATURE_PREFIX)?;
    hex::decode(hex_sig).ok()
}

/// Compute the HMAC-SHA256 of `payload` keyed with `secret`.
pub fn compute_signature(payload: &[u8], secret: &[u8]) -> Vec<u8> {
    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC-SHA256 accepts any key length"),
    };
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

/// Format a digest the way it appears on the wire.
pub fn format_signature_header(signature: &[u8]) -> String {
    format!("{}{}", SIGNATURE_PREFIX, hex::encode(signature))
}

/// Verify a webhook body against its signature header.
///
/// An empty `secret` means verification is not configured and every request
/// passes. Otherwise a missing or malformed header fails verification.
pub fn verify(raw_body: &[u8], provided_signature: Option<&str>, secret: &str) -> bool {
    if secret.is_empty() {
        return true;
    }

    let expected = match provided_signature.and_then(parse_signature_header) {
        Some(sig) => sig,
        None => return false,
    };

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(raw_body);

    mac.verify_slice(&expected).is_ok()
}
