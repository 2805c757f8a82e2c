//! HMAC signature verification for status callbacks.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

/// Compute the lower-case hex HMAC-SHA-256 of a request body.
#[must_use]
pub fn compute_signature(body: &str, secret: &str) -> String {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return String::new();
    };
    mac.update(body.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a callback signature against the raw request body.
///
/// The received value is the lower-case hex digest; comparison happens in
/// constant time on the decoded bytes. Returns `false` when the signature
/// or secret is absent — the caller decides whether absence means skip.
#[must_use]
pub fn verify_signature(body: &str, secret: &str, signature: Option<&str>) -> bool {
    let Some(signature) = signature.map(str::trim).filter(|s| !s.is_empty()) else {
        return false;
    };
    if secret.is_empty() {
        return false;
    }

    let Ok(received) = hex::decode(signature.to_lowercase()) else {
        warn!("signature is not valid hex");
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body.as_bytes());

    let matched = mac.verify_slice(&received).is_ok();
    if !matched {
        warn!(body_length = body.len(), "signature mismatch");
    }
    matched
}
