//! Payload signatures.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const PREFIX: &str = "sha256=";

/// `sha256=<lowercase hex HMAC-SHA256(payload, secret)>`.
pub fn sign(payload: &str, secret: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload.as_bytes());
    format!("{}{}", PREFIX, hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time check of a `sha256=` signature, as a receiver would do it.
pub fn verify(payload: &str, secret: &str, signature: &str) -> bool {
    let Some(hex_digest) = signature.strip_prefix(PREFIX) else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload.as_bytes());
    mac.verify_slice(&expected).is_ok()
}
