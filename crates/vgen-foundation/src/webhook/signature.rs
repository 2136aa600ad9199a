//! HMAC-SHA256 webhook signatures.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Prefix some providers put in front of the hex digest
pub const SIGNATURE_PREFIX: &str = "sha256=";

fn digest(secret: &str, body: &[u8]) -> Vec<u8> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body);
    mac.finalize().into_bytes().to_vec()
}

/// Hex HMAC-SHA256 of `body`, as a provider would send it.
pub fn sign_payload(secret: &str, body: &[u8]) -> String {
    hex::encode(digest(secret, body))
}

/// Check a signature header value against the raw body.
///
/// Accepts a bare hex digest or one prefixed with `sha256=`. The digest
/// comparison is constant-time.
pub fn verify_signature(secret: &str, body: &[u8], header_value: &str) -> bool {
    let candidate = header_value.trim();
    let candidate = candidate.strip_prefix(SIGNATURE_PREFIX).unwrap_or(candidate);
    let Ok(provided) = hex::decode(candidate) else {
        return false;
    };
    digest(secret, body).ct_eq(&provided).into()
}
