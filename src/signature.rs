use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header Gitea puts the hex HMAC-SHA256 of the body in.
pub const SIGNATURE_HEADER: &str = "X-Gitea-Signature";
/// GitHub-style header Gitea also sends, as `sha256=<hex>`.
pub const FALLBACK_SIGNATURE_HEADER: &str = "X-Hub-Signature-256";

/// Verifies a webhook signature using constant-time comparison.
///
/// The header is the hex-encoded HMAC-SHA256 of the raw request body keyed
/// with the shared secret. A leading `sha256=` is tolerated.
pub fn verify(secret: &str, body: &[u8], signature_header: &str) -> bool {
    let hex_sig = signature_header.trim();
    let hex_sig = hex_sig.strip_prefix("sha256=").unwrap_or(hex_sig);

    let Ok(expected) = hex::decode(hex_sig) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };

    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Hex signature for `body`, in the form Gitea sends it.
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any length"));
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}
