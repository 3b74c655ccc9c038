//! SHA-256 content addressing helpers.

use sha2::{Digest, Sha256};

/// Lowercase hex digest of `bytes`, with no `sha256:` scheme prefix.
#[must_use]
pub fn hex_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// The wire form used in property values and the attachment reference type.
#[must_use]
pub fn qualified(hex_digest: &str) -> String {
    format!("sha256:{hex_digest}")
}

/// Strips the `sha256:` scheme prefix, if present.
#[must_use]
pub fn bare(hash: &str) -> &str {
    hash.strip_prefix("sha256:").unwrap_or(hash)
}
