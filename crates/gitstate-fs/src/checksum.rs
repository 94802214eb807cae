//! SHA-256 digest utilities
//!
//! Every digest in gitstate uses the canonical `sha256:<hex>` form, whether it
//! fingerprints a configuration or guards the state document side-file.

use sha2::{Digest, Sha256};

/// Prefix for all digests produced by this module
const PREFIX: &str = "sha256:";

/// Compute the digest of raw bytes.
pub fn content_digest(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{}{:x}", PREFIX, hasher.finalize())
}

/// Strip the `sha256:` prefix, returning the bare hex string.
pub fn digest_hex(digest: &str) -> &str {
    digest.strip_prefix(PREFIX).unwrap_or(digest)
}
