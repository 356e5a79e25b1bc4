//! Layer cache key derivation
//!
//! A layer digest is a SHA256 over the canonical-ordered (path, content
//! hash) pairs of its entries. Timestamps and absolute paths never enter
//! the hash, so the digest is reproducible across machines.

use crate::classify::FileEntry;
use sha2::{Digest, Sha256};

/// Number of hex characters used for display-shortened digests
const SHORT_DIGEST_LEN: usize = 12;

/// Compute the content digest for a layer's entries.
///
/// Entries must already be in canonical (path-sorted) order; the digest
/// is over `path NUL content_hash NUL` frames so that no two distinct
/// entry sets can collide by concatenation.
pub fn layer_digest(entries: &[FileEntry]) -> String {
    let mut hasher = Sha256::new();
    for entry in entries {
        hasher.update(entry.path.as_bytes());
        hasher.update([0u8]);
        hasher.update(entry.content_hash.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

/// Shorten a digest for display and tags
pub fn short_digest(digest: &str) -> &str {
    &digest[..SHORT_DIGEST_LEN.min(digest.len())]
}
