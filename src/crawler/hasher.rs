//! Content fingerprints for change detection

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use sha2::{Digest, Sha256};

/// Length of every string returned by [`content_hash`]
pub const CONTENT_HASH_LEN: usize = 44;

/// Fingerprints a fetched body
///
/// SHA-256 of the raw bytes, encoded as padded URL-safe base64. The result
/// is only compared for equality against the stored hash.
pub fn content_hash(body: &[u8]) -> String {
    URL_SAFE.encode(Sha256::digest(body))
}
