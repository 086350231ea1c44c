//! Content addressing. The spec's externally-visible content hash is SHA-256;
//! BLAKE3 is kept only for naming in-flight chunk scratch files, which are never
//! persisted to `files.content_hash` or returned over the API.

use sha2::{Digest, Sha256};

/// SHA-256 hex digest of `content`, the value stored in `files.content_hash` and
/// `file_versions.content_hash`.
pub fn compute_content_hash(content: &[u8]) -> String {
    let digest = Sha256::digest(content);
    hex::encode(digest)
}

pub fn verify_content_hash(content: &[u8], expected_hash: &str) -> bool {
    compute_content_hash(content) == expected_hash
}

/// BLAKE3 hex digest used solely to derive a scratch object key for an in-flight
/// chunked upload (`pipeline::chunked`), so concurrent uploads to the same
/// target path never collide on disk before the upload completes.
pub fn compute_scratch_key(upload_id: &uuid::Uuid, chunk_index: i32) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(upload_id.as_bytes());
    hasher.update(&chunk_index.to_le_bytes());
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_matches_known_vector() {
        let hash = compute_content_hash(b"hello world");
        assert_eq!(
            hash,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde"
        );
    }

    #[test]
    fn verify_detects_mismatch() {
        assert!(verify_content_hash(b"hello world", &compute_content_hash(b"hello world")));
        assert!(!verify_content_hash(b"hello world", "deadbeef"));
    }

    #[test]
    fn scratch_keys_differ_by_chunk_index() {
        let id = uuid::Uuid::new_v4();
        assert_ne!(compute_scratch_key(&id, 0), compute_scratch_key(&id, 1));
    }
}
