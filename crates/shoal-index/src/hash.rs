//! Deterministic content hashes.
//!
//! Suggestion documents are keyed by a digest of their key, and queued
//! server-side writes are sharded by a digest of the document id. Both use
//! SipHash-2-4 with zero keys so results are stable across processes.

use siphasher::{sip::SipHasher24, sip128::SipHasher24 as SipHasher24x128};

/// Returns the 128-bit digest of `key` as 32 lowercase hex characters.
pub fn content_id(key: &str) -> String {
    let digest = SipHasher24x128::new().hash(key.as_bytes()).as_u128();
    format!("{digest:032x}")
}

/// Picks a shard in `0..shards` for `key`. Zero shards map to shard 0.
pub fn shard_for(key: &str, shards: usize) -> usize {
    if shards == 0 {
        return 0;
    }
    let digest = SipHasher24::new().hash(key.as_bytes());
    (digest % shards as u64) as usize
}
