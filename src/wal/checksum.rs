//! CRC32 checksums for persisted record frames
//!
//! Every frame written to a log segment carries a checksum covering its
//! length field and body. Any mismatch on read is corruption.
//!
//! Uses CRC32 (IEEE polynomial); deterministic across platforms.

use crc32fast::Hasher;

/// Computes a CRC32 checksum over the provided bytes.
pub fn compute_checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Returns whether the computed checksum of `data` matches `expected`.
pub fn verify_checksum(data: &[u8], expected: u32) -> bool {
    compute_checksum(data) == expected
}
