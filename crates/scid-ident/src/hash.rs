use md5::Md5;
use sha2::{Digest, Sha256};

use scid_core::constants::{ARTIST_HASH_LENGTH, CHECKSUM_LENGTH};

/// SHA-256 of arbitrary bytes → 32-byte array.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Four uppercase hex chars of SHA-256 over the lowercased identifier
/// (wallet address or profile id).
///
/// Only 16 bits: unrelated artists can share a hash, which is why sequence
/// counters are scoped by `(artist_hash, year)` and never by artist.
pub fn artist_hash(identifier: &str) -> String {
    let digest = sha256(identifier.to_lowercase().as_bytes());
    hex::encode_upper(digest)[..ARTIST_HASH_LENGTH].to_string()
}

/// Four uppercase hex chars of MD5 over the SCid. Typo detection only.
pub fn md5_prefix(data: &str) -> String {
    let digest = Md5::digest(data.as_bytes());
    hex::encode_upper(digest)[..CHECKSUM_LENGTH].to_string()
}
