//! Helpers shared by every component that needs to turn a [`Hasher`] into a
//! concrete 64-bit identity.

use crate::ports::Hasher;

/// The core treats a finalized 128-bit hash as opaque 64 bits, taken as the
/// little-endian value of its first 8 bytes.
pub fn truncate64(h: [u8; 16]) -> u64 {
    u64::from_le_bytes(h[..8].try_into().expect("16-byte array has an 8-byte prefix"))
}

/// Hash a single buffer to a 64-bit identity in one call.
pub fn hash_bytes(hasher: &dyn Hasher, bytes: &[u8]) -> u64 {
    let mut state = hasher.begin();
    state.absorb(bytes);
    truncate64(state.finalize())
}

/// Hash of a path string, used as an asset's path-hash.
pub fn hash_path(hasher: &dyn Hasher, path: &str) -> u64 {
    hash_bytes(hasher, path.as_bytes())
}
