//! Small shared helpers: an identity `BuildHasher` for the `u64`-keyed maps
//! this crate builds repeatedly (chunk-hash -> index, chunk-hash -> block,
//! ...). The keys are already strong 64-bit hashes, so re-hashing them with
//! SipHash buys nothing; this just widens the key to `u64` via `NoHashHasher`-
//! style pass-through.

use std::collections::HashMap;
use std::hash::{BuildHasherDefault, Hasher as StdHasher};

#[derive(Default)]
pub struct IdentityHasher(u64);

impl StdHasher for IdentityHasher {
    fn finish(&self) -> u64 {
        self.0
    }

    fn write(&mut self, bytes: &[u8]) {
        // Only ever called with u64 keys in this crate; fold the bytes in
        // rather than panicking, so misuse degrades instead of aborting.
        let mut buf = [0u8; 8];
        let n = bytes.len().min(8);
        buf[..n].copy_from_slice(&bytes[..n]);
        self.0 = u64::from_le_bytes(buf);
    }

    fn write_u64(&mut self, i: u64) {
        self.0 = i;
    }
}

pub type IdentityBuildHasher = BuildHasherDefault<IdentityHasher>;

/// A `HashMap<u64, V>` keyed by values that are already strong hashes.
pub type U64Map<V> = HashMap<u64, V, IdentityBuildHasher>;

pub fn u64_map<V>() -> U64Map<V> {
    U64Map::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_u64_keys() {
        let mut m: U64Map<&str> = u64_map();
        m.insert(42, "a");
        m.insert(0xDEAD_BEEF, "b");
        assert_eq!(m.get(&42), Some(&"a"));
        assert_eq!(m.get(&0xDEAD_BEEF), Some(&"b"));
        assert_eq!(m.get(&1), None);
    }
}
