//! BLAKE3-backed [`Hasher`]. The core only needs a 128-bit hash; BLAKE3's
//! native 32-byte output is truncated to its first 16 bytes before the core
//! truncates again to 64 bits (see [`crate::hashing::truncate64`]).

use crate::ports::{HashState, Hasher};

#[derive(Clone, Copy, Default)]
pub struct Blake3Hasher;

impl Blake3Hasher {
    pub fn new() -> Self {
        Self
    }
}

struct Blake3State(blake3::Hasher);

impl HashState for Blake3State {
    fn absorb(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }

    fn finalize(self: Box<Self>) -> [u8; 16] {
        let full = self.0.finalize();
        let mut out = [0u8; 16];
        out.copy_from_slice(&full.as_bytes()[..16]);
        out
    }
}

impl Hasher for Blake3Hasher {
    fn begin(&self) -> Box<dyn HashState> {
        Box::new(Blake3State(blake3::Hasher::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::hash_bytes;

    #[test]
    fn deterministic_across_calls() {
        let h = Blake3Hasher::new();
        assert_eq!(hash_bytes(&h, b"hello"), hash_bytes(&h, b"hello"));
        assert_ne!(hash_bytes(&h, b"hello"), hash_bytes(&h, b"world"));
    }

    #[test]
    fn incremental_matches_whole_buffer() {
        let h = Blake3Hasher::new();
        let mut st = h.begin();
        st.absorb(b"hel");
        st.absorb(b"lo");
        let incremental = crate::hashing::truncate64(st.finalize());
        assert_eq!(incremental, hash_bytes(&h, b"hello"));
    }
}
