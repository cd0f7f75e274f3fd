//! Compression adapters: a real zstd codec and a pass-through "store" codec
//! used in tests and for already-incompressible content.

use crate::error::{Error, Result};
use crate::ports::Compressor;

#[derive(Clone, Copy, Debug)]
pub struct ZstdCompressor {
    pub level: i32,
}

impl Default for ZstdCompressor {
    fn default() -> Self {
        Self { level: 3 }
    }
}

impl ZstdCompressor {
    pub fn new(level: i32) -> Self {
        Self { level }
    }
}

impl Compressor for ZstdCompressor {
    fn max_compressed_len(&self, src_len: usize) -> usize {
        zstd::zstd_safe::compress_bound(src_len)
    }

    fn compress(&self, src: &[u8]) -> Result<Vec<u8>> {
        zstd::bulk::compress(src, self.level)
            .map_err(|e| Error::corruption(format!("zstd compress failed: {e}")))
    }

    fn decompress(&self, src: &[u8], expected_len: usize) -> Result<Vec<u8>> {
        let out = zstd::bulk::decompress(src, expected_len)
            .map_err(|e| Error::corruption(format!("zstd decompress failed: {e}")))?;
        if out.len() != expected_len {
            return Err(Error::corruption(format!(
                "zstd decompressed length mismatch: got {}, expected {expected_len}",
                out.len()
            )));
        }
        Ok(out)
    }
}

/// Identity codec: copies bytes through unchanged. Useful in tests and for
/// content a caller has already determined isn't worth compressing.
#[derive(Clone, Copy, Default)]
pub struct StoreCompressor;

impl Compressor for StoreCompressor {
    fn max_compressed_len(&self, src_len: usize) -> usize {
        src_len
    }

    fn compress(&self, src: &[u8]) -> Result<Vec<u8>> {
        Ok(src.to_vec())
    }

    fn decompress(&self, src: &[u8], expected_len: usize) -> Result<Vec<u8>> {
        if src.len() != expected_len {
            return Err(Error::corruption(format!(
                "store decompressed length mismatch: got {}, expected {expected_len}",
                src.len()
            )));
        }
        Ok(src.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zstd_round_trips() {
        let c = ZstdCompressor::default();
        let data = b"the quick brown fox jumps over the lazy dog".repeat(100);
        let compressed = c.compress(&data).unwrap();
        let decompressed = c.decompress(&compressed, data.len()).unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn store_round_trips() {
        let c = StoreCompressor;
        let data = b"hello world".to_vec();
        let compressed = c.compress(&data).unwrap();
        assert_eq!(compressed, data);
        let decompressed = c.decompress(&compressed, data.len()).unwrap();
        assert_eq!(decompressed, data);
    }
}
