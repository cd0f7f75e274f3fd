//! Content-defined chunking via a Gear-hash rolling fingerprint (the same
//! family of algorithm FastCDC and rsync use): a chunk boundary falls where
//! the low bits of a rolling hash are all zero, bounded below by `min` and
//! above by `max`. Deterministic given the same bytes and parameters; the
//! exact cut-point algorithm is otherwise an implementation detail.

use std::io::Read;
use std::sync::OnceLock;

use crate::error::Result;
use crate::ports::{ChunkParams, Chunker};

fn splitmix64(x: u64) -> u64 {
    let mut z = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// A fixed, deterministically-generated 256-entry table mapping byte values
/// to pseudo-random 64-bit fingerprints, built once per process.
fn gear_table() -> &'static [u64; 256] {
    static TABLE: OnceLock<[u64; 256]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut seed: u64 = 0x9E37_79B9_7F4A_7C15;
        let mut table = [0u64; 256];
        for slot in table.iter_mut() {
            seed = splitmix64(seed);
            *slot = seed;
        }
        table
    })
}

fn chunk_mask(avg: usize) -> u64 {
    let avg = (avg.max(1)) as u64;
    let bits = 63 - avg.leading_zeros() as u64;
    (1u64 << bits) - 1
}

#[derive(Clone, Copy, Debug)]
pub struct GearCdcChunker {
    params: ChunkParams,
}

impl GearCdcChunker {
    pub fn new(params: ChunkParams) -> Self {
        debug_assert!(params.min <= params.avg && params.avg <= params.max);
        debug_assert!(params.max > 0);
        Self { params }
    }
}

impl Chunker for GearCdcChunker {
    fn params(&self) -> ChunkParams {
        self.params
    }

    fn for_each_chunk(
        &self,
        reader: &mut dyn Read,
        on_chunk: &mut dyn FnMut(&[u8]) -> Result<()>,
    ) -> Result<()> {
        let ChunkParams { min, max, avg } = self.params;
        let mask = chunk_mask(avg);
        let table = gear_table();

        let mut buf = vec![0u8; max];
        let mut filled = 0usize;

        loop {
            while filled < max {
                let n = reader.read(&mut buf[filled..])?;
                if n == 0 {
                    break;
                }
                filled += n;
            }
            if filled == 0 {
                break;
            }

            let mut fingerprint: u64 = 0;
            let mut cut = filled;
            for i in 0..filled {
                fingerprint = (fingerprint << 1).wrapping_add(table[buf[i] as usize]);
                let pos = i + 1;
                if (pos >= min && (fingerprint & mask) == 0) || pos >= max {
                    cut = pos;
                    break;
                }
            }

            on_chunk(&buf[..cut])?;
            buf.copy_within(cut..filled, 0);
            filled -= cut;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn collect_chunks(params: ChunkParams, data: &[u8]) -> Vec<Vec<u8>> {
        let chunker = GearCdcChunker::new(params);
        let mut out = Vec::new();
        let mut cursor = Cursor::new(data);
        chunker
            .for_each_chunk(&mut cursor, &mut |bytes| {
                out.push(bytes.to_vec());
                Ok(())
            })
            .unwrap();
        out
    }

    #[test]
    fn reconstructs_original_bytes() {
        let params = ChunkParams { min: 16, avg: 64, max: 256 };
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let chunks = collect_chunks(params, &data);
        let joined: Vec<u8> = chunks.iter().flatten().copied().collect();
        assert_eq!(joined, data);
        for c in &chunks[..chunks.len() - 1] {
            assert!(c.len() >= params.min && c.len() <= params.max);
        }
    }

    #[test]
    fn deterministic_across_runs() {
        let params = ChunkParams { min: 16 * 1024, avg: 64 * 1024, max: 256 * 1024 };
        let data: Vec<u8> = (0..(1024 * 1024usize)).map(|i| ((i * 2654435761) % 256) as u8).collect();
        let a = collect_chunks(params, &data);
        let b = collect_chunks(params, &data);
        assert_eq!(a, b);
        assert!(a.len() > 1);
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        let params = ChunkParams { min: 16, avg: 64, max: 256 };
        assert!(collect_chunks(params, &[]).is_empty());
    }

    #[test]
    fn forces_a_cut_at_max() {
        let params = ChunkParams { min: 4, avg: 1 << 30, max: 64 };
        let data = vec![0xABu8; 200];
        let chunks = collect_chunks(params, &data);
        assert!(chunks.iter().all(|c| c.len() <= 64));
        assert_eq!(chunks.iter().map(Vec::len).sum::<usize>(), data.len());
    }
}
