//! Block packer (component E): first-fit, single-pass grouping of a
//! version's unique chunks into size/count-bounded blocks, with a stable
//! block-hash derived from block contents.

use crate::hashing::hash_bytes;
use crate::ports::Hasher;

/// One sealed block: its identity hash and the chunks it contains, in the
/// order they were packed.
#[derive(Clone, Debug)]
pub struct PackedBlock {
    pub hash: u64,
    pub chunk_hashes: Vec<u64>,
    pub chunk_sizes: Vec<u32>,
}

impl PackedBlock {
    pub fn chunk_count(&self) -> usize {
        self.chunk_hashes.len()
    }

    pub fn total_size(&self) -> u64 {
        self.chunk_sizes.iter().map(|&s| s as u64).sum()
    }
}

struct Accumulator {
    chunk_hashes: Vec<u64>,
    chunk_sizes: Vec<u32>,
    total_size: u64,
}

impl Accumulator {
    fn new() -> Self {
        Self {
            chunk_hashes: Vec::new(),
            chunk_sizes: Vec::new(),
            total_size: 0,
        }
    }

    fn push(&mut self, hash: u64, size: u32) {
        self.chunk_hashes.push(hash);
        self.chunk_sizes.push(size);
        self.total_size += size as u64;
    }

    fn fits(&self, size: u32, max_chunks_per_block: usize, size_threshold: u64) -> bool {
        self.chunk_hashes.len() + 1 <= max_chunks_per_block && self.total_size + size as u64 <= size_threshold
    }
}

/// Hashes `[chunk_hashes, chunk_sizes, N]` (N as a little-endian u32) and
/// truncates to 64 bits, giving the block its identity.
fn seal(acc: Accumulator, hasher: &dyn Hasher) -> PackedBlock {
    let n = acc.chunk_hashes.len() as u32;
    let mut buf = Vec::with_capacity(acc.chunk_hashes.len() * 8 + acc.chunk_sizes.len() * 4 + 4);
    for h in &acc.chunk_hashes {
        buf.extend_from_slice(&h.to_le_bytes());
    }
    for s in &acc.chunk_sizes {
        buf.extend_from_slice(&s.to_le_bytes());
    }
    buf.extend_from_slice(&n.to_le_bytes());
    let hash = hash_bytes(hasher, &buf);
    PackedBlock {
        hash,
        chunk_hashes: acc.chunk_hashes,
        chunk_sizes: acc.chunk_sizes,
    }
}

/// Packs `chunk_hashes`/`chunk_sizes` (already in the version's chunk-table
/// order — never reordered, to keep output deterministic) into blocks
/// bounded by `max_block_size` (with a 10% overshoot tolerance) and
/// `max_chunks_per_block`.
///
/// The accumulator for the block under construction is an `Option`, taken
/// and replaced at the single call site that seals a block, so there is no
/// separate boolean flag that could desynchronize from the accumulator's
/// actual contents: the final partial block is sealed exactly once, by the
/// same code path as every other block.
pub fn pack_chunks(
    chunk_hashes: &[u64],
    chunk_sizes: &[u32],
    max_block_size: u64,
    max_chunks_per_block: usize,
    hasher: &dyn Hasher,
) -> Vec<PackedBlock> {
    assert_eq!(chunk_hashes.len(), chunk_sizes.len());
    let size_threshold = (max_block_size.saturating_mul(11)) / 10;

    let mut blocks = Vec::new();
    let mut current: Option<Accumulator> = None;

    for (&hash, &size) in chunk_hashes.iter().zip(chunk_sizes.iter()) {
        let fits = match &current {
            None => true,
            Some(acc) => acc.fits(size, max_chunks_per_block, size_threshold),
        };
        if !fits {
            blocks.push(seal(current.take().expect("sealed only when non-empty"), hasher));
        }
        current.get_or_insert_with(Accumulator::new).push(hash, size);
    }

    if let Some(acc) = current.take() {
        blocks.push(seal(acc, hasher));
    }

    log::debug!(
        "block_packer: packed {} chunks into {} blocks (max_block_size={max_block_size}, max_chunks_per_block={max_chunks_per_block})",
        chunk_hashes.len(),
        blocks.len()
    );

    blocks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::hash_blake3::Blake3Hasher;
    use crate::content_index::ContentIndexBuilder;

    #[test]
    fn five_file_two_block_scenario() {
        // Chunk identities 5,4,3,2,1 (arbitrary stand-ins for content hashes),
        // sized so the first three fill one block and the last two spill
        // into a second under a 131072-byte block cap.
        let hashes = [5u64, 4, 3, 2, 1];
        let sizes = [43593u32, 43593, 43592, 43591, 43591];
        let hasher = Blake3Hasher::new();

        let blocks = pack_chunks(&hashes, &sizes, 131072, 4096, &hasher);

        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].chunk_hashes, vec![5, 4, 3]);
        assert_eq!(blocks[1].chunk_hashes, vec![2, 1]);
        assert_eq!(blocks[0].total_size(), 43593 + 43593 + 43592);
        assert_eq!(blocks[1].total_size(), 43591 + 43591);

        // The content index's block-offsets are the prefix sums within each
        // block, starting at 0 — §8's "block invariants" property, checked
        // against the fixture's exact placements.
        let ci = ContentIndexBuilder::new(131072, 4096).build_from_chunks(&hashes, &sizes, &hasher);
        assert_eq!(ci.chunk_hashes, vec![5, 4, 3, 2, 1]);
        assert_eq!(ci.chunk_block_indexes, vec![0, 0, 0, 1, 1]);
        assert_eq!(ci.chunk_block_offsets, vec![0, 43593, 87186, 0, 43591]);
    }

    #[test]
    fn identical_input_yields_identical_block_hashes() {
        let hashes = [1u64, 2, 3];
        let sizes = [10u32, 20, 30];
        let hasher = Blake3Hasher::new();
        let a = pack_chunks(&hashes, &sizes, 1000, 100, &hasher);
        let b = pack_chunks(&hashes, &sizes, 1000, 100, &hasher);
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].hash, b[0].hash);
    }

    #[test]
    fn respects_max_chunks_per_block() {
        let hashes: Vec<u64> = (0..10).collect();
        let sizes = vec![1u32; 10];
        let hasher = Blake3Hasher::new();
        let blocks = pack_chunks(&hashes, &sizes, 1_000_000, 3, &hasher);
        assert_eq!(blocks.len(), 4); // 3 + 3 + 3 + 1
        for b in &blocks[..3] {
            assert_eq!(b.chunk_count(), 3);
        }
        assert_eq!(blocks[3].chunk_count(), 1);
    }

    #[test]
    fn empty_input_yields_no_blocks() {
        let hasher = Blake3Hasher::new();
        assert!(pack_chunks(&[], &[], 1000, 100, &hasher).is_empty());
    }
}
