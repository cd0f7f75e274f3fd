//! Content index (component F): the chunk -> block-placement mapping, its
//! exact packed binary image, and the set algebra (diff, missing-content
//! synthesis, merge) that drives incremental transport.

use std::cmp::Ordering;

use crate::block_packer::pack_chunks;
use crate::block_reader::{parse_block_file_name, read_trailer};
use crate::error::{Error, Result};
use crate::ports::{EntryKind, Hasher, Storage};
use crate::util::u64_map;
use crate::version_index::VersionIndex;

/// Describes a content store: which blocks exist, and where each chunk sits
/// within its block. See [`ContentIndex::to_bytes`] for the on-disk layout.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContentIndex {
    pub block_hashes: Vec<u64>,
    pub chunk_hashes: Vec<u64>,
    pub chunk_block_indexes: Vec<u64>,
    pub chunk_block_offsets: Vec<u32>,
    pub chunk_lengths: Vec<u32>,
}

impl ContentIndex {
    pub fn block_count(&self) -> usize {
        self.block_hashes.len()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunk_count() == 0
    }

    /// `chunk-hash -> position in the per-chunk arrays`, built once and
    /// reused by callers that need repeated lookups (e.g. the materializer).
    pub fn chunk_lookup(&self) -> crate::util::U64Map<usize> {
        let mut map = u64_map();
        for (i, &h) in self.chunk_hashes.iter().enumerate() {
            map.insert(h, i);
        }
        map
    }

    pub fn validate(&self) -> Result<()> {
        let block_count = self.block_count();
        let n = self.chunk_count();
        if self.chunk_block_indexes.len() != n || self.chunk_block_offsets.len() != n || self.chunk_lengths.len() != n {
            return Err(Error::corruption("content index per-chunk arrays have mismatched lengths"));
        }
        let mut seen = u64_map::<()>();
        for &h in &self.chunk_hashes {
            if seen.insert(h, ()).is_some() {
                return Err(Error::corruption(format!("duplicate chunk hash {h:#x} in content index")));
            }
        }
        for &bi in &self.chunk_block_indexes {
            if bi as usize >= block_count {
                return Err(Error::corruption(format!("chunk references block {bi}, but only {block_count} blocks exist")));
            }
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend((self.block_count() as u64).to_le_bytes());
        buf.extend((self.chunk_count() as u64).to_le_bytes());
        for v in &self.block_hashes {
            buf.extend(v.to_le_bytes());
        }
        for v in &self.chunk_hashes {
            buf.extend(v.to_le_bytes());
        }
        for v in &self.chunk_block_indexes {
            buf.extend(v.to_le_bytes());
        }
        for v in &self.chunk_block_offsets {
            buf.extend(v.to_le_bytes());
        }
        for v in &self.chunk_lengths {
            buf.extend(v.to_le_bytes());
        }
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<ContentIndex> {
        let mut r = ByteReader::new(bytes);
        let block_count = r.u64()? as usize;
        let chunk_count = r.u64()? as usize;

        let block_hashes = r.u64_array(block_count)?;
        let chunk_hashes = r.u64_array(chunk_count)?;
        let chunk_block_indexes = r.u64_array(chunk_count)?;
        let chunk_block_offsets = r.u32_array(chunk_count)?;
        let chunk_lengths = r.u32_array(chunk_count)?;

        Ok(ContentIndex {
            block_hashes,
            chunk_hashes,
            chunk_block_indexes,
            chunk_block_offsets,
            chunk_lengths,
        })
    }

    /// Rebuilds a `ContentIndex` purely from a directory of `.lrb` files, by
    /// opening each one and reading its trailer. This is the inverse of the
    /// writer: it never reads a source tree, only the content store itself.
    pub fn rescan(storage: &dyn Storage, dir: &str) -> Result<ContentIndex> {
        let mut block_hashes = Vec::new();
        let mut chunk_hashes = Vec::new();
        let mut chunk_block_indexes = Vec::new();
        let mut chunk_block_offsets = Vec::new();
        let mut chunk_lengths = Vec::new();

        for entry in storage.list_dir(dir)? {
            if entry.kind != EntryKind::File {
                continue;
            }
            let Some(hash) = parse_block_file_name(&entry.name) else {
                continue;
            };
            let path = storage.join(dir, &entry.name);
            let (hashes, sizes) = read_trailer(storage, &path)?;

            let block_index = block_hashes.len() as u64;
            block_hashes.push(hash);

            let mut offset = 0u32;
            for (h, s) in hashes.iter().zip(sizes.iter()) {
                chunk_hashes.push(*h);
                chunk_block_indexes.push(block_index);
                chunk_block_offsets.push(offset);
                chunk_lengths.push(*s);
                offset += *s;
            }
        }

        log::debug!("content_index::rescan: found {} blocks under {dir}", block_hashes.len());

        Ok(ContentIndex {
            block_hashes,
            chunk_hashes,
            chunk_block_indexes,
            chunk_block_offsets,
            chunk_lengths,
        })
    }
}

struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.data.len() {
            return Err(Error::corruption("unexpected end of content index image"));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn u32_array(&mut self, n: usize) -> Result<Vec<u32>> {
        (0..n).map(|_| self.u32()).collect()
    }

    fn u64_array(&mut self, n: usize) -> Result<Vec<u64>> {
        (0..n).map(|_| self.u64()).collect()
    }
}

/// Builds `ContentIndex`es from raw chunk tables, enforcing the one
/// construction-time invariant the source only checked at serialization:
/// per-chunk offsets are `u32`, so `max_block_size` must fit in 32 bits.
pub struct ContentIndexBuilder {
    max_block_size: u64,
    max_chunks_per_block: usize,
}

impl ContentIndexBuilder {
    pub fn new(max_block_size: u64, max_chunks_per_block: usize) -> Self {
        assert!(
            max_block_size <= u32::MAX as u64,
            "max_block_size must fit in a u32 (per-chunk block offsets are u32): got {max_block_size}"
        );
        Self {
            max_block_size,
            max_chunks_per_block,
        }
    }

    pub fn build_from_chunks(&self, chunk_hashes: &[u64], chunk_sizes: &[u32], hasher: &dyn Hasher) -> ContentIndex {
        let blocks = pack_chunks(chunk_hashes, chunk_sizes, self.max_block_size, self.max_chunks_per_block, hasher);

        let mut block_hashes = Vec::with_capacity(blocks.len());
        let mut out_chunk_hashes = Vec::new();
        let mut chunk_block_indexes = Vec::new();
        let mut chunk_block_offsets = Vec::new();
        let mut chunk_lengths = Vec::new();

        for (block_index, block) in blocks.iter().enumerate() {
            block_hashes.push(block.hash);
            let mut offset: u32 = 0;
            for (&hash, &size) in block.chunk_hashes.iter().zip(block.chunk_sizes.iter()) {
                out_chunk_hashes.push(hash);
                chunk_block_indexes.push(block_index as u64);
                chunk_block_offsets.push(offset);
                chunk_lengths.push(size);
                offset += size;
            }
        }

        ContentIndex {
            block_hashes,
            chunk_hashes: out_chunk_hashes,
            chunk_block_indexes,
            chunk_block_offsets,
            chunk_lengths,
        }
    }

    /// `MissingContent(C_local, V_remote)`: the chunks `V_remote` names that
    /// `C_local` doesn't have yet, packed into a fresh `ContentIndex`.
    pub fn missing_content(&self, local: &ContentIndex, remote: &VersionIndex, hasher: &dyn Hasher) -> ContentIndex {
        let (added, _removed) = diff(&local.chunk_hashes, &remote.chunk_hashes);

        let mut size_of = u64_map::<u32>();
        for (&h, &s) in remote.chunk_hashes.iter().zip(remote.chunk_sizes.iter()) {
            size_of.entry(h).or_insert(s);
        }
        let sizes: Vec<u32> = added.iter().map(|h| size_of[h]).collect();

        self.build_from_chunks(&added, &sizes, hasher)
    }
}

/// `Diff(ref, new) -> (added, removed)`, both sorted and deduplicated.
pub fn diff(ref_hashes: &[u64], new_hashes: &[u64]) -> (Vec<u64>, Vec<u64>) {
    let mut r: Vec<u64> = ref_hashes.to_vec();
    r.sort_unstable();
    r.dedup();
    let mut n: Vec<u64> = new_hashes.to_vec();
    n.sort_unstable();
    n.dedup();

    let mut added = Vec::new();
    let mut removed = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < r.len() && j < n.len() {
        match r[i].cmp(&n[j]) {
            Ordering::Less => {
                removed.push(r[i]);
                i += 1;
            }
            Ordering::Greater => {
                added.push(n[j]);
                j += 1;
            }
            Ordering::Equal => {
                i += 1;
                j += 1;
            }
        }
    }
    removed.extend_from_slice(&r[i..]);
    added.extend_from_slice(&n[j..]);
    (added, removed)
}

/// `Merge(a, b) -> merged`: concatenates blocks and chunk records,
/// shifting `b`'s block indexes past `a`'s. Deliberately does not
/// deduplicate blocks shared by both sides.
pub fn merge(a: &ContentIndex, b: &ContentIndex) -> ContentIndex {
    let shift = a.block_count() as u64;

    let mut block_hashes = a.block_hashes.clone();
    block_hashes.extend_from_slice(&b.block_hashes);

    let mut chunk_hashes = a.chunk_hashes.clone();
    chunk_hashes.extend_from_slice(&b.chunk_hashes);

    let mut chunk_block_indexes = a.chunk_block_indexes.clone();
    chunk_block_indexes.extend(b.chunk_block_indexes.iter().map(|&i| i + shift));

    let mut chunk_block_offsets = a.chunk_block_offsets.clone();
    chunk_block_offsets.extend_from_slice(&b.chunk_block_offsets);

    let mut chunk_lengths = a.chunk_lengths.clone();
    chunk_lengths.extend_from_slice(&b.chunk_lengths);

    ContentIndex {
        block_hashes,
        chunk_hashes,
        chunk_block_indexes,
        chunk_block_offsets,
        chunk_lengths,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::hash_blake3::Blake3Hasher;

    #[test]
    fn diff_matches_set_difference() {
        let r = [1u64, 2, 3, 4];
        let n = [3u64, 4, 5, 6];
        let (added, removed) = diff(&r, &n);
        assert_eq!(added, vec![5, 6]);
        assert_eq!(removed, vec![1, 2]);
    }

    #[test]
    fn round_trips_through_bytes() {
        let hasher = Blake3Hasher::new();
        let builder = ContentIndexBuilder::new(1000, 100);
        let ci = builder.build_from_chunks(&[1, 2, 3], &[10, 20, 30], &hasher);
        ci.validate().unwrap();
        let bytes = ci.to_bytes();
        let back = ContentIndex::from_bytes(&bytes).unwrap();
        assert_eq!(back, ci);
    }

    #[test]
    fn merge_is_monotone_in_block_and_chunk_count() {
        let hasher = Blake3Hasher::new();
        let builder = ContentIndexBuilder::new(1000, 100);
        let a = builder.build_from_chunks(&[1, 2], &[10, 20], &hasher);
        let b = builder.build_from_chunks(&[3, 4, 5], &[10, 20, 30], &hasher);
        let merged = merge(&a, &b);
        assert_eq!(merged.block_count(), a.block_count() + b.block_count());
        assert_eq!(merged.chunk_count(), a.chunk_count() + b.chunk_count());
        for &bi in &merged.chunk_block_indexes[a.chunk_count()..] {
            assert!(bi >= a.block_count() as u64);
        }
    }

    #[test]
    #[should_panic(expected = "max_block_size must fit in a u32")]
    fn rejects_oversized_max_block_size() {
        ContentIndexBuilder::new(u32::MAX as u64 + 1, 100);
    }
}
