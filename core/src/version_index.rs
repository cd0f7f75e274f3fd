//! Version index (component D): the tree -> chunk-sequence mapping, its
//! builder (folding in component C's per-asset chunking/hashing pipeline),
//! and its exact packed binary image.

use crate::error::{Error, Result};
use crate::hashing::{hash_bytes, hash_path, truncate64};
use crate::path_set::{walk_tree, PathSet};
use crate::ports::{Chunker, Hasher, JobRunner, Storage};
use crate::util::{u64_map, U64Map};

/// An immutable, self-contained description of one version of a tree. See
/// the module-level on-disk layout in [`VersionIndex::to_bytes`].
#[derive(Clone, Debug, Default)]
pub struct VersionIndex {
    pub path_hashes: Vec<u64>,
    pub content_hashes: Vec<u64>,
    pub asset_sizes: Vec<u32>,
    pub asset_chunk_counts: Vec<u32>,
    pub asset_chunk_index_starts: Vec<u32>,
    pub asset_chunk_indexes: Vec<u32>,
    pub chunk_hashes: Vec<u64>,
    pub chunk_sizes: Vec<u32>,
    pub name_offsets: Vec<u32>,
    pub name_data: Vec<u8>,
}

impl VersionIndex {
    pub fn asset_count(&self) -> usize {
        self.path_hashes.len()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_hashes.len()
    }

    pub fn asset_chunk_index_count(&self) -> usize {
        self.asset_chunk_indexes.len()
    }

    /// The asset's path, recovered from the name pool. `NameOffsets[a]` is a
    /// start offset; the length runs to the next asset's offset, or to the
    /// end of the pool for the last asset.
    pub fn name(&self, asset: usize) -> &str {
        let start = self.name_offsets[asset] as usize;
        let end = self
            .name_offsets
            .get(asset + 1)
            .map(|&o| o as usize)
            .unwrap_or(self.name_data.len());
        std::str::from_utf8(&self.name_data[start..end]).expect("name pool is valid UTF-8 by construction")
    }

    pub fn is_dir(&self, asset: usize) -> bool {
        self.name(asset).ends_with('/')
    }

    /// Indices into `chunk_hashes`/`chunk_sizes` naming this asset's chunks
    /// in order.
    pub fn asset_chunk_indexes(&self, asset: usize) -> &[u32] {
        let start = self.asset_chunk_index_starts[asset] as usize;
        let count = self.asset_chunk_counts[asset] as usize;
        &self.asset_chunk_indexes[start..start + count]
    }

    /// Checks the invariants listed in the data model: index bounds, and
    /// that each asset's declared size agrees with the sum of its chunks.
    pub fn validate(&self) -> Result<()> {
        let chunk_count = self.chunk_count();
        let total_refs = self.asset_chunk_index_count();

        for a in 0..self.asset_count() {
            let start = self.asset_chunk_index_starts[a] as usize;
            let count = self.asset_chunk_counts[a] as usize;
            if start + count > total_refs {
                return Err(Error::corruption(format!(
                    "asset {a}: chunk range [{start}..{}) exceeds {total_refs} references",
                    start + count
                )));
            }
            let mut sum: u64 = 0;
            for &idx in &self.asset_chunk_indexes[start..start + count] {
                if idx as usize >= chunk_count {
                    return Err(Error::corruption(format!(
                        "asset {a}: chunk index {idx} out of range ({chunk_count} unique chunks)"
                    )));
                }
                sum += self.chunk_sizes[idx as usize] as u64;
            }
            if sum != self.asset_sizes[a] as u64 && !self.is_dir(a) {
                return Err(Error::corruption(format!(
                    "asset {a}: declared size {} disagrees with chunk sum {sum}",
                    self.asset_sizes[a]
                )));
            }
        }

        let mut seen = u64_map::<()>();
        for &h in &self.chunk_hashes {
            if seen.insert(h, ()).is_some() {
                return Err(Error::corruption(format!("duplicate chunk hash {h:#x} in version index")));
            }
        }

        Ok(())
    }

    /// Packs the index into its exact on-disk byte image: no header, no
    /// padding, little-endian fixed-width integers throughout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend((self.asset_count() as u32).to_le_bytes());
        buf.extend((self.chunk_count() as u32).to_le_bytes());
        buf.extend((self.asset_chunk_index_count() as u32).to_le_bytes());
        for v in &self.path_hashes {
            buf.extend(v.to_le_bytes());
        }
        for v in &self.content_hashes {
            buf.extend(v.to_le_bytes());
        }
        for v in &self.asset_sizes {
            buf.extend(v.to_le_bytes());
        }
        for v in &self.asset_chunk_counts {
            buf.extend(v.to_le_bytes());
        }
        for v in &self.asset_chunk_index_starts {
            buf.extend(v.to_le_bytes());
        }
        for v in &self.asset_chunk_indexes {
            buf.extend(v.to_le_bytes());
        }
        for v in &self.chunk_hashes {
            buf.extend(v.to_le_bytes());
        }
        for v in &self.chunk_sizes {
            buf.extend(v.to_le_bytes());
        }
        for v in &self.name_offsets {
            buf.extend(v.to_le_bytes());
        }
        buf.extend_from_slice(&self.name_data);
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<VersionIndex> {
        let mut r = ByteReader::new(bytes);
        let asset_count = r.u32()? as usize;
        let chunk_count = r.u32()? as usize;
        let asset_chunk_index_count = r.u32()? as usize;

        let path_hashes = r.u64_array(asset_count)?;
        let content_hashes = r.u64_array(asset_count)?;
        let asset_sizes = r.u32_array(asset_count)?;
        let asset_chunk_counts = r.u32_array(asset_count)?;
        let asset_chunk_index_starts = r.u32_array(asset_count)?;
        let asset_chunk_indexes = r.u32_array(asset_chunk_index_count)?;
        let chunk_hashes = r.u64_array(chunk_count)?;
        let chunk_sizes = r.u32_array(chunk_count)?;
        let name_offsets = r.u32_array(asset_count)?;
        let name_data = r.rest().to_vec();

        Ok(VersionIndex {
            path_hashes,
            content_hashes,
            asset_sizes,
            asset_chunk_counts,
            asset_chunk_index_starts,
            asset_chunk_indexes,
            chunk_hashes,
            chunk_sizes,
            name_offsets,
            name_data,
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
            return Err(Error::corruption("unexpected end of index image"));
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

    fn rest(&mut self) -> &'a [u8] {
        let slice = &self.data[self.pos..];
        self.pos = self.data.len();
        slice
    }
}

struct AssetHashResult {
    content_hash: u64,
    size: u32,
    chunk_hashes: Vec<u64>,
    chunk_sizes: Vec<u32>,
}

fn chunk_and_hash_file(
    storage: &dyn Storage,
    hasher: &dyn Hasher,
    chunker: &dyn Chunker,
    path: &str,
) -> Result<AssetHashResult> {
    let mut reader = storage.open_reader(path)?;
    let mut whole = hasher.begin();
    let mut chunk_hashes = Vec::new();
    let mut chunk_sizes = Vec::new();
    let mut total: u64 = 0;

    chunker.for_each_chunk(&mut *reader, &mut |bytes| {
        chunk_hashes.push(hash_bytes(hasher, bytes));
        chunk_sizes.push(bytes.len() as u32);
        whole.absorb(bytes);
        total += bytes.len() as u64;
        Ok(())
    })?;

    let content_hash = truncate64(whole.finalize());
    let size: u32 = total
        .try_into()
        .map_err(|_| Error::corruption(format!("file too large for a u32 size field: {path} ({total} bytes)")))?;

    Ok(AssetHashResult {
        content_hash,
        size,
        chunk_hashes,
        chunk_sizes,
    })
}

fn build_name_pool(path_set: &PathSet) -> (Vec<u32>, Vec<u8>) {
    let mut offsets = Vec::with_capacity(path_set.len());
    let mut data = Vec::new();
    for path in path_set.iter() {
        offsets.push(data.len() as u32);
        data.extend_from_slice(path.as_bytes());
    }
    (offsets, data)
}

/// Walks `root`, chunks and hashes every file (fanned out over `jobs`), and
/// folds the per-asset results into a [`VersionIndex`] whose unique chunk
/// table is built serially afterward (first occurrence wins).
pub fn build(
    storage: &dyn Storage,
    root: &str,
    hasher: &dyn Hasher,
    chunker: &dyn Chunker,
    jobs: &dyn JobRunner,
) -> Result<VersionIndex> {
    let path_set = walk_tree(storage, root)?;
    let n = path_set.len();

    log::debug!("version_index::build: walked {n} assets under {root}");

    let results: Vec<AssetHashResult> = jobs.run_indexed(n, |i| {
        if path_set.is_dir(i) {
            Ok(AssetHashResult {
                content_hash: 0,
                size: 0,
                chunk_hashes: Vec::new(),
                chunk_sizes: Vec::new(),
            })
        } else {
            let abs = storage.join(root, path_set.get(i));
            chunk_and_hash_file(storage, hasher, chunker, &abs)
        }
    })?;

    let mut table: U64Map<u32> = u64_map();
    let mut chunk_hashes_out = Vec::new();
    let mut chunk_sizes_out = Vec::new();
    let mut asset_chunk_indexes = Vec::new();
    let mut asset_chunk_counts = Vec::with_capacity(n);
    let mut asset_chunk_index_starts = Vec::with_capacity(n);
    let mut path_hashes = Vec::with_capacity(n);
    let mut content_hashes = Vec::with_capacity(n);
    let mut asset_sizes = Vec::with_capacity(n);

    for (i, result) in results.iter().enumerate() {
        path_hashes.push(hash_path(hasher, path_set.get(i)));
        content_hashes.push(result.content_hash);
        asset_sizes.push(result.size);
        asset_chunk_index_starts.push(asset_chunk_indexes.len() as u32);
        asset_chunk_counts.push(result.chunk_hashes.len() as u32);

        for (&hash, &size) in result.chunk_hashes.iter().zip(result.chunk_sizes.iter()) {
            let next_index = chunk_hashes_out.len() as u32;
            let index = *table.entry(hash).or_insert_with(|| {
                chunk_hashes_out.push(hash);
                chunk_sizes_out.push(size);
                next_index
            });
            asset_chunk_indexes.push(index);
        }
    }

    let (name_offsets, name_data) = build_name_pool(&path_set);

    log::debug!(
        "version_index::build: {n} assets, {} unique chunks",
        chunk_hashes_out.len()
    );

    Ok(VersionIndex {
        path_hashes,
        content_hashes,
        asset_sizes,
        asset_chunk_counts,
        asset_chunk_index_starts,
        asset_chunk_indexes,
        chunk_hashes: chunk_hashes_out,
        chunk_sizes: chunk_sizes_out,
        name_offsets,
        name_data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::chunker_cdc::GearCdcChunker;
    use crate::adapters::hash_blake3::Blake3Hasher;
    use crate::adapters::job_runner::InlineJobRunner;
    use crate::adapters::mem::MemStorage;
    use crate::ports::ChunkParams;

    fn fixture() -> MemStorage {
        let mem = MemStorage::new();
        mem.put_file("root/a.txt", &vec![1u8; 1000]);
        mem.put_file("root/b.txt", &vec![1u8; 1000]); // duplicate content of a.txt
        mem.put_file("root/sub/c.txt", b"hello world");
        mem.put_dir("root/empty");
        mem
    }

    #[test]
    fn round_trips_through_bytes() {
        let mem = fixture();
        let hasher = Blake3Hasher::new();
        let chunker = GearCdcChunker::new(ChunkParams { min: 16, avg: 64, max: 256 });
        let jobs = InlineJobRunner::new();

        let vi = build(&mem, "root", &hasher, &chunker, &jobs).unwrap();
        vi.validate().unwrap();

        let bytes = vi.to_bytes();
        let round_tripped = VersionIndex::from_bytes(&bytes).unwrap();
        assert_eq!(round_tripped.to_bytes(), bytes);
        round_tripped.validate().unwrap();
    }

    #[test]
    fn identical_file_contents_dedup_to_one_chunk_set() {
        let mem = fixture();
        let hasher = Blake3Hasher::new();
        let chunker = GearCdcChunker::new(ChunkParams { min: 16, avg: 64, max: 256 });
        let jobs = InlineJobRunner::new();

        let vi = build(&mem, "root", &hasher, &chunker, &jobs).unwrap();

        let a = vi.iter_asset_index_by_name("a.txt").unwrap();
        let b = vi.iter_asset_index_by_name("b.txt").unwrap();
        assert_eq!(vi.asset_chunk_indexes(a), vi.asset_chunk_indexes(b));
        assert_eq!(vi.content_hashes[a], vi.content_hashes[b]);
    }

    #[test]
    fn directories_have_no_chunks_and_zero_size() {
        let mem = fixture();
        let hasher = Blake3Hasher::new();
        let chunker = GearCdcChunker::new(ChunkParams { min: 16, avg: 64, max: 256 });
        let jobs = InlineJobRunner::new();

        let vi = build(&mem, "root", &hasher, &chunker, &jobs).unwrap();
        let empty = vi.iter_asset_index_by_name("empty/").unwrap();
        assert_eq!(vi.asset_chunk_indexes(empty).len(), 0);
        assert_eq!(vi.asset_sizes[empty], 0);
        assert!(vi.is_dir(empty));
    }

    impl VersionIndex {
        fn iter_asset_index_by_name(&self, name: &str) -> Option<usize> {
            (0..self.asset_count()).find(|&a| self.name(a) == name)
        }
    }
}
