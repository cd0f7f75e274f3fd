//! Block writer (component G): reads a version's chunks out of a source
//! tree, assembles and compresses each block's payload, frames it per the
//! on-disk layout, and durably lands it via `write tmp -> rename`.

use crate::block_reader::{block_file_name, block_tmp_name};
use crate::content_index::ContentIndex;
use crate::error::{Error, Result};
use crate::ports::{Compressor, JobRunner, Storage};
use crate::util::{u64_map, U64Map};
use crate::version_index::VersionIndex;

/// `chunk-hash -> (asset path, offset within that asset)`, built once from
/// a `VersionIndex` by walking every asset's chunk list and keeping the
/// first asset in which a chunk appears. This is how the writer locates a
/// chunk's bytes in the source tree without re-deriving it per block.
pub fn asset_part_lookup(vi: &VersionIndex) -> U64Map<(String, u64)> {
    let mut map = u64_map();
    for a in 0..vi.asset_count() {
        if vi.is_dir(a) {
            continue;
        }
        let mut offset: u64 = 0;
        for &idx in vi.asset_chunk_indexes(a) {
            let hash = vi.chunk_hashes[idx as usize];
            let size = vi.chunk_sizes[idx as usize];
            map.entry(hash).or_insert_with(|| (vi.name(a).to_string(), offset));
            offset += size as u64;
        }
    }
    map
}

/// Positions (into the content index's flat per-chunk arrays) of the chunks
/// belonging to each block, sorted by each chunk's offset within the block.
fn group_by_block(ci: &ContentIndex) -> Vec<Vec<usize>> {
    let mut groups: Vec<Vec<usize>> = vec![Vec::new(); ci.block_count()];
    for i in 0..ci.chunk_count() {
        groups[ci.chunk_block_indexes[i] as usize].push(i);
    }
    for g in &mut groups {
        g.sort_by_key(|&i| ci.chunk_block_offsets[i]);
    }
    groups
}

fn frame_block(
    payload: &[u8],
    compressed: &[u8],
    chunk_hashes: &[u64],
    chunk_lengths: &[u32],
    max_compressed_len: usize,
) -> Vec<u8> {
    let mut frame = Vec::with_capacity(8 + max_compressed_len + 16 + chunk_hashes.len() * 12 + 4);
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(&(compressed.len() as u32).to_le_bytes());
    frame.extend_from_slice(compressed);

    let pad = (16 - (frame.len() % 16)) % 16;
    frame.extend(std::iter::repeat(0u8).take(pad));

    for h in chunk_hashes {
        frame.extend_from_slice(&h.to_le_bytes());
    }
    for l in chunk_lengths {
        frame.extend_from_slice(&l.to_le_bytes());
    }
    frame.extend_from_slice(&(chunk_hashes.len() as u32).to_le_bytes());
    frame
}

/// Writes every block named by `content_index`, in parallel over `jobs`.
/// A block whose final file already exists is left untouched and counted
/// as a success (blocks are immutable once named).
pub fn write_blocks(
    source: &dyn Storage,
    source_root: &str,
    store: &dyn Storage,
    store_dir: &str,
    version_index: &VersionIndex,
    content_index: &ContentIndex,
    compressor: &dyn Compressor,
    jobs: &dyn JobRunner,
) -> Result<()> {
    let lookup = asset_part_lookup(version_index);
    let groups = group_by_block(content_index);

    jobs.run_indexed(content_index.block_count(), |b| {
        let hash = content_index.block_hashes[b];
        let final_name = block_file_name(hash);
        let final_path = store.join(store_dir, &final_name);

        if store.exists(&final_path)? {
            log::debug!("block_writer: {final_name} already exists, skipping");
            return Ok(());
        }

        let positions = &groups[b];
        let mut payload = Vec::new();
        let mut chunk_hashes = Vec::with_capacity(positions.len());
        let mut chunk_lengths = Vec::with_capacity(positions.len());

        for &i in positions {
            let chunk_hash = content_index.chunk_hashes[i];
            let len = content_index.chunk_lengths[i];
            let (asset_path, offset) = lookup
                .get(&chunk_hash)
                .ok_or_else(|| Error::inconsistency(format!("chunk {chunk_hash:#018x} has no known source location")))?;
            let abs = source.join(source_root, asset_path);
            let bytes = source.read_range(&abs, *offset, len as u64)?;
            payload.extend_from_slice(&bytes);
            chunk_hashes.push(chunk_hash);
            chunk_lengths.push(len);
        }

        let max_compressed_len = compressor.max_compressed_len(payload.len());
        let compressed = compressor.compress(&payload)?;
        let frame = frame_block(&payload, &compressed, &chunk_hashes, &chunk_lengths, max_compressed_len);

        let tmp_name = block_tmp_name(hash);
        let tmp_path = store.join(store_dir, &tmp_name);
        store.write_new_file(&tmp_path, &frame)?;
        store.rename(&tmp_path, &final_path)?;

        log::debug!(
            "block_writer: wrote {final_name} ({} chunks, {} bytes payload, {} bytes compressed)",
            positions.len(),
            payload.len(),
            compressed.len()
        );
        Ok(())
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::chunker_cdc::GearCdcChunker;
    use crate::adapters::compressor_zstd::StoreCompressor;
    use crate::adapters::hash_blake3::Blake3Hasher;
    use crate::adapters::job_runner::InlineJobRunner;
    use crate::adapters::mem::MemStorage;
    use crate::block_reader::read_block;
    use crate::content_index::ContentIndexBuilder;
    use crate::ports::ChunkParams;
    use crate::version_index;

    #[test]
    fn writes_blocks_readable_back_to_original_bytes() {
        let source = MemStorage::new();
        source.put_file("root/a.txt", &vec![7u8; 500]);
        source.put_file("root/b.txt", b"hello world, this is b");

        let hasher = Blake3Hasher::new();
        let chunker = GearCdcChunker::new(ChunkParams { min: 16, avg: 64, max: 256 });
        let jobs = InlineJobRunner::new();
        let compressor = StoreCompressor;

        let vi = version_index::build(&source, "root", &hasher, &chunker, &jobs).unwrap();
        let ci = ContentIndexBuilder::new(1_000_000, 4096).build_from_chunks(&vi.chunk_hashes, &vi.chunk_sizes, &hasher);

        let store = MemStorage::new();
        store.put_dir("chunks");
        write_blocks(&source, "root", &store, "chunks", &vi, &ci, &compressor, &jobs).unwrap();

        assert_eq!(store.list_dir("chunks").unwrap().len(), ci.block_count());

        for b in 0..ci.block_count() {
            let name = block_file_name(ci.block_hashes[b]);
            let path = store.join("chunks", &name);
            let (payload, chunk_hashes, chunk_sizes) = read_block(&store, &compressor, &path).unwrap();
            let expected_len: u64 = chunk_sizes.iter().map(|&s| s as u64).sum();
            assert_eq!(payload.len() as u64, expected_len);
            assert!(!chunk_hashes.is_empty());
        }
    }

    #[test]
    fn existing_block_file_is_left_untouched() {
        let source = MemStorage::new();
        source.put_file("root/a.txt", b"some bytes");
        let hasher = Blake3Hasher::new();
        let chunker = GearCdcChunker::new(ChunkParams { min: 4, avg: 8, max: 16 });
        let jobs = InlineJobRunner::new();
        let compressor = StoreCompressor;

        let vi = version_index::build(&source, "root", &hasher, &chunker, &jobs).unwrap();
        let ci = ContentIndexBuilder::new(1000, 100).build_from_chunks(&vi.chunk_hashes, &vi.chunk_sizes, &hasher);

        let store = MemStorage::new();
        store.put_dir("chunks");
        let sentinel_name = block_file_name(ci.block_hashes[0]);
        let sentinel_path = store.join("chunks", &sentinel_name);
        store.write_new_file(&sentinel_path, b"not a real block").unwrap();

        write_blocks(&source, "root", &store, "chunks", &vi, &ci, &compressor, &jobs).unwrap();
        assert_eq!(store.read_range(&sentinel_path, 0, 16).unwrap(), b"not a real block");
    }
}
