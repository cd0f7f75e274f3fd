//! Version materializer (component I): writes every asset of a
//! `VersionIndex` under a destination using only blocks named by a given
//! `ContentIndex`, choosing block-major or file-major reconstruction per
//! asset to minimize block reads.

use std::collections::BTreeMap;

use crate::block_reader::{block_file_name, read_block};
use crate::content_index::ContentIndex;
use crate::error::{Error, Result};
use crate::ports::{Compressor, JobRunner, Storage};
use crate::util::U64Map;
use crate::version_index::VersionIndex;

fn parent_of_path(path: &str) -> Option<&str> {
    path.rsplit_once('/').map(|(parent, _)| parent)
}

fn block_index_for_chunk(
    version_index: &VersionIndex,
    content_index: &ContentIndex,
    chunk_pos: &U64Map<usize>,
    chunk_index: u32,
) -> Result<u64> {
    let chunk_hash = version_index.chunk_hashes[chunk_index as usize];
    chunk_pos
        .get(&chunk_hash)
        .map(|&pos| content_index.chunk_block_indexes[pos])
        .ok_or_else(|| Error::inconsistency(format!("chunk {chunk_hash:#018x} is not present in the content index")))
}

fn read_chunk_into(
    buf: &mut Vec<u8>,
    payload: &[u8],
    content_index: &ContentIndex,
    chunk_pos: &U64Map<usize>,
    chunk_hash: u64,
) -> Result<()> {
    let pos = *chunk_pos
        .get(&chunk_hash)
        .ok_or_else(|| Error::inconsistency(format!("chunk {chunk_hash:#018x} is not present in the content index")))?;
    let offset = content_index.chunk_block_offsets[pos] as usize;
    let len = content_index.chunk_lengths[pos] as usize;
    if offset + len > payload.len() {
        return Err(Error::corruption(format!(
            "chunk {chunk_hash:#018x}: range [{offset}..{}) exceeds block payload of {} bytes",
            offset + len,
            payload.len()
        )));
    }
    buf.extend_from_slice(&payload[offset..offset + len]);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_block_job(
    block_index: u64,
    assets: &[usize],
    version_index: &VersionIndex,
    content_index: &ContentIndex,
    chunk_pos: &U64Map<usize>,
    store: &dyn Storage,
    store_dir: &str,
    dest: &dyn Storage,
    dest_root: &str,
    compressor: &dyn Compressor,
) -> Result<()> {
    let block_hash = content_index.block_hashes[block_index as usize];
    let path = store.join(store_dir, &block_file_name(block_hash));
    let (payload, _chunk_hashes, _chunk_sizes) = read_block(store, compressor, &path)?;

    for &a in assets {
        let name = version_index.name(a);
        let mut buf = Vec::with_capacity(version_index.asset_sizes[a] as usize);
        for &idx in version_index.asset_chunk_indexes(a) {
            let chunk_hash = version_index.chunk_hashes[idx as usize];
            read_chunk_into(&mut buf, &payload, content_index, chunk_pos, chunk_hash)?;
        }
        dest.write_new_file(&dest.join(dest_root, name), &buf)?;
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_file_job(
    asset: usize,
    version_index: &VersionIndex,
    content_index: &ContentIndex,
    chunk_pos: &U64Map<usize>,
    store: &dyn Storage,
    store_dir: &str,
    dest: &dyn Storage,
    dest_root: &str,
    compressor: &dyn Compressor,
) -> Result<()> {
    let name = version_index.name(asset);
    let mut buf = Vec::with_capacity(version_index.asset_sizes[asset] as usize);
    let mut cached: Option<(u64, Vec<u8>)> = None;

    for &idx in version_index.asset_chunk_indexes(asset) {
        let block_index = block_index_for_chunk(version_index, content_index, chunk_pos, idx)?;
        if cached.as_ref().map(|(bi, _)| *bi) != Some(block_index) {
            let block_hash = content_index.block_hashes[block_index as usize];
            let path = store.join(store_dir, &block_file_name(block_hash));
            let (payload, _, _) = read_block(store, compressor, &path)?;
            cached = Some((block_index, payload));
        }
        let chunk_hash = version_index.chunk_hashes[idx as usize];
        let payload = &cached.as_ref().unwrap().1;
        read_chunk_into(&mut buf, payload, content_index, chunk_pos, chunk_hash)?;
    }

    dest.write_new_file(&dest.join(dest_root, name), &buf)?;
    Ok(())
}

/// Reconstructs every asset of `version_index` under `dest_root`, reading
/// blocks named by `content_index` from `store_dir`. Directories and empty
/// files are created up front and sequentially, so every block/file job
/// that follows can assume its parent directory already exists.
#[allow(clippy::too_many_arguments)]
pub fn materialize(
    version_index: &VersionIndex,
    content_index: &ContentIndex,
    store: &dyn Storage,
    store_dir: &str,
    dest: &dyn Storage,
    dest_root: &str,
    compressor: &dyn Compressor,
    jobs: &dyn JobRunner,
) -> Result<()> {
    let chunk_pos = content_index.chunk_lookup();

    let mut block_major: BTreeMap<u64, Vec<usize>> = BTreeMap::new();
    let mut file_major: Vec<usize> = Vec::new();
    let mut empties: Vec<usize> = Vec::new();

    for a in 0..version_index.asset_count() {
        let chunks = version_index.asset_chunk_indexes(a);
        if version_index.is_dir(a) || chunks.is_empty() {
            empties.push(a);
            continue;
        }

        let mut ids = Vec::with_capacity(chunks.len());
        for &idx in chunks {
            ids.push(block_index_for_chunk(version_index, content_index, &chunk_pos, idx)?);
        }
        let first = ids[0];
        if ids.iter().all(|&b| b == first) {
            block_major.entry(first).or_default().push(a);
        } else {
            file_major.push(a);
        }
    }

    log::info!(
        "materializer: {} empties, {} block-major groups, {} file-major assets",
        empties.len(),
        block_major.len(),
        file_major.len()
    );

    for &a in &empties {
        let name = version_index.name(a);
        if version_index.is_dir(a) {
            dest.create_dir_all(&dest.join(dest_root, name.trim_end_matches('/')))?;
        } else {
            if let Some(parent) = parent_of_path(name) {
                dest.create_dir_all(&dest.join(dest_root, parent))?;
            }
            dest.write_new_file(&dest.join(dest_root, name), &[])?;
        }
    }

    let block_jobs: Vec<(u64, Vec<usize>)> = block_major.into_iter().collect();
    jobs.run_indexed(block_jobs.len(), |i| {
        let (block_index, assets) = &block_jobs[i];
        run_block_job(
            *block_index,
            assets,
            version_index,
            content_index,
            &chunk_pos,
            store,
            store_dir,
            dest,
            dest_root,
            compressor,
        )
    })?;

    jobs.run_indexed(file_major.len(), |i| {
        run_file_job(
            file_major[i],
            version_index,
            content_index,
            &chunk_pos,
            store,
            store_dir,
            dest,
            dest_root,
            compressor,
        )
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
    use crate::block_writer::write_blocks;
    use crate::content_index::ContentIndexBuilder;
    use crate::ports::ChunkParams;
    use crate::version_index;

    #[test]
    fn materialized_tree_byte_equals_source() {
        let source = MemStorage::new();
        source.put_file("root/a.txt", &vec![3u8; 300]);
        source.put_file("root/sub/b.txt", b"nested file contents");
        source.put_dir("root/empty");

        let hasher = Blake3Hasher::new();
        let chunker = GearCdcChunker::new(ChunkParams { min: 16, avg: 32, max: 64 });
        let jobs = InlineJobRunner::new();
        let compressor = StoreCompressor;

        let vi = version_index::build(&source, "root", &hasher, &chunker, &jobs).unwrap();
        let ci = ContentIndexBuilder::new(1_000_000, 4096).build_from_chunks(&vi.chunk_hashes, &vi.chunk_sizes, &hasher);

        let store = MemStorage::new();
        store.put_dir("chunks");
        write_blocks(&source, "root", &store, "chunks", &vi, &ci, &compressor, &jobs).unwrap();

        let dest = MemStorage::new();
        dest.put_dir("out");
        materialize(&vi, &ci, &store, "chunks", &dest, "out", &compressor, &jobs).unwrap();

        assert_eq!(dest.read_range("out/a.txt", 0, 300).unwrap(), vec![3u8; 300]);
        assert_eq!(
            dest.read_range("out/sub/b.txt", 0, "nested file contents".len() as u64).unwrap(),
            b"nested file contents"
        );
        assert!(dest.kind("out/empty").unwrap().is_some());
    }
}
