use std::path::PathBuf;

use siltpack_core::adapters::chunker_cdc::GearCdcChunker;
use siltpack_core::adapters::compressor_zstd::ZstdCompressor;
use siltpack_core::adapters::fs::FsStorage;
use siltpack_core::adapters::hash_blake3::Blake3Hasher;
use siltpack_core::adapters::job_runner::RayonJobRunner;
use siltpack_core::block_reader;
use siltpack_core::content_index::{ContentIndex, ContentIndexBuilder};
use siltpack_core::materializer;
use siltpack_core::ports::{ChunkParams, Storage};
use siltpack_core::version_diff;
use siltpack_core::version_index::{self, VersionIndex};
use siltpack_core::Result;

fn path_str(p: &PathBuf) -> String {
    p.to_string_lossy().into_owned()
}

fn read_version_index(path: &PathBuf) -> Result<VersionIndex> {
    VersionIndex::from_bytes(&std::fs::read(path)?)
}

fn read_content_index(path: &PathBuf) -> Result<ContentIndex> {
    ContentIndex::from_bytes(&std::fs::read(path)?)
}

pub fn handle_index(root: PathBuf, out: PathBuf, chunk_min: usize, chunk_avg: usize, chunk_max: usize) -> Result<()> {
    let storage = FsStorage::new();
    let hasher = Blake3Hasher::new();
    let chunker = GearCdcChunker::new(ChunkParams { min: chunk_min, avg: chunk_avg, max: chunk_max });
    let jobs = RayonJobRunner::new();

    let vi = version_index::build(&storage, &path_str(&root), &hasher, &chunker, &jobs)?;
    std::fs::write(&out, vi.to_bytes())?;
    eprintln!(
        "index: wrote {} ({} assets, {} unique chunks)",
        out.display(),
        vi.asset_count(),
        vi.chunk_count()
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn handle_pack(
    root: PathBuf,
    version_out: PathBuf,
    content_out: PathBuf,
    store_dir: PathBuf,
    chunk_min: usize,
    chunk_avg: usize,
    chunk_max: usize,
    max_block_size: u64,
    max_chunks_per_block: usize,
) -> Result<()> {
    let storage = FsStorage::new();
    let hasher = Blake3Hasher::new();
    let chunker = GearCdcChunker::new(ChunkParams { min: chunk_min, avg: chunk_avg, max: chunk_max });
    let jobs = RayonJobRunner::new();
    let compressor = ZstdCompressor::default();

    let root_str = path_str(&root);
    let store_dir_str = path_str(&store_dir);
    storage.create_dir_all(&store_dir_str)?;

    let vi = version_index::build(&storage, &root_str, &hasher, &chunker, &jobs)?;
    let ci = ContentIndexBuilder::new(max_block_size, max_chunks_per_block).build_from_chunks(&vi.chunk_hashes, &vi.chunk_sizes, &hasher);

    siltpack_core::block_writer::write_blocks(&storage, &root_str, &storage, &store_dir_str, &vi, &ci, &compressor, &jobs)?;

    std::fs::write(&version_out, vi.to_bytes())?;
    std::fs::write(&content_out, ci.to_bytes())?;

    eprintln!(
        "pack: {} assets, {} unique chunks, {} blocks in {}",
        vi.asset_count(),
        vi.chunk_count(),
        ci.block_count(),
        store_dir.display()
    );
    Ok(())
}

pub fn handle_materialize(version_index_path: PathBuf, content_index_path: PathBuf, store_dir: PathBuf, dest: PathBuf) -> Result<()> {
    let storage = FsStorage::new();
    let jobs = RayonJobRunner::new();
    let compressor = ZstdCompressor::default();

    let vi = read_version_index(&version_index_path)?;
    let ci = read_content_index(&content_index_path)?;
    let dest_str = path_str(&dest);
    storage.create_dir_all(&dest_str)?;

    materializer::materialize(&vi, &ci, &storage, &path_str(&store_dir), &storage, &dest_str, &compressor, &jobs)?;
    eprintln!("materialize: wrote {} assets to {}", vi.asset_count(), dest.display());
    Ok(())
}

pub fn handle_diff(old_version_index: PathBuf, new_version_index: PathBuf) -> Result<()> {
    let old = read_version_index(&old_version_index)?;
    let new = read_version_index(&new_version_index)?;
    let delta = version_diff::version_diff(&old, &new);
    println!(
        "added={} removed={} modified={} unchanged={}",
        delta.added.len(),
        delta.removed.len(),
        delta.modified.len(),
        delta.unchanged.len()
    );
    Ok(())
}

pub fn handle_apply(
    old_version_index: PathBuf,
    new_version_index: PathBuf,
    content_index_path: PathBuf,
    store_dir: PathBuf,
    dest: PathBuf,
) -> Result<()> {
    let storage = FsStorage::new();
    let jobs = RayonJobRunner::new();
    let compressor = ZstdCompressor::default();

    let old = read_version_index(&old_version_index)?;
    let new = read_version_index(&new_version_index)?;
    let ci = read_content_index(&content_index_path)?;
    let delta = version_diff::version_diff(&old, &new);

    let dest_str = path_str(&dest);
    storage.create_dir_all(&dest_str)?;

    version_diff::apply(&delta, &old, &new, &ci, &storage, &path_str(&store_dir), &storage, &dest_str, &compressor, &jobs)?;
    eprintln!(
        "apply: {} added, {} removed, {} modified",
        delta.added.len(),
        delta.removed.len(),
        delta.modified.len()
    );
    Ok(())
}

pub fn handle_validate(store_dir: PathBuf) -> Result<()> {
    let storage = FsStorage::new();
    let hasher = Blake3Hasher::new();
    let store_dir_str = path_str(&store_dir);

    let ci = ContentIndex::rescan(&storage, &store_dir_str)?;
    for &hash in &ci.block_hashes {
        let path = storage.join(&store_dir_str, &block_reader::block_file_name(hash));
        block_reader::validate(&storage, &hasher, &path, hash)?;
    }
    eprintln!("validate: {} blocks OK", ci.block_count());
    Ok(())
}
