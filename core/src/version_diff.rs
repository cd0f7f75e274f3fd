//! Version diff / apply: the path-level counterpart to the content index's
//! chunk-level set algebra. `version_diff` classifies every asset path
//! present in either of two versions; `apply` turns that classification
//! into materializer calls and file removals.

use std::collections::HashMap;

use crate::content_index::ContentIndex;
use crate::error::Result;
use crate::materializer;
use crate::ports::{Compressor, JobRunner, Storage};
use crate::version_index::VersionIndex;

/// Per-path classification between an old and a new [`VersionIndex`], all
/// four fields holding asset indices (old's for `removed`, new's for
/// everything else), each sorted ascending.
#[derive(Clone, Debug, Default)]
pub struct VersionDelta {
    pub added: Vec<usize>,
    pub removed: Vec<usize>,
    pub modified: Vec<usize>,
    pub unchanged: Vec<usize>,
}

impl VersionDelta {
    pub fn added_count(&self) -> usize {
        self.added.len()
    }

    pub fn removed_count(&self) -> usize {
        self.removed.len()
    }

    pub fn modified_count(&self) -> usize {
        self.modified.len()
    }
}

/// Joins `old` and `new`'s name pools on path and classifies every asset as
/// added (path only in `new`), removed (path only in `old`), modified (path
/// in both, content-hash differs), or unchanged (path in both, content-hash
/// equal).
pub fn version_diff(old: &VersionIndex, new: &VersionIndex) -> VersionDelta {
    let old_by_path: HashMap<&str, usize> = (0..old.asset_count()).map(|a| (old.name(a), a)).collect();
    let new_by_path: HashMap<&str, usize> = (0..new.asset_count()).map(|a| (new.name(a), a)).collect();

    let mut added = Vec::new();
    let mut modified = Vec::new();
    let mut unchanged = Vec::new();

    for (&path, &a_new) in &new_by_path {
        match old_by_path.get(path) {
            None => added.push(a_new),
            Some(&a_old) => {
                if old.content_hashes[a_old] != new.content_hashes[a_new] {
                    modified.push(a_new);
                } else {
                    unchanged.push(a_new);
                }
            }
        }
    }

    let mut removed: Vec<usize> = old_by_path
        .iter()
        .filter(|(path, _)| !new_by_path.contains_key(**path))
        .map(|(_, &a)| a)
        .collect();

    added.sort_unstable();
    modified.sort_unstable();
    unchanged.sort_unstable();
    removed.sort_unstable();

    log::info!(
        "version_diff: {} added, {} removed, {} modified, {} unchanged",
        added.len(),
        removed.len(),
        modified.len(),
        unchanged.len()
    );

    VersionDelta {
        added,
        removed,
        modified,
        unchanged,
    }
}

/// A `VersionIndex` restricted to a subset of assets (chunk table kept
/// whole — only the per-asset arrays are filtered — so it remains a valid
/// input to the materializer without rebuilding chunk identities).
fn subset(vi: &VersionIndex, assets: &[usize]) -> VersionIndex {
    let mut out = VersionIndex {
        chunk_hashes: vi.chunk_hashes.clone(),
        chunk_sizes: vi.chunk_sizes.clone(),
        ..Default::default()
    };

    for &a in assets {
        out.path_hashes.push(vi.path_hashes[a]);
        out.content_hashes.push(vi.content_hashes[a]);
        out.asset_sizes.push(vi.asset_sizes[a]);
        out.asset_chunk_index_starts.push(out.asset_chunk_indexes.len() as u32);
        let idxs = vi.asset_chunk_indexes(a);
        out.asset_chunk_counts.push(idxs.len() as u32);
        out.asset_chunk_indexes.extend_from_slice(idxs);
        out.name_offsets.push(out.name_data.len() as u32);
        out.name_data.extend_from_slice(vi.name(a).as_bytes());
    }

    out
}

/// Materializes `delta`'s added and modified assets from `new_version`, and
/// removes `delta`'s removed assets (by path, from `old_version`'s name
/// pool). Unchanged assets are left untouched.
///
/// Directory removal is not attempted: the `Storage` port only exposes
/// `remove_file`, so a directory that becomes empty after this call is left
/// in place rather than pruned.
#[allow(clippy::too_many_arguments)]
pub fn apply(
    delta: &VersionDelta,
    old_version: &VersionIndex,
    new_version: &VersionIndex,
    content_index: &ContentIndex,
    store: &dyn Storage,
    store_dir: &str,
    dest: &dyn Storage,
    dest_root: &str,
    compressor: &dyn Compressor,
    jobs: &dyn JobRunner,
) -> Result<()> {
    let mut to_materialize: Vec<usize> = delta.added.iter().chain(delta.modified.iter()).copied().collect();
    to_materialize.sort_unstable();
    to_materialize.dedup();

    if !to_materialize.is_empty() {
        let subset_vi = subset(new_version, &to_materialize);
        materializer::materialize(&subset_vi, content_index, store, store_dir, dest, dest_root, compressor, jobs)?;
    }

    for &a in &delta.removed {
        let name = old_version.name(a);
        if old_version.is_dir(a) {
            log::debug!("version_diff::apply: leaving directory {name} in place (Storage has no remove_dir)");
            continue;
        }
        let path = dest.join(dest_root, name);
        if dest.exists(&path)? {
            dest.remove_file(&path)?;
        }
    }

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
    fn classifies_added_removed_modified_unchanged() {
        let old_tree = MemStorage::new();
        old_tree.put_file("v/keep.txt", b"same contents");
        old_tree.put_file("v/change.txt", b"old contents");
        old_tree.put_file("v/gone.txt", b"will be removed");

        let new_tree = MemStorage::new();
        new_tree.put_file("v/keep.txt", b"same contents");
        new_tree.put_file("v/change.txt", b"new contents, longer than before");
        new_tree.put_file("v/fresh.txt", b"brand new file");

        let hasher = Blake3Hasher::new();
        let chunker = GearCdcChunker::new(ChunkParams { min: 4, avg: 8, max: 16 });
        let jobs = InlineJobRunner::new();

        let old_vi = version_index::build(&old_tree, "v", &hasher, &chunker, &jobs).unwrap();
        let new_vi = version_index::build(&new_tree, "v", &hasher, &chunker, &jobs).unwrap();

        let delta = version_diff(&old_vi, &new_vi);
        assert_eq!(delta.added_count(), 1);
        assert_eq!(delta.removed_count(), 1);
        assert_eq!(delta.modified_count(), 1);
        assert_eq!(delta.unchanged.len(), 1);
    }

    #[test]
    fn apply_transforms_old_tree_into_new_tree() {
        let old_tree = MemStorage::new();
        old_tree.put_file("v/keep.txt", b"same contents");
        old_tree.put_file("v/change.txt", b"old contents");
        old_tree.put_file("v/gone.txt", b"will be removed");

        let new_tree = MemStorage::new();
        new_tree.put_file("v/keep.txt", b"same contents");
        new_tree.put_file("v/change.txt", b"new contents, much longer this time around");
        new_tree.put_file("v/fresh.txt", b"brand new file");

        let hasher = Blake3Hasher::new();
        let chunker = GearCdcChunker::new(ChunkParams { min: 4, avg: 8, max: 16 });
        let jobs = InlineJobRunner::new();
        let compressor = StoreCompressor;

        let old_vi = version_index::build(&old_tree, "v", &hasher, &chunker, &jobs).unwrap();
        let new_vi = version_index::build(&new_tree, "v", &hasher, &chunker, &jobs).unwrap();
        let new_ci =
            ContentIndexBuilder::new(1_000_000, 4096).build_from_chunks(&new_vi.chunk_hashes, &new_vi.chunk_sizes, &hasher);

        let store = MemStorage::new();
        store.put_dir("chunks");
        write_blocks(&new_tree, "v", &store, "chunks", &new_vi, &new_ci, &compressor, &jobs).unwrap();

        // `dest` starts as a byte-identical copy of the old tree.
        let dest = MemStorage::new();
        dest.put_dir("v");
        dest.put_file("v/keep.txt", b"same contents");
        dest.put_file("v/change.txt", b"old contents");
        dest.put_file("v/gone.txt", b"will be removed");

        let delta = version_diff(&old_vi, &new_vi);
        apply(&delta, &old_vi, &new_vi, &new_ci, &store, "chunks", &dest, "v", &compressor, &jobs).unwrap();

        assert_eq!(dest.read_range("v/keep.txt", 0, 13).unwrap(), b"same contents");
        assert_eq!(
            dest.read_range("v/change.txt", 0, 43).unwrap(),
            b"new contents, much longer this time around"
        );
        assert_eq!(dest.read_range("v/fresh.txt", 0, 14).unwrap(), b"brand new file");
        assert!(dest.kind("v/gone.txt").unwrap().is_none());
    }
}
