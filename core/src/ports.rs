//! Capability ports (component A).
//!
//! The core never talks to a filesystem, a hash function, a compression
//! codec, or a thread pool directly — it only knows these five narrow
//! interfaces. Concrete implementations live under [`crate::adapters`], but
//! nothing in this module depends on them; a caller may swap in its own.

use crate::error::Result;
use std::io::Read;

/// What a directory enumeration entry is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
}

/// A directory entry returned by [`Storage::list_dir`].
#[derive(Clone, Debug)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
}

/// Storage backend: a source tree or a content store. The core is always
/// handed two independent instances (never assumed to be the same backend)
/// and never mutates a file in place — files are either written whole to a
/// temporary name and renamed, or read.
pub trait Storage: Send + Sync {
    /// `None` if nothing exists at `path`.
    fn kind(&self, path: &str) -> Result<Option<EntryKind>>;

    fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.kind(path)?.is_some())
    }

    fn size(&self, path: &str) -> Result<u64>;

    /// Open `path` for sequential reading from the start.
    fn open_reader(&self, path: &str) -> Result<Box<dyn Read + Send>>;

    /// Read exactly `len` bytes starting at `offset`. Fails (does not
    /// short-read) if fewer bytes are available.
    fn read_range(&self, path: &str, offset: u64, len: u64) -> Result<Vec<u8>>;

    fn create_dir_all(&self, path: &str) -> Result<()>;

    /// Entries directly inside `path`, in backend-defined order.
    fn list_dir(&self, path: &str) -> Result<Vec<DirEntry>>;

    /// Join a directory path and a child name using this backend's separator.
    fn join(&self, base: &str, child: &str) -> String;

    /// Create (or overwrite) `path` with exactly `data`.
    fn write_new_file(&self, path: &str, data: &[u8]) -> Result<()>;

    /// Atomically replace `to` with `from`'s contents. Used by the block
    /// writer as the final step of `write tmp -> rename`.
    fn rename(&self, from: &str, to: &str) -> Result<()>;

    fn remove_file(&self, path: &str) -> Result<()>;
}

/// Streaming 128-bit hash state: `begin -> absorb* -> finalize`.
pub trait HashState: Send {
    fn absorb(&mut self, bytes: &[u8]);
    fn finalize(self: Box<Self>) -> [u8; 16];
}

/// Factory for [`HashState`]. Must be deterministic and collision-resistant;
/// the core only ever reads the first 8 bytes of a finalized hash (64-bit
/// truncation of the 128-bit output — see [`crate::hashing::truncate64`]).
pub trait Hasher: Send + Sync {
    fn begin(&self) -> Box<dyn HashState>;
}

/// Stateless, whole-buffer compression. A `Compressor` never holds state
/// across calls, unlike [`Hasher`]: blocks are compressed and decompressed
/// one buffer at a time.
pub trait Compressor: Send + Sync {
    /// Upper bound on the compressed size of a `src_len`-byte input, used by
    /// the writer to size its output buffer.
    fn max_compressed_len(&self, src_len: usize) -> usize;

    fn compress(&self, src: &[u8]) -> Result<Vec<u8>>;

    /// Decompress `src`, which must expand to exactly `expected_len` bytes.
    fn decompress(&self, src: &[u8], expected_len: usize) -> Result<Vec<u8>>;
}

/// Runs independent, index-addressed jobs to completion.
///
/// A "submit closure / wait for all" contract expressed in Rust's
/// iterator-parallelism idiom: `run_indexed(n, f)` invokes `f(i)` for
/// every `i` in `0..n`, in any order, on any worker, and blocks until all
/// have returned. A null/inline runner satisfies the same contract by
/// calling `f` sequentially on the caller's thread.
///
/// Jobs never share mutable state: each call to `f` owns its own output: the
/// "pre-sized, disjoint output slot" per job from the concurrency model is
/// simply the `T` returned at index `i`, collected into the result vector by
/// this trait rather than written through a shared buffer.
pub trait JobRunner: Send + Sync {
    fn run_indexed<T, F>(&self, n: usize, f: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(usize) -> Result<T> + Sync;
}

/// Content-defined chunking over a byte stream.
///
/// `for_each_chunk` is a push-style callback over a standard [`Read`]
/// rather than a lazy iterator: the `Read` itself is the feeder, and
/// `on_chunk` receives each chunk's bytes in
/// order without requiring the whole file to be buffered up front. Chunk
/// sizes lie in `[min, max]` except possibly the last, and chunking is
/// deterministic given the same bytes and parameters.
pub trait Chunker: Send + Sync {
    fn params(&self) -> ChunkParams;

    fn for_each_chunk(
        &self,
        reader: &mut dyn Read,
        on_chunk: &mut dyn FnMut(&[u8]) -> Result<()>,
    ) -> Result<()>;
}

#[derive(Clone, Copy, Debug)]
pub struct ChunkParams {
    pub min: usize,
    pub avg: usize,
    pub max: usize,
}
