#![forbid(unsafe_code)]

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod error;
pub mod ports;

pub mod hashing;
pub mod path_set;
pub mod util;

pub mod config;

pub mod adapters;

pub mod version_index;

pub mod block_packer;
pub mod content_index;

pub mod block_reader;
pub mod block_writer;

pub mod materializer;
pub mod version_diff;

pub use crate::error::{Error, Result};

pub use config::EngineConfig;
pub use content_index::{ContentIndex, ContentIndexBuilder};
pub use version_diff::{apply, version_diff, VersionDelta};
pub use version_index::VersionIndex;

pub mod prelude {
    pub use crate::config::EngineConfig;
    pub use crate::content_index::{ContentIndex, ContentIndexBuilder};
    pub use crate::error::{Error, Result};
    pub use crate::materializer::materialize;
    pub use crate::ports::{ChunkParams, Chunker, Compressor, Hasher, JobRunner, Storage};
    pub use crate::version_diff::{apply, version_diff, VersionDelta};
    pub use crate::version_index::VersionIndex;
}
