use std::path::PathBuf;

use clap::{Parser, Subcommand};
use siltpack_core::EngineConfig;

#[derive(Parser)]
#[command(author, version, about = "siltpack CLI", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

fn default_config() -> EngineConfig {
    EngineConfig::default()
}

#[derive(Subcommand)]
pub enum Commands {
    /// Index a directory tree into a version index file
    Index {
        root: PathBuf,
        out: PathBuf,

        #[arg(long, default_value_t = default_config().chunk_min)]
        chunk_min: usize,
        #[arg(long, default_value_t = default_config().chunk_avg)]
        chunk_avg: usize,
        #[arg(long, default_value_t = default_config().chunk_max)]
        chunk_max: usize,
    },

    /// Index a tree, pack its unique chunks into blocks, and write both
    /// indices plus the block files
    Pack {
        root: PathBuf,
        version_out: PathBuf,
        content_out: PathBuf,
        store_dir: PathBuf,

        #[arg(long, default_value_t = default_config().chunk_min)]
        chunk_min: usize,
        #[arg(long, default_value_t = default_config().chunk_avg)]
        chunk_avg: usize,
        #[arg(long, default_value_t = default_config().chunk_max)]
        chunk_max: usize,
        #[arg(long, default_value_t = default_config().max_block_size)]
        max_block_size: u64,
        #[arg(long, default_value_t = default_config().max_chunks_per_block)]
        max_chunks_per_block: usize,
    },

    /// Reconstruct a version's files under a destination from a block store
    Materialize {
        version_index: PathBuf,
        content_index: PathBuf,
        store_dir: PathBuf,
        dest: PathBuf,
    },

    /// Report the path-level difference between two version indexes
    Diff {
        old_version_index: PathBuf,
        new_version_index: PathBuf,
    },

    /// Transform a destination tree from the old version into the new one
    Apply {
        old_version_index: PathBuf,
        new_version_index: PathBuf,
        content_index: PathBuf,
        store_dir: PathBuf,
        dest: PathBuf,
    },

    /// Recompute every block's hash from its trailer and check it against
    /// the file name
    Validate { store_dir: PathBuf },
}
