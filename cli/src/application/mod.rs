pub mod handlers;

use clap::Parser;
use siltpack_core::Result;

use crate::presentation::cli::{Cli, Commands};

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Index { root, out, chunk_min, chunk_avg, chunk_max } => {
            handlers::handle_index(root, out, chunk_min, chunk_avg, chunk_max)
        }
        Commands::Pack {
            root,
            version_out,
            content_out,
            store_dir,
            chunk_min,
            chunk_avg,
            chunk_max,
            max_block_size,
            max_chunks_per_block,
        } => handlers::handle_pack(
            root,
            version_out,
            content_out,
            store_dir,
            chunk_min,
            chunk_avg,
            chunk_max,
            max_block_size,
            max_chunks_per_block,
        ),
        Commands::Materialize { version_index, content_index, store_dir, dest } => {
            handlers::handle_materialize(version_index, content_index, store_dir, dest)
        }
        Commands::Diff { old_version_index, new_version_index } => {
            handlers::handle_diff(old_version_index, new_version_index)
        }
        Commands::Apply {
            old_version_index,
            new_version_index,
            content_index,
            store_dir,
            dest,
        } => handlers::handle_apply(old_version_index, new_version_index, content_index, store_dir, dest),
        Commands::Validate { store_dir } => handlers::handle_validate(store_dir),
    }
}
