//! Block reader (component H): opens a `.lrb` file, locates its trailer at
//! EOF, decompresses the payload, and (as a supplemented feature) validates
//! a block's name against its own recomputed hash.

use crate::error::{Error, Result};
use crate::hashing::hash_bytes;
use crate::ports::{Compressor, Hasher, Storage};

pub fn block_file_name(hash: u64) -> String {
    format!("0x{hash:016x}.lrb")
}

pub fn block_tmp_name(hash: u64) -> String {
    format!("0x{hash:016x}.tmp")
}

/// Parses a `0x%016x.lrb` file name back into its block hash. Returns
/// `None` for anything that doesn't match (e.g. a stray `.tmp` left behind
/// by a crashed writer).
pub fn parse_block_file_name(name: &str) -> Option<u64> {
    let hex = name.strip_prefix("0x")?.strip_suffix(".lrb")?;
    u64::from_str_radix(hex, 16).ok()
}

/// The chunk-hash and chunk-size arrays from a block's trailer, in the
/// order the writer packed them.
pub fn read_trailer(storage: &dyn Storage, path: &str) -> Result<(Vec<u64>, Vec<u32>)> {
    let size = storage.size(path)?;
    if size < 4 {
        return Err(Error::corruption(format!("block {path} is smaller than a trailer count field")));
    }
    let n_bytes = storage.read_range(path, size - 4, 4)?;
    let n = u32::from_le_bytes(n_bytes[..4].try_into().unwrap()) as u64;

    let trailer_len = 8 * n + 4 * n + 4;
    if trailer_len > size {
        return Err(Error::corruption(format!(
            "block {path}: trailer of {trailer_len} bytes exceeds file size {size}"
        )));
    }
    let trailer_start = size - trailer_len;
    let trailer = storage.read_range(path, trailer_start, trailer_len)?;

    let n = n as usize;
    let mut chunk_hashes = Vec::with_capacity(n);
    for i in 0..n {
        let off = i * 8;
        chunk_hashes.push(u64::from_le_bytes(trailer[off..off + 8].try_into().unwrap()));
    }
    let sizes_off = n * 8;
    let mut chunk_sizes = Vec::with_capacity(n);
    for i in 0..n {
        let off = sizes_off + i * 4;
        chunk_sizes.push(u32::from_le_bytes(trailer[off..off + 4].try_into().unwrap()));
    }
    Ok((chunk_hashes, chunk_sizes))
}

/// Reads and decompresses a block's payload, returning it alongside the
/// trailer's chunk-hash and chunk-size arrays (in trailer order, which
/// matches the order chunks were concatenated into the payload).
pub fn read_block(storage: &dyn Storage, compressor: &dyn Compressor, path: &str) -> Result<(Vec<u8>, Vec<u64>, Vec<u32>)> {
    let (chunk_hashes, chunk_sizes) = read_trailer(storage, path)?;

    let header = storage.read_range(path, 0, 8)?;
    let uncompressed_len = u32::from_le_bytes(header[0..4].try_into().unwrap()) as usize;
    let compressed_len = u32::from_le_bytes(header[4..8].try_into().unwrap()) as usize;

    let compressed = storage.read_range(path, 8, compressed_len as u64)?;
    let payload = compressor.decompress(&compressed, uncompressed_len)?;

    Ok((payload, chunk_hashes, chunk_sizes))
}

/// Recomputes a block's hash from its own trailer and compares it against
/// `claimed_hash` (normally parsed from the file name). A mismatch means
/// the file was renamed, truncated, or corrupted after the writer sealed it.
pub fn validate(storage: &dyn Storage, hasher: &dyn Hasher, path: &str, claimed_hash: u64) -> Result<()> {
    let (chunk_hashes, chunk_sizes) = read_trailer(storage, path)?;
    let n = chunk_hashes.len() as u32;

    let mut buf = Vec::with_capacity(chunk_hashes.len() * 8 + chunk_sizes.len() * 4 + 4);
    for h in &chunk_hashes {
        buf.extend_from_slice(&h.to_le_bytes());
    }
    for s in &chunk_sizes {
        buf.extend_from_slice(&s.to_le_bytes());
    }
    buf.extend_from_slice(&n.to_le_bytes());

    let actual = hash_bytes(hasher, &buf);
    if actual != claimed_hash {
        return Err(Error::corruption(format!(
            "block hash mismatch: file name claims {claimed_hash:#018x}, trailer hashes to {actual:#018x}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_round_trips() {
        let hash = 0xDEAD_BEEF_0000_1234u64;
        let name = block_file_name(hash);
        assert_eq!(name, "0xdeadbeef00001234.lrb");
        assert_eq!(parse_block_file_name(&name), Some(hash));
    }

    #[test]
    fn rejects_non_matching_names() {
        assert_eq!(parse_block_file_name("0xnothex.lrb"), None);
        assert_eq!(parse_block_file_name("not-a-block.txt"), None);
        assert_eq!(parse_block_file_name("0x1234.tmp"), None);
    }
}
