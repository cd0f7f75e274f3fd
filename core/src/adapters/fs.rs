//! On-disk [`Storage`] backend: plain `std::fs`, no caching, no locking
//! beyond what the OS gives a single process.

use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::Result;
use crate::ports::{DirEntry, EntryKind, Storage};

#[derive(Clone, Copy, Default)]
pub struct FsStorage;

impl FsStorage {
    pub fn new() -> Self {
        Self
    }
}

impl Storage for FsStorage {
    fn kind(&self, path: &str) -> Result<Option<EntryKind>> {
        match fs::metadata(path) {
            Ok(md) => Ok(Some(if md.is_dir() {
                EntryKind::Dir
            } else {
                EntryKind::File
            })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn size(&self, path: &str) -> Result<u64> {
        Ok(fs::metadata(path)?.len())
    }

    fn open_reader(&self, path: &str) -> Result<Box<dyn Read + Send>> {
        Ok(Box::new(File::open(path)?))
    }

    fn read_range(&self, path: &str, offset: u64, len: u64) -> Result<Vec<u8>> {
        let mut f = File::open(path)?;
        f.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len as usize];
        f.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn create_dir_all(&self, path: &str) -> Result<()> {
        fs::create_dir_all(path)?;
        Ok(())
    }

    fn list_dir(&self, path: &str) -> Result<Vec<DirEntry>> {
        let mut out = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            let kind = if entry.file_type()?.is_dir() {
                EntryKind::Dir
            } else {
                EntryKind::File
            };
            out.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind,
            });
        }
        Ok(out)
    }

    fn join(&self, base: &str, child: &str) -> String {
        Path::new(base).join(child).to_string_lossy().into_owned()
    }

    fn write_new_file(&self, path: &str, data: &[u8]) -> Result<()> {
        fs::write(path, data)?;
        Ok(())
    }

    fn rename(&self, from: &str, to: &str) -> Result<()> {
        fs::rename(from, to)?;
        Ok(())
    }

    fn remove_file(&self, path: &str) -> Result<()> {
        fs::remove_file(path)?;
        Ok(())
    }
}
