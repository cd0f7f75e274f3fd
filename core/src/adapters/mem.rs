//! In-memory [`Storage`] backend. Explicitly named in the design spec as an
//! external collaborator ("in-memory filesystem used for tests") — kept
//! here because it is the cheapest way to exercise the walker, writer,
//! reader, and materializer without touching a real disk.

use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::ports::{DirEntry, EntryKind, Storage};

#[derive(Default)]
struct MemInner {
    files: HashMap<String, Vec<u8>>,
    dirs: HashSet<String>,
}

/// A small virtual filesystem keyed by `/`-separated string paths (no
/// relation to the host OS's path rules). Useful both as a source tree and
/// as a content store in tests.
#[derive(Default)]
pub struct MemStorage {
    inner: Mutex<MemInner>,
}

fn parent_of(key: &str) -> String {
    match key.rsplit_once('/') {
        Some((parent, _)) => parent.to_string(),
        None => String::new(),
    }
}

fn basename_of(key: &str) -> String {
    match key.rsplit_once('/') {
        Some((_, name)) => name.to_string(),
        None => key.to_string(),
    }
}

impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `dir` and every ancestor directory it implies. Stops early
    /// once an ancestor is already present, since every prior insertion
    /// chained all the way up.
    fn ensure_dir_chain(inner: &mut MemInner, dir: &str) {
        let mut cur = dir.to_string();
        while !cur.is_empty() {
            if !inner.dirs.insert(cur.clone()) {
                break;
            }
            cur = parent_of(&cur);
        }
    }

    /// Test helper: create a file and every ancestor directory it implies.
    pub fn put_file(&self, path: &str, data: &[u8]) {
        let mut inner = self.inner.lock().unwrap();
        let parent = parent_of(path);
        if !parent.is_empty() {
            Self::ensure_dir_chain(&mut inner, &parent);
        }
        inner.files.insert(path.to_string(), data.to_vec());
    }

    /// Test helper: create an (possibly empty) directory.
    pub fn put_dir(&self, path: &str) {
        let mut inner = self.inner.lock().unwrap();
        Self::ensure_dir_chain(&mut inner, path.trim_end_matches('/'));
    }
}

impl Storage for MemStorage {
    fn kind(&self, path: &str) -> Result<Option<EntryKind>> {
        let p = path.trim_end_matches('/');
        let inner = self.inner.lock().unwrap();
        if inner.files.contains_key(p) {
            Ok(Some(EntryKind::File))
        } else if inner.dirs.contains(p) || p.is_empty() {
            Ok(Some(EntryKind::Dir))
        } else {
            Ok(None)
        }
    }

    fn size(&self, path: &str) -> Result<u64> {
        let inner = self.inner.lock().unwrap();
        inner
            .files
            .get(path)
            .map(|d| d.len() as u64)
            .ok_or_else(|| Error::corruption(format!("no such file: {path}")))
    }

    fn open_reader(&self, path: &str) -> Result<Box<dyn std::io::Read + Send>> {
        let inner = self.inner.lock().unwrap();
        let data = inner
            .files
            .get(path)
            .ok_or_else(|| Error::corruption(format!("no such file: {path}")))?
            .clone();
        Ok(Box::new(Cursor::new(data)))
    }

    fn read_range(&self, path: &str, offset: u64, len: u64) -> Result<Vec<u8>> {
        let inner = self.inner.lock().unwrap();
        let data = inner
            .files
            .get(path)
            .ok_or_else(|| Error::corruption(format!("no such file: {path}")))?;
        let start = offset as usize;
        let end = start + len as usize;
        if end > data.len() {
            return Err(Error::corruption(format!(
                "short read on {path}: have {}, want [{start}..{end})",
                data.len()
            )));
        }
        Ok(data[start..end].to_vec())
    }

    fn create_dir_all(&self, path: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        Self::ensure_dir_chain(&mut inner, path.trim_end_matches('/'));
        Ok(())
    }

    fn list_dir(&self, path: &str) -> Result<Vec<DirEntry>> {
        let p = path.trim_end_matches('/');
        let inner = self.inner.lock().unwrap();
        let mut out = Vec::new();
        for f in inner.files.keys() {
            if parent_of(f) == p {
                out.push(DirEntry {
                    name: basename_of(f),
                    kind: EntryKind::File,
                });
            }
        }
        for d in &inner.dirs {
            if parent_of(d) == p {
                out.push(DirEntry {
                    name: basename_of(d),
                    kind: EntryKind::Dir,
                });
            }
        }
        Ok(out)
    }

    fn join(&self, base: &str, child: &str) -> String {
        if base.is_empty() {
            child.to_string()
        } else if child.is_empty() {
            base.to_string()
        } else {
            format!("{}/{}", base.trim_end_matches('/'), child.trim_start_matches('/'))
        }
    }

    fn write_new_file(&self, path: &str, data: &[u8]) -> Result<()> {
        self.put_file(path, data);
        Ok(())
    }

    fn rename(&self, from: &str, to: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let data = inner
            .files
            .remove(from)
            .ok_or_else(|| Error::corruption(format!("rename: no such file: {from}")))?;
        inner.files.insert(to.to_string(), data);
        Ok(())
    }

    fn remove_file(&self, path: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.files.remove(path);
        Ok(())
    }
}
