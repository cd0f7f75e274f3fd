//! Path set (component B): the packed, ordered list of paths produced by
//! tree walking and consumed by indexing. Element order defines the asset
//! index used throughout the rest of the pipeline.

use std::collections::VecDeque;

use crate::error::Result;
use crate::ports::{EntryKind, Storage};

/// An ordered sequence of `/`-separated, UTF-8 paths, packed into one byte
/// buffer with a parallel offset array (mirrors the name-pool layout used
/// by [`crate::version_index::VersionIndex`], but this is purely an
/// in-memory builder structure — it has no on-disk format of its own).
#[derive(Clone, Debug, Default)]
pub struct PathSet {
    bytes: Vec<u8>,
    offsets: Vec<u32>, // len == count + 1
}

impl PathSet {
    pub fn new() -> Self {
        Self {
            bytes: Vec::new(),
            offsets: vec![0],
        }
    }

    pub fn push(&mut self, path: &str) {
        self.bytes.extend_from_slice(path.as_bytes());
        self.offsets.push(self.bytes.len() as u32);
    }

    pub fn len(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> &str {
        let start = self.offsets[index] as usize;
        let end = self.offsets[index + 1] as usize;
        std::str::from_utf8(&self.bytes[start..end]).expect("path bytes are valid UTF-8 by construction")
    }

    pub fn is_dir(&self, index: usize) -> bool {
        self.get(index).ends_with('/')
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        (0..self.len()).map(move |i| self.get(i))
    }
}

/// Breadth-first walk of every file and directory reachable from `root`,
/// yielding paths relative to `root` with directories carrying a trailing
/// `/`. Iteration order within a directory is whatever `storage` returns;
/// nothing downstream depends on it.
pub fn walk_tree(storage: &dyn Storage, root: &str) -> Result<PathSet> {
    let mut set = PathSet::new();
    let mut queue: VecDeque<String> = VecDeque::new();
    queue.push_back(String::new());

    while let Some(rel_dir) = queue.pop_front() {
        let abs_dir = if rel_dir.is_empty() {
            root.to_string()
        } else {
            storage.join(root, rel_dir.trim_end_matches('/'))
        };

        for entry in storage.list_dir(&abs_dir)? {
            let rel = format!("{rel_dir}{}", entry.name);
            match entry.kind {
                EntryKind::Dir => {
                    let rel_dir_child = format!("{rel}/");
                    set.push(&rel_dir_child);
                    queue.push_back(rel_dir_child);
                }
                EntryKind::File => {
                    set.push(&rel);
                }
            }
        }
    }

    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mem::MemStorage;

    #[test]
    fn pushes_and_reads_back_paths() {
        let mut set = PathSet::new();
        set.push("a.txt");
        set.push("dir/");
        set.push("dir/b.txt");
        assert_eq!(set.len(), 3);
        assert_eq!(set.get(0), "a.txt");
        assert_eq!(set.get(1), "dir/");
        assert!(set.is_dir(1));
        assert!(!set.is_dir(0));
        assert_eq!(set.get(2), "dir/b.txt");
    }

    #[test]
    fn walk_finds_nested_files_and_empty_dirs() {
        let mem = MemStorage::new();
        mem.put_file("root/a.txt", b"hello");
        mem.put_file("root/sub/b.txt", b"world");
        mem.put_dir("root/empty");

        let set = walk_tree(&mem, "root").unwrap();
        let paths: Vec<&str> = set.iter().collect();
        assert!(paths.contains(&"a.txt"));
        assert!(paths.contains(&"sub/"));
        assert!(paths.contains(&"sub/b.txt"));
        assert!(paths.contains(&"empty/"));
    }
}
