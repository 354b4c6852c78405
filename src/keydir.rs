use std::collections::HashMap;

use crate::DataFileId;

/// Where the authoritative record for a key lives: the file holding it and
/// the byte offset of the record's flag byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyDirEntry {
    pub file: DataFileId,
    pub offset: u64,
}

/// In-memory index from key to on-disk location, as in the bitcask paper.
///
/// The entry for a key may point at a tombstone: deletes record the
/// tombstone's offset rather than dropping the key, so the newest write
/// stays authoritative until the next rotation compacts it away.
#[derive(Debug, Default)]
pub struct KeyDir {
    inner: HashMap<Vec<u8>, KeyDirEntry>,
}

impl KeyDir {
    pub fn new() -> Self {
        KeyDir {
            inner: HashMap::new(),
        }
    }

    pub fn lookup(&self, key: &[u8]) -> Option<KeyDirEntry> {
        self.inner.get(key).copied()
    }

    pub fn upsert(&mut self, key: Vec<u8>, file: DataFileId, offset: u64) {
        self.inner.insert(key, KeyDirEntry { file, offset });
    }

    pub fn remove(&mut self, key: &[u8]) -> Option<KeyDirEntry> {
        self.inner.remove(key)
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    /// Replaces every entry with the contents of `other`.
    pub fn bulk_replace(&mut self, other: KeyDir) {
        self.inner = other.inner;
    }

    pub fn keys(&self) -> Vec<Vec<u8>> {
        self.inner.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
