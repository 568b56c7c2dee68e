//! In-memory map from key to the offset of its latest live record.
//!
//! The index is pure cache over the data file and is rebuilt from it at open.
//! Keys whose latest record is a tombstone are absent. No iteration order is
//! observable; the engine's lock provides all synchronization.

use std::collections::HashMap;

/// Key → byte offset of the most recent non-tombstone record.
#[derive(Debug, Default)]
pub(crate) struct Index {
    map: HashMap<Vec<u8>, u64>,
}

impl Index {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn lookup(&self, key: &[u8]) -> Option<u64> {
        self.map.get(key).copied()
    }

    pub(crate) fn insert(&mut self, key: Vec<u8>, offset: u64) {
        self.map.insert(key, offset);
    }

    pub(crate) fn remove(&mut self, key: &[u8]) {
        self.map.remove(key);
    }

    pub(crate) fn len(&self) -> usize {
        self.map.len()
    }

    /// All `(key, offset)` pairs, cloned out so the caller can drop the lock
    /// guarding the index while it works through them.
    pub(crate) fn snapshot(&self) -> Vec<(Vec<u8>, u64)> {
        self.map.iter().map(|(k, &v)| (k.clone(), v)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_insert_remove() {
        let mut index = Index::new();
        assert_eq!(index.lookup(b"a"), None);

        index.insert(b"a".to_vec(), 0);
        index.insert(b"b".to_vec(), 22);
        assert_eq!(index.lookup(b"a"), Some(0));
        assert_eq!(index.lookup(b"b"), Some(22));
        assert_eq!(index.len(), 2);

        index.insert(b"a".to_vec(), 44);
        assert_eq!(index.lookup(b"a"), Some(44));
        assert_eq!(index.len(), 2);

        index.remove(b"a");
        assert_eq!(index.lookup(b"a"), None);
        index.remove(b"a");
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn snapshot_is_detached() {
        let mut index = Index::new();
        index.insert(b"a".to_vec(), 0);
        let snapshot = index.snapshot();
        index.insert(b"a".to_vec(), 99);
        assert_eq!(snapshot, vec![(b"a".to_vec(), 0)]);
    }
}
