//! In-memory metadata index
//!
//! The index is the sole source of truth for existence and size queries.
//! A key is present if and only if a confirmed put or bulk load recorded it
//! and no later confirmed delete removed it. Nothing here performs I/O.

use bucketds_common::{Key, Metadata};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Key to object size mapping, internally synchronized
#[derive(Debug, Default)]
pub struct MetadataIndex {
    entries: RwLock<HashMap<Key, u64>>,
}

impl MetadataIndex {
    /// Create an empty index
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if a key is indexed
    pub fn has(&self, key: &Key) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Look up the metadata record for a key
    pub fn get(&self, key: &Key) -> Option<Metadata> {
        self.entries
            .read()
            .get(key)
            .map(|&size| Metadata::new(key.clone(), size))
    }

    /// Insert or overwrite the record for a key
    pub fn put(&self, key: Key, size: u64) {
        self.entries.write().insert(key, size);
    }

    /// Remove a key, returning whether it was indexed
    pub fn delete(&self, key: &Key) -> bool {
        self.entries.write().remove(key).is_some()
    }

    /// Number of indexed keys
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Snapshot every record whose key starts with `prefix`
    ///
    /// The snapshot is taken under a single read lock, so it reflects one
    /// point in time with respect to concurrent puts and deletes. A `limit`
    /// of zero means unbounded. Traversal order is unspecified.
    pub fn iter(&self, prefix: &str, limit: usize) -> MetadataIter {
        let entries = self.entries.read();
        let matching = entries
            .iter()
            .filter(|(key, _)| key.has_prefix(prefix))
            .map(|(key, &size)| Metadata::new(key.clone(), size));

        let snapshot: Vec<Metadata> = if limit > 0 {
            matching.take(limit).collect()
        } else {
            matching.collect()
        };

        MetadataIter {
            inner: snapshot.into_iter(),
        }
    }
}

/// Finite, non-restartable producer over an index snapshot
#[derive(Debug)]
pub struct MetadataIter {
    inner: std::vec::IntoIter<Metadata>,
}

impl Iterator for MetadataIter {
    type Item = Metadata;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for MetadataIter {}

impl std::iter::FusedIterator for MetadataIter {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn key(s: &str) -> Key {
        Key::new(s).unwrap()
    }

    #[test]
    fn test_entry_lifecycle() {
        let index = MetadataIndex::new();
        let k = key("/CIQA");
        assert!(!index.has(&k));
        assert!(index.get(&k).is_none());

        index.put(k.clone(), 1000);
        assert!(index.has(&k));
        assert_eq!(index.get(&k).unwrap().size, 1000);

        assert!(index.delete(&k));
        assert!(!index.has(&k));
        assert!(!index.delete(&k));
        assert!(index.is_empty());
    }

    #[test]
    fn test_put_overwrites() {
        let index = MetadataIndex::new();
        index.put(key("/a"), 5);
        index.put(key("/a"), 7);
        assert_eq!(index.len(), 1);
        assert_eq!(index.get(&key("/a")).unwrap().size, 7);
    }

    #[test]
    fn test_iter_prefix() {
        let index = MetadataIndex::new();
        index.put(key("/blocks/A"), 1);
        index.put(key("/blocks/B"), 2);
        index.put(key("/pins/C"), 3);

        let keys: HashSet<String> = index
            .iter("/blocks", 0)
            .map(|m| m.key.as_str().to_string())
            .collect();
        assert_eq!(
            keys,
            HashSet::from(["/blocks/A".to_string(), "/blocks/B".to_string()])
        );

        assert_eq!(index.iter("/", 0).len(), 3);
        assert_eq!(index.iter("/nothing", 0).count(), 0);
    }

    #[test]
    fn test_iter_limit() {
        let index = MetadataIndex::new();
        for i in 0..10 {
            index.put(key(&format!("/k{i}")), i);
        }
        assert_eq!(index.iter("/", 4).count(), 4);
        assert_eq!(index.iter("/", 100).count(), 10);
    }

    #[test]
    fn test_iter_is_a_snapshot() {
        let index = MetadataIndex::new();
        index.put(key("/a"), 1);
        index.put(key("/b"), 2);

        let mut it = index.iter("/", 0);
        index.put(key("/c"), 3);
        index.delete(&key("/a"));

        let mut seen = Vec::new();
        seen.extend(it.by_ref().map(|m| m.key.as_str().to_string()));
        seen.sort();
        assert_eq!(seen, vec!["/a", "/b"]);
        assert!(it.next().is_none());
    }

    #[test]
    fn test_concurrent_mutation() {
        let index = Arc::new(MetadataIndex::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let index = Arc::clone(&index);
                std::thread::spawn(move || {
                    for i in 0..200u64 {
                        let k = Key::new(format!("/t{t}/k{i}")).unwrap();
                        index.put(k.clone(), i);
                        if i % 2 == 0 {
                            index.delete(&k);
                        }
                        let _ = index.iter("/", 0).count();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(index.len(), 8 * 100);
    }
}
