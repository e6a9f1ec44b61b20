//! Local record storage.

use std::collections::HashMap;

use crate::id::Key;

/// Records accepted by one peer.
///
/// Records are never evicted or expired; the only mutation is insertion of a
/// key that is not yet present.
#[derive(Debug, Default)]
pub(crate) struct LocalStore {
    records: HashMap<Key, Vec<u8>>,
    bytes: usize,
}

impl LocalStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn contains(&self, key: &Key) -> bool {
        self.records.contains_key(key)
    }

    /// Insert a record if the key is new. Returns `false` if it was already held.
    pub(crate) fn insert(&mut self, key: Key, value: Vec<u8>) -> bool {
        if self.records.contains_key(&key) {
            return false;
        }
        self.bytes = self.bytes.saturating_add(value.len());
        self.records.insert(key, value);
        true
    }

    pub(crate) fn get(&self, key: &Key) -> Option<Vec<u8>> {
        self.records.get(key).cloned()
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    /// Total payload bytes held.
    pub(crate) fn bytes(&self) -> usize {
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_write_wins() {
        let mut store = LocalStore::new();
        let key = [1u8; 32];

        assert!(store.insert(key, b"first".to_vec()));
        assert!(!store.insert(key, b"second".to_vec()));
        assert_eq!(store.get(&key), Some(b"first".to_vec()));
        assert_eq!(store.len(), 1);
        assert_eq!(store.bytes(), 5);
    }

    #[test]
    fn empty_value_is_not_missing() {
        let mut store = LocalStore::new();
        let key = [2u8; 32];
        store.insert(key, Vec::new());

        assert!(store.contains(&key));
        assert_eq!(store.get(&key), Some(Vec::new()));
        assert_eq!(store.get(&[3u8; 32]), None);
    }
}
