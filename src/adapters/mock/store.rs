//! In-memory key-value store for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::StorageError;
use crate::traits::KeyValueStore;

/// In-memory [`KeyValueStore`] with injectable failures.
///
/// Clones share the same underlying map, so a test can keep one clone for
/// inspection while the cache under test owns another.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
    failures: Arc<Mutex<Failures>>,
    writes: Arc<Mutex<usize>>,
}

#[derive(Debug, Default)]
struct Failures {
    get: bool,
    set: bool,
    remove: bool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with one entry.
    pub fn with_entry(key: &str, value: &str) -> Self {
        let store = Self::new();
        store.insert(key, value);
        store
    }

    /// Insert an entry synchronously (for test setup).
    pub fn insert(&self, key: &str, value: &str) {
        self.entries.lock().insert(key.to_string(), value.to_string());
    }

    /// Read an entry synchronously (for assertions).
    pub fn entry(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    /// Number of successful `set` calls.
    pub fn write_count(&self) -> usize {
        *self.writes.lock()
    }

    pub fn set_get_should_fail(&self, should_fail: bool) {
        self.failures.lock().get = should_fail;
    }

    pub fn set_set_should_fail(&self, should_fail: bool) {
        self.failures.lock().set = should_fail;
    }

    pub fn set_remove_should_fail(&self, should_fail: bool) {
        self.failures.lock().remove = should_fail;
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        if self.failures.lock().get {
            return Err(StorageError::Io("Mock get failure".to_string()));
        }
        Ok(self.entry(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.failures.lock().set {
            return Err(StorageError::Io("Mock set failure".to_string()));
        }
        self.insert(key, value);
        *self.writes.lock() += 1;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        if self.failures.lock().remove {
            return Err(StorageError::Io("Mock remove failure".to_string()));
        }
        self.entries.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_remove() {
        let store = InMemoryStore::new();
        assert_eq!(store.get("k").await.unwrap(), None);

        store.set("k", "v").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
        assert_eq!(store.write_count(), 1);

        store.remove("k").await.unwrap();
        assert_eq!(store.entry("k"), None);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = InMemoryStore::with_entry("k", "v");
        store.set_get_should_fail(true);
        store.set_set_should_fail(true);
        store.set_remove_should_fail(true);

        assert!(store.get("k").await.is_err());
        assert!(store.set("k", "w").await.is_err());
        assert!(store.remove("k").await.is_err());
        assert_eq!(store.entry("k"), Some("v".to_string()));
        assert_eq!(store.write_count(), 0);
    }

    #[test]
    fn test_clones_share_state() {
        let store = InMemoryStore::new();
        let cloned = store.clone();
        store.insert("k", "v");
        assert_eq!(cloned.entry("k"), Some("v".to_string()));
    }
}
