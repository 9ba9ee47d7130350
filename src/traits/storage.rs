//! Persistent key-value storage trait abstraction.
//!
//! The credential cache only needs three string operations to survive a
//! process restart. Keeping it behind a trait lets tests swap in
//! [`InMemoryStore`](crate::adapters::mock::InMemoryStore) and lets a host
//! application plug in its own secure storage.

use async_trait::async_trait;

use crate::error::StorageError;

/// String key-value storage that outlives the process.
///
/// # Example
///
/// ```ignore
/// use tradewire::traits::KeyValueStore;
///
/// async fn roundtrip<S: KeyValueStore>(store: &S) -> Result<(), StorageError> {
///     store.set("greeting", "hello").await?;
///     assert_eq!(store.get("greeting").await?, Some("hello".to_string()));
///     store.remove("greeting").await
/// }
/// ```
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`.
    ///
    /// # Returns
    /// - `Ok(Some(value))` if the key exists
    /// - `Ok(None)` if nothing is stored under it
    /// - `Err(error)` if the backing storage could not be read
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove `key`. Removing a missing key succeeds.
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}
