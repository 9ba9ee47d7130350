//! Long-lived credential cache.
//!
//! Hands out the identity provider's credential while it is usable, refreshes
//! it at most once concurrently, and persists it so a restart does not force
//! re-authentication.
//!
//! # Single-flight refresh
//!
//! When no usable credential is cached, the first caller registers an
//! in-flight refresh and every caller arriving before it settles awaits the
//! same outcome. The refresh runs on its own task, so it completes even if
//! every caller stops waiting.
//!
//! # Example
//!
//! ```ignore
//! use tradewire::auth::CredentialCache;
//!
//! let cache = CredentialCache::new(store, CredentialCacheConfig::default());
//! cache.initialize().await;
//! let token = cache.get_token(|| async { identity_provider.fetch().await }).await;
//! ```

use futures::FutureExt;
use parking_lot::Mutex;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::credentials::CredentialRecord;
use super::single_flight::{pending, InFlight};
use crate::config::CredentialCacheConfig;
use crate::traits::KeyValueStore;

/// Cache for the long-lived credential.
///
/// Cheap to clone; clones share the cached record and the in-flight refresh.
#[derive(Clone)]
pub struct CredentialCache {
    inner: Arc<CacheInner>,
}

struct CacheInner {
    store: Arc<dyn KeyValueStore>,
    config: CredentialCacheConfig,
    state: Mutex<CacheState>,
    /// Serializes storage writes against `clear_cache`.
    persist_lock: tokio::sync::Mutex<()>,
}

#[derive(Default)]
struct CacheState {
    record: Option<CredentialRecord>,
    refresh: Option<Flight>,
    init: InitState,
    /// Bumped by `clear_cache`; results from an older epoch are not stored.
    epoch: u64,
    next_flight_id: u64,
}

struct Flight {
    id: u64,
    handle: InFlight<Option<String>>,
}

#[derive(Default)]
enum InitState {
    #[default]
    NotStarted,
    Loading(InFlight<()>),
    Done,
}

impl CredentialCache {
    pub fn new(store: Arc<dyn KeyValueStore>, config: CredentialCacheConfig) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                store,
                config,
                state: Mutex::new(CacheState::default()),
                persist_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn config(&self) -> &CredentialCacheConfig {
        &self.inner.config
    }

    /// Load the persisted credential, if any.
    ///
    /// Idempotent: concurrent calls share one load and later calls return
    /// immediately. A persisted credential that is no longer usable is removed
    /// from storage.
    pub async fn initialize(&self) {
        let (loader, flight) = {
            let mut state = self.inner.state.lock();
            match &state.init {
                InitState::Done => return,
                InitState::Loading(flight) => (None, flight.clone()),
                InitState::NotStarted => {
                    let (tx, flight) = pending(());
                    state.init = InitState::Loading(flight.clone());
                    (Some((tx, state.epoch)), flight)
                }
            }
        };

        if let Some((tx, epoch)) = loader {
            let inner = self.inner.clone();
            tokio::spawn(async move {
                inner.load_persisted(epoch).await;
                inner.state.lock().init = InitState::Done;
                let _ = tx.send(());
            });
        }

        flight.await;
    }

    /// Return a usable credential, refreshing through `fetch` if needed.
    ///
    /// `fetch` is only invoked when this call starts a refresh; callers that
    /// join an in-flight refresh get its outcome instead. Returns `None` when
    /// the identity provider produced no credential, in which case the cache
    /// and the persisted copy are cleared. A panic in `fetch`, or in the
    /// future it returns, counts as no credential.
    pub async fn get_token<F, Fut>(&self, fetch: F) -> Option<String>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Option<String>> + Send + 'static,
    {
        self.initialize().await;

        let (leader, flight) = {
            let mut state = self.inner.state.lock();
            if let Some(record) = &state.record {
                if record.is_usable(self.inner.config.safety_margin) {
                    return Some(record.token.clone());
                }
                debug!("Cached credential inside safety margin, refreshing");
            }

            match &state.refresh {
                Some(flight) => {
                    debug!("Joining in-flight credential refresh");
                    (None, flight.handle.clone())
                }
                None => {
                    let id = state.next_flight_id;
                    state.next_flight_id += 1;
                    let (tx, handle) = pending(None);
                    state.refresh = Some(Flight {
                        id,
                        handle: handle.clone(),
                    });
                    (Some((tx, id, state.epoch)), handle)
                }
            }
        };

        if let Some((tx, id, epoch)) = leader {
            let inner = self.inner.clone();
            tokio::spawn(async move {
                let token = match AssertUnwindSafe(async move { fetch().await })
                    .catch_unwind()
                    .await
                {
                    Ok(token) => token,
                    Err(_) => {
                        warn!("Identity provider fetch panicked");
                        None
                    }
                };
                let outcome = inner.settle_refresh(id, epoch, token).await;
                let _ = tx.send(outcome);
            });
        }

        flight.await
    }

    /// Return the cached credential if it is usable, without refreshing.
    pub fn peek_token(&self) -> Option<String> {
        let state = self.inner.state.lock();
        state
            .record
            .as_ref()
            .filter(|record| record.is_usable(self.inner.config.safety_margin))
            .map(|record| record.token.clone())
    }

    /// Invalidate the cached and persisted credential.
    ///
    /// A refresh already in flight still resolves for its current awaiters,
    /// but its result is neither cached nor reused by later callers.
    pub async fn clear_cache(&self) {
        {
            let mut state = self.inner.state.lock();
            state.record = None;
            state.refresh = None;
            state.epoch += 1;
        }
        info!("Credential cache cleared");

        let _guard = self.inner.persist_lock.lock().await;
        if let Err(e) = self.inner.store.remove(&self.inner.config.storage_key).await {
            warn!("Failed to remove persisted credential: {}", e);
        }
    }
}

enum Persist {
    Store(CredentialRecord),
    Remove,
    Skip,
}

impl CacheInner {
    async fn load_persisted(&self, epoch: u64) {
        let key = &self.config.storage_key;
        let stored = match self.store.get(key).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!("Failed to load persisted credential: {}", e);
                return;
            }
        };
        let Some(json) = stored else {
            debug!("No persisted credential");
            return;
        };

        match serde_json::from_str::<CredentialRecord>(&json) {
            Ok(record) if record.is_usable(self.config.safety_margin) => {
                let mut state = self.state.lock();
                if state.epoch == epoch && state.record.is_none() {
                    info!("Restored persisted credential (expires {})", record.expires_at);
                    state.record = Some(record);
                }
                return;
            }
            Ok(record) => debug!(
                "Persisted credential expires {}, discarding",
                record.expires_at
            ),
            Err(e) => warn!("Persisted credential unreadable, discarding: {}", e),
        }

        self.write_persisted(epoch, Persist::Remove).await;
    }

    async fn settle_refresh(&self, id: u64, epoch: u64, token: Option<String>) -> Option<String> {
        let persist = {
            let mut state = self.state.lock();
            if state.refresh.as_ref().is_some_and(|flight| flight.id == id) {
                state.refresh = None;
            }

            if state.epoch != epoch {
                debug!("Credential cache cleared during refresh, result not cached");
                Persist::Skip
            } else {
                match &token {
                    Some(token) => {
                        let record = CredentialRecord::issue(token.clone(), self.config.token_lifetime);
                        state.record = Some(record.clone());
                        Persist::Store(record)
                    }
                    None => {
                        state.record = None;
                        Persist::Remove
                    }
                }
            }
        };

        match &persist {
            Persist::Store(record) => info!("Credential refreshed (expires {})", record.expires_at),
            Persist::Remove => warn!("Identity provider returned no credential, cache cleared"),
            Persist::Skip => {}
        }
        self.write_persisted(epoch, persist).await;

        token
    }

    /// Apply a storage change unless the cache was cleared since `epoch`.
    ///
    /// Failures are logged; the in-memory state stays authoritative.
    async fn write_persisted(&self, epoch: u64, persist: Persist) {
        let _guard = self.persist_lock.lock().await;
        if self.state.lock().epoch != epoch {
            return;
        }

        let key = &self.config.storage_key;
        let result = match persist {
            Persist::Store(record) => match serde_json::to_string(&record) {
                Ok(json) => self.store.set(key, &json).await,
                Err(e) => Err(e.into()),
            },
            Persist::Remove => self.store.remove(key).await,
            Persist::Skip => Ok(()),
        };

        if let Err(e) = result {
            warn!("Failed to persist credential state: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::InMemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const CREDENTIAL_KEY: &str = crate::config::CREDENTIAL_STORAGE_KEY;

    async fn exploding_provider() -> Option<String> {
        panic!("identity provider exploded")
    }

    fn cache_with(store: &InMemoryStore) -> CredentialCache {
        CredentialCache::new(Arc::new(store.clone()), CredentialCacheConfig::default())
    }

    #[tokio::test]
    async fn test_fetches_once_then_serves_cache() {
        let store = InMemoryStore::new();
        let cache = cache_with(&store);
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = calls.clone();
            let token = cache
                .get_token(move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Some("long-lived".to_string())
                })
                .await;
            assert_eq!(token, Some("long-lived".to_string()));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.peek_token(), Some("long-lived".to_string()));
    }

    #[tokio::test]
    async fn test_refresh_is_persisted() {
        let store = InMemoryStore::new();
        let cache = cache_with(&store);

        cache.get_token(|| async { Some("persist-me".to_string()) }).await;

        let json = store.entry(&cache.config().storage_key).unwrap();
        let record: CredentialRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(record.token, "persist-me");
        assert!(record.issued_at < record.expires_at);
    }

    #[tokio::test]
    async fn test_persistence_failure_is_not_surfaced() {
        let store = InMemoryStore::new();
        store.set_set_should_fail(true);
        let cache = cache_with(&store);

        let token = cache.get_token(|| async { Some("memory-only".to_string()) }).await;
        assert_eq!(token, Some("memory-only".to_string()));
        assert_eq!(cache.peek_token(), Some("memory-only".to_string()));
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_fetch_clears_everything() {
        let store = InMemoryStore::new();
        let config = CredentialCacheConfig {
            // Never usable, so every call refreshes.
            token_lifetime: Duration::from_secs(60),
            ..CredentialCacheConfig::default()
        };
        let cache = CredentialCache::new(Arc::new(store.clone()), config);

        cache.get_token(|| async { Some("first".to_string()) }).await;
        assert!(store.entry(CREDENTIAL_KEY).is_some());

        let token = cache.get_token(|| async { None }).await;
        assert_eq!(token, None);
        assert_eq!(cache.peek_token(), None);
        assert_eq!(store.entry(CREDENTIAL_KEY), None);
    }

    #[tokio::test]
    async fn test_initialize_restores_usable_record() {
        let record = CredentialRecord::issue("restored", Duration::from_secs(3000));
        let store =
            InMemoryStore::with_entry(CREDENTIAL_KEY, &serde_json::to_string(&record).unwrap());
        let cache = cache_with(&store);

        cache.initialize().await;
        assert_eq!(cache.peek_token(), Some("restored".to_string()));

        let token = cache.get_token(exploding_provider).await;
        assert_eq!(token, Some("restored".to_string()));
    }

    #[tokio::test]
    async fn test_initialize_discards_corrupt_record() {
        let store = InMemoryStore::with_entry(CREDENTIAL_KEY, "{not json");
        let cache = cache_with(&store);

        cache.initialize().await;
        assert_eq!(cache.peek_token(), None);
        assert_eq!(store.entry(CREDENTIAL_KEY), None);
    }

    #[tokio::test]
    async fn test_initialize_tolerates_storage_failure() {
        let store = InMemoryStore::new();
        store.set_get_should_fail(true);
        let cache = cache_with(&store);

        cache.initialize().await;
        let token = cache.get_token(|| async { Some("fresh".to_string()) }).await;
        assert_eq!(token, Some("fresh".to_string()));
    }

    #[tokio::test]
    async fn test_clear_cache_forces_new_fetch() {
        let store = InMemoryStore::new();
        let cache = cache_with(&store);

        cache.get_token(|| async { Some("old".to_string()) }).await;
        cache.clear_cache().await;
        assert_eq!(cache.peek_token(), None);
        assert_eq!(store.entry(CREDENTIAL_KEY), None);

        let token = cache.get_token(|| async { Some("new".to_string()) }).await;
        assert_eq!(token, Some("new".to_string()));
    }

    #[tokio::test]
    async fn test_panicking_fetch_yields_none() {
        let cache = cache_with(&InMemoryStore::new());
        let token = cache.get_token(exploding_provider).await;
        assert_eq!(token, None);

        // The failed flight does not wedge later refreshes.
        let token = cache.get_token(|| async { Some("recovered".to_string()) }).await;
        assert_eq!(token, Some("recovered".to_string()));
    }

    #[tokio::test]
    async fn test_panicking_fetch_closure_does_not_wedge_cache() {
        let cache = cache_with(&InMemoryStore::new());

        // The closure itself panics before producing a future.
        let failing = cache.clone();
        let token = tokio::spawn(async move {
            failing
                .get_token(|| -> std::future::Ready<Option<String>> {
                    panic!("identity provider closure exploded")
                })
                .await
        })
        .await
        .expect("caller task must not panic");
        assert_eq!(token, None);

        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let token = cache
            .get_token(move || async move {
                counted.fetch_add(1, Ordering::SeqCst);
                Some("after-panic".to_string())
            })
            .await;
        assert_eq!(token, Some("after-panic".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
