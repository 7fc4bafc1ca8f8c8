//! DashMap-backed cache store.

use std::collections::{BTreeSet, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use octoadmin_core::{InvalidationToken, InvalidationTokens, PipelineError};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::entry::{CacheEntry, CacheOptions, CacheValue};
use crate::flight::{InFlight, LeaderGuard};

/// Errors produced by the store itself (as opposed to the computation).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    /// The key holds a value of another type than the one requested.
    #[error("cached value for key '{key}' has a different type")]
    TypeMismatch { key: String },
}

impl From<CacheError> for PipelineError {
    fn from(err: CacheError) -> Self {
        PipelineError::unexpected(err.to_string())
    }
}

/// Store configuration.
#[derive(Debug, Clone)]
pub struct CacheStoreConfig {
    /// TTL applied to entries written without one. `None` keeps them until invalidated.
    pub default_ttl: Option<Duration>,
    /// How often the background sweeper drops stale entries.
    pub sweep_interval: Duration,
}

impl Default for CacheStoreConfig {
    fn default() -> Self {
        Self {
            default_ttl: None,
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// Cache statistics for monitoring.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Entries physically present (live or awaiting sweep).
    pub entries: usize,
    /// Keys with a computation in progress.
    pub in_flight: usize,
    pub hits: u64,
    pub misses: u64,
    /// Callers that waited on another caller's computation.
    pub coalesced: u64,
    /// Computations actually started.
    pub computations: u64,
    /// Entries dropped because they were expired or invalidated.
    pub evictions: u64,
    /// Invalidation tokens registered for keys, tags and namespaces.
    pub tokens: usize,
}

impl CacheStats {
    /// Calculate hit rate as a percentage.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

/// Key/tag/token-addressable value cache.
///
/// Entry writes and removals are single DashMap operations, never held
/// across an `.await`. Group invalidation (tag or token namespace) flips
/// one [`InvalidationToken`], so readers never see half a group.
pub struct CacheStore {
    entries: DashMap<String, CacheEntry>,
    /// tag → keys, used for physical removal only; liveness comes from tokens.
    tag_index: DashMap<String, HashSet<String>>,
    key_tokens: InvalidationTokens,
    tag_tokens: InvalidationTokens,
    namespace_tokens: InvalidationTokens,
    in_flight: DashMap<String, Arc<InFlight>>,
    config: CacheStoreConfig,
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
    computations: AtomicU64,
    evictions: AtomicU64,
}

impl CacheStore {
    pub fn new(config: CacheStoreConfig) -> Self {
        Self {
            entries: DashMap::new(),
            tag_index: DashMap::new(),
            key_tokens: InvalidationTokens::new(),
            tag_tokens: InvalidationTokens::new(),
            namespace_tokens: InvalidationTokens::new(),
            in_flight: DashMap::new(),
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
            computations: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &CacheStoreConfig {
        &self.config
    }

    /// Get a live value. Returns `None` on miss, expiry, invalidation or
    /// when the stored value has another type.
    pub fn get<V: Send + Sync + 'static>(&self, key: &str) -> Option<Arc<V>> {
        match self.lookup(key) {
            Some(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                value.downcast::<V>().ok()
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.lookup(key).is_some()
    }

    /// Write `value` under `key`, replacing any previous entry.
    pub fn insert<V: Send + Sync + 'static>(&self, key: &str, value: V, options: &CacheOptions) {
        let dependencies = self.capture_dependencies(key, options);
        self.publish(key, Arc::new(value), options, dependencies);
    }

    /// Return the live value for `key`, or run `compute` and publish its result.
    ///
    /// At most one `compute` runs per key at a time: callers missing while a
    /// computation is in flight wait for it and receive the same value (or
    /// the same error). Errors are handed to waiters but never cached. If the
    /// computing caller is dropped, one waiter takes over.
    ///
    /// A result whose key, tags or token namespace were invalidated while it
    /// was being computed is returned but not stored.
    pub async fn get_or_compute<V, E, F, Fut>(
        &self,
        key: &str,
        options: &CacheOptions,
        compute: F,
    ) -> Result<Arc<V>, E>
    where
        V: Send + Sync + 'static,
        E: Clone + Send + Sync + 'static + From<CacheError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let guard = loop {
            if let Some(value) = self.lookup(key) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                trace!(key = %key, "cache hit");
                return Self::typed(key, value);
            }

            let flight = match self.in_flight.entry(key.to_string()) {
                Entry::Occupied(occupied) => Arc::clone(occupied.get()),
                Entry::Vacant(vacant) => {
                    let flight = Arc::new(InFlight::new());
                    vacant.insert(Arc::clone(&flight));
                    break LeaderGuard::new(&self.in_flight, key.to_string(), flight);
                }
            };

            self.coalesced.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "waiting for in-flight computation");
            match flight.wait().await {
                Some(Ok(value)) => return Self::typed(key, value),
                Some(Err(error)) => return Err(Self::typed_error(key, error)),
                None => continue,
            }
        };

        // The previous leader may have published between our lookup and the marker.
        if let Some(value) = self.lookup(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            guard.complete(Ok(Arc::clone(&value)));
            return Self::typed(key, value);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        self.computations.fetch_add(1, Ordering::Relaxed);
        trace!(key = %key, "cache miss, computing");

        let dependencies = self.capture_dependencies(key, options);
        let result = match compute().await {
            Ok(value) => {
                let value: CacheValue = Arc::new(value);
                self.publish(key, Arc::clone(&value), options, dependencies);
                guard.complete(Ok(Arc::clone(&value)));
                Self::typed(key, value)
            }
            Err(error) => {
                drop(dependencies);
                let shared: CacheValue = Arc::new(error.clone());
                guard.complete(Err(shared));
                Err(error)
            }
        };
        // No-op when the value was published; the entry holds the tokens.
        self.release_tokens(key, options.tags.iter(), options.token.as_deref());
        result
    }

    /// Remove the entry at `key`. No-op if absent.
    ///
    /// Also cancels the key's token so a computation already in flight for
    /// `key` does not publish a pre-removal value.
    pub fn remove(&self, key: &str) -> bool {
        self.key_tokens.invalidate(key);
        match self.entries.remove(key) {
            Some((_, entry)) => {
                self.unindex(key, entry.tags.iter());
                self.release_entry(entry);
                debug!(key = %key, "cache entry removed");
                true
            }
            None => false,
        }
    }

    /// Remove every entry carrying `tag`. Returns how many were dropped.
    pub fn remove_tag(&self, tag: &str) -> usize {
        self.tag_tokens.invalidate(tag);

        let Some((_, keys)) = self.tag_index.remove(tag) else {
            return 0;
        };

        let now = Instant::now();
        let mut removed = 0;
        for key in keys {
            let dropped = self
                .entries
                .remove_if(&key, |_, entry| entry.has_tag(tag) && !entry.is_live(now));
            if let Some((_, entry)) = dropped {
                self.unindex(&key, entry.tags.iter().filter(|t| t.as_str() != tag));
                self.release_entry(entry);
                removed += 1;
            }
        }

        self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
        debug!(tag = %tag, removed, "cache tag invalidated");
        removed
    }

    /// The live token for a namespace. Readers may hold it to learn when
    /// the namespace is invalidated.
    pub fn token(&self, namespace: &str) -> InvalidationToken {
        self.namespace_tokens.current(namespace)
    }

    /// Cancel the namespace's token; every entry written against it goes stale.
    pub fn invalidate_token(&self, namespace: &str) -> bool {
        let cancelled = self.namespace_tokens.invalidate(namespace);
        debug!(namespace = %namespace, cancelled, "cache token invalidated");
        cancelled
    }

    /// Drop every entry and stale every in-flight computation.
    pub fn clear(&self) {
        self.key_tokens.invalidate_all();
        self.tag_tokens.invalidate_all();
        self.entries.clear();
        self.tag_index.clear();
    }

    /// Physically remove expired and invalidated entries, then forget
    /// tokens that no entry, computation or reader holds any more.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut dead: Vec<(String, BTreeSet<String>)> = Vec::new();
        self.entries.retain(|key, entry| {
            if entry.is_live(now) {
                true
            } else {
                dead.push((key.clone(), entry.tags.clone()));
                false
            }
        });

        for (key, tags) in &dead {
            self.unindex(key, tags.iter());
        }

        if !dead.is_empty() {
            self.evictions
                .fetch_add(dead.len() as u64, Ordering::Relaxed);
        }

        let released = self.key_tokens.release_unheld()
            + self.tag_tokens.release_unheld()
            + self.namespace_tokens.release_unheld();
        if released > 0 {
            trace!(released, "released unused invalidation tokens");
        }
        dead.len()
    }

    /// Run [`sweep`](Self::sweep) every `sweep_interval` until `shutdown` fires.
    pub fn spawn_sweeper(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let store = Arc::clone(self);
        let period = self.config.sweep_interval.max(Duration::from_millis(10));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("cache sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let removed = store.sweep();
                        if removed > 0 {
                            debug!(removed, "swept stale cache entries");
                        }
                    }
                }
            }
        })
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            in_flight: self.in_flight.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            computations: self.computations.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            tokens: self.key_tokens.len() + self.tag_tokens.len() + self.namespace_tokens.len(),
        }
    }

    fn lookup(&self, key: &str) -> Option<CacheValue> {
        let now = Instant::now();
        let stale = match self.entries.get(key) {
            Some(entry) if entry.is_live(now) => return Some(Arc::clone(&entry.value)),
            Some(_) => true,
            None => false,
        };

        if stale {
            let dropped = self.entries.remove_if(key, |_, entry| !entry.is_live(now));
            if let Some((_, entry)) = dropped {
                self.unindex(key, entry.tags.iter());
                self.release_entry(entry);
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
        None
    }

    fn capture_dependencies(&self, key: &str, options: &CacheOptions) -> Vec<InvalidationToken> {
        let mut dependencies = Vec::with_capacity(options.tags.len() + 2);
        dependencies.push(self.key_tokens.current(key));
        dependencies.extend(options.tags.iter().map(|tag| self.tag_tokens.current(tag)));
        if let Some(namespace) = &options.token {
            dependencies.push(self.namespace_tokens.current(namespace));
        }
        dependencies
    }

    fn publish(
        &self,
        key: &str,
        value: CacheValue,
        options: &CacheOptions,
        dependencies: Vec<InvalidationToken>,
    ) -> bool {
        if dependencies.iter().any(|t| t.is_invalidated()) {
            debug!(key = %key, "invalidated during computation, not caching");
            return false;
        }

        let options = options.clone().with_default_ttl(self.config.default_ttl);
        let entry = CacheEntry::new(key.to_string(), value, &options, dependencies);
        let tags = entry.tags.clone();
        let replaced = self.entries.insert(key.to_string(), entry);
        for tag in &tags {
            self.tag_index
                .entry(tag.clone())
                .or_default()
                .insert(key.to_string());
        }
        if let Some(old) = replaced {
            self.unindex(key, old.tags.iter().filter(|t| !tags.contains(*t)));
            self.release_entry(old);
        }
        true
    }

    /// Drop `entry` and forget whichever of its tokens are now unused.
    fn release_entry(&self, entry: CacheEntry) {
        let CacheEntry {
            key,
            tags,
            namespace,
            dependencies,
            ..
        } = entry;
        drop(dependencies);
        self.release_tokens(&key, tags.iter(), namespace.as_deref());
    }

    fn release_tokens<'a>(
        &self,
        key: &str,
        tags: impl Iterator<Item = &'a String>,
        namespace: Option<&str>,
    ) {
        self.key_tokens.release(key);
        for tag in tags {
            self.tag_tokens.release(tag);
        }
        if let Some(namespace) = namespace {
            self.namespace_tokens.release(namespace);
        }
    }

    fn unindex<'a>(&self, key: &str, tags: impl Iterator<Item = &'a String>) {
        for tag in tags {
            if let Some(mut keys) = self.tag_index.get_mut(tag) {
                keys.remove(key);
            }
            self.tag_index.remove_if(tag, |_, keys| keys.is_empty());
        }
    }

    fn typed<V, E>(key: &str, value: CacheValue) -> Result<Arc<V>, E>
    where
        V: Send + Sync + 'static,
        E: From<CacheError>,
    {
        value.downcast::<V>().map_err(|_| {
            E::from(CacheError::TypeMismatch {
                key: key.to_string(),
            })
        })
    }

    fn typed_error<E>(key: &str, error: CacheValue) -> E
    where
        E: Clone + Send + Sync + 'static + From<CacheError>,
    {
        match error.downcast::<E>() {
            Ok(error) => (*error).clone(),
            Err(_) => E::from(CacheError::TypeMismatch {
                key: key.to_string(),
            }),
        }
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new(CacheStoreConfig::default())
    }
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::oneshot;

    #[derive(Debug, Clone, PartialEq)]
    enum TestError {
        Cache(CacheError),
        Failed(String),
    }

    impl From<CacheError> for TestError {
        fn from(err: CacheError) -> Self {
            TestError::Cache(err)
        }
    }

    #[test]
    fn test_insert_get_and_replace() {
        let store = CacheStore::default();
        store.insert("customers:all", vec!["ada".to_string()], &CacheOptions::new());
        store.insert(
            "customers:all",
            vec!["ada".to_string(), "grace".to_string()],
            &CacheOptions::new(),
        );

        let value = store.get::<Vec<String>>("customers:all").unwrap();
        assert_eq!(value.len(), 2);
        assert_eq!(store.stats().entries, 1);
        assert!(store.get::<u32>("customers:all").is_none());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let store = CacheStore::default();
        store.insert("k", 1u32, &CacheOptions::new().with_tag("t"));
        assert!(store.remove("k"));
        assert!(!store.remove("k"));
        assert!(store.get::<u32>("k").is_none());
        assert_eq!(store.remove_tag("t"), 0);
    }

    #[test]
    fn test_remove_tag_drops_whole_group() {
        let store = CacheStore::default();
        let tagged = CacheOptions::new().with_tag("customers");
        store.insert("customers:all", 1u32, &tagged);
        store.insert("customers:page:1", 2u32, &tagged);
        store.insert("documents:all", 3u32, &CacheOptions::new().with_tag("documents"));

        assert_eq!(store.remove_tag("customers"), 2);
        assert!(!store.contains_key("customers:all"));
        assert!(!store.contains_key("customers:page:1"));
        assert!(store.contains_key("documents:all"));
        assert_eq!(store.remove_tag("customers"), 0);
    }

    #[test]
    fn test_entry_written_after_tag_removal_is_live() {
        let store = CacheStore::default();
        let tagged = CacheOptions::new().with_tag("customers");
        store.insert("customers:all", 1u32, &tagged);
        store.remove_tag("customers");
        store.insert("customers:all", 2u32, &tagged);
        assert_eq!(store.get::<u32>("customers:all").as_deref(), Some(&2));
    }

    #[test]
    fn test_token_invalidation_stales_dependents() {
        let store = CacheStore::default();
        let held = store.token("tenants");
        store.insert("tenants:all", 1u32, &CacheOptions::new().with_token("tenants"));
        store.insert("tenants:count", 1u32, &CacheOptions::new().with_token("tenants"));

        assert!(store.invalidate_token("tenants"));
        assert!(held.is_invalidated());
        assert!(store.get::<u32>("tenants:all").is_none());
        assert!(store.get::<u32>("tenants:count").is_none());
        assert!(!store.token("tenants").is_invalidated());
    }

    #[tokio::test]
    async fn test_expired_entries_miss_and_sweep() {
        let store = CacheStore::new(CacheStoreConfig {
            default_ttl: Some(Duration::from_millis(20)),
            ..Default::default()
        });
        store.insert("short", 1u32, &CacheOptions::new());
        store.insert("long", 1u32, &CacheOptions::new().with_ttl(Duration::from_secs(60)));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.sweep(), 1);
        assert!(store.get::<u32>("short").is_none());
        assert!(store.get::<u32>("long").is_some());
        assert_eq!(store.stats().evictions, 1);
    }

    #[tokio::test]
    async fn test_get_or_compute_hit_skips_compute() {
        let store = CacheStore::default();
        let options = CacheOptions::new();
        let first = store
            .get_or_compute::<u32, TestError, _, _>("k", &options, || async { Ok(1) })
            .await
            .unwrap();
        let second = store
            .get_or_compute::<u32, TestError, _, _>("k", &options, || async {
                panic!("should not recompute")
            })
            .await
            .unwrap();
        assert_eq!((*first, *second), (1, 1));
        let stats = store.stats();
        assert_eq!(stats.computations, 1);
        assert_eq!(stats.hits, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_misses_compute_once() {
        let store = Arc::new(CacheStore::default());
        let calls = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..50)
            .map(|_| {
                let store = Arc::clone(&store);
                let calls = Arc::clone(&calls);
                tokio::spawn(async move {
                    store
                        .get_or_compute::<String, TestError, _, _>(
                            "customers:all",
                            &CacheOptions::new(),
                            move || async move {
                                let n = calls.fetch_add(1, Ordering::SeqCst);
                                tokio::time::sleep(Duration::from_millis(50)).await;
                                Ok(format!("computed-{n}"))
                            },
                        )
                        .await
                })
            })
            .collect();

        let results = futures_util::future::join_all(tasks).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        for result in results {
            assert_eq!(result.unwrap().unwrap().as_str(), "computed-0");
        }
        assert_eq!(store.stats().in_flight, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_errors_are_shared_but_not_cached() {
        let store = Arc::new(CacheStore::default());
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let leader = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .get_or_compute::<u32, TestError, _, _>("k", &CacheOptions::new(), move || async move {
                        let _ = release_rx.await;
                        Err(TestError::Failed("db down".into()))
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let follower = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .get_or_compute::<u32, TestError, _, _>("k", &CacheOptions::new(), || async {
                        Ok(99)
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        release_tx.send(()).unwrap();

        let expected = Err(TestError::Failed("db down".into()));
        assert_eq!(leader.await.unwrap().map(|v| *v), expected);
        assert_eq!(follower.await.unwrap().map(|v| *v), expected);
        assert!(!store.contains_key("k"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_abandoned_leader_hands_over_to_waiter() {
        let store = Arc::new(CacheStore::default());

        let leader = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .get_or_compute::<u32, TestError, _, _>("k", &CacheOptions::new(), || async {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        Ok(1)
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let follower = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .get_or_compute::<u32, TestError, _, _>("k", &CacheOptions::new(), || async {
                        Ok(2)
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        leader.abort();

        let value = tokio::time::timeout(Duration::from_secs(1), follower)
            .await
            .expect("follower must not hang")
            .unwrap()
            .unwrap();
        assert_eq!(*value, 2);
        assert_eq!(store.stats().in_flight, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_invalidation_during_compute_is_not_published() {
        let store = Arc::new(CacheStore::default());
        let (started_tx, started_rx) = oneshot::channel::<()>();
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let reader = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                let options = CacheOptions::new().with_tag("customers");
                store
                    .get_or_compute::<Vec<String>, TestError, _, _>(
                        "customers:all",
                        &options,
                        move || async move {
                            let _ = started_tx.send(());
                            let _ = release_rx.await;
                            Ok(vec!["stale".to_string()])
                        },
                    )
                    .await
            })
        };

        started_rx.await.unwrap();
        store.remove_tag("customers");
        release_tx.send(()).unwrap();

        let value = reader.await.unwrap().unwrap();
        assert_eq!(value.as_slice(), ["stale".to_string()]);
        assert!(store.get::<Vec<String>>("customers:all").is_none());
    }

    #[tokio::test]
    async fn test_type_mismatch_reported() {
        let store = CacheStore::default();
        store.insert("k", "text".to_string(), &CacheOptions::new());
        let result = store
            .get_or_compute::<u32, TestError, _, _>("k", &CacheOptions::new(), || async { Ok(1) })
            .await;
        assert_eq!(
            result,
            Err(TestError::Cache(CacheError::TypeMismatch { key: "k".into() }))
        );
    }

    #[tokio::test]
    async fn test_sweeper_stops_on_shutdown() {
        let store = Arc::new(CacheStore::new(CacheStoreConfig {
            default_ttl: Some(Duration::from_millis(5)),
            sweep_interval: Duration::from_millis(10),
        }));
        store.insert("k", 1u32, &CacheOptions::new());

        let shutdown = CancellationToken::new();
        let handle = store.spawn_sweeper(shutdown.clone());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.stats().entries, 0);

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper should stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_sweep_releases_tokens_of_dropped_entries() {
        let store = CacheStore::new(CacheStoreConfig {
            default_ttl: Some(Duration::from_millis(1)),
            ..Default::default()
        });
        for i in 0..1_000 {
            let options = CacheOptions::new()
                .with_tag(format!("tenant:{i}"))
                .with_token("tenants");
            store.insert(&format!("customers:{i}"), i, &options);
        }
        assert!(store.stats().tokens > 1_000);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.sweep(), 1_000);

        let stats = store.stats();
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.tokens, 0);
        assert!(store.tag_index.is_empty());
    }

    #[test]
    fn test_removal_and_failed_reads_release_tokens() {
        let store = CacheStore::default();
        store.insert("k", 1u32, &CacheOptions::new().with_tag("a").with_tag("b"));
        store.insert("k", 2u32, &CacheOptions::new().with_tag("b"));
        assert_eq!(store.stats().tokens, 2);
        assert!(!store.tag_index.contains_key("a"));

        assert_eq!(store.remove_tag("b"), 1);
        assert_eq!(store.stats().tokens, 0);

        let result = tokio_test::block_on(store.get_or_compute::<u32, TestError, _, _>(
            "missing",
            &CacheOptions::new().with_tag("c"),
            || async { Err(TestError::Failed("boom".into())) },
        ));
        assert!(result.is_err());
        assert_eq!(store.stats().tokens, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_sweep_keeps_tokens_of_pending_computations() {
        let store = Arc::new(CacheStore::default());
        let (started_tx, started_rx) = oneshot::channel::<()>();
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let reader = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .get_or_compute::<u32, TestError, _, _>("k", &CacheOptions::new(), move || async move {
                        let _ = started_tx.send(());
                        let _ = release_rx.await;
                        Ok(1)
                    })
                    .await
            })
        };

        started_rx.await.unwrap();
        store.sweep();
        store.remove("k");
        release_tx.send(()).unwrap();

        assert_eq!(*reader.await.unwrap().unwrap(), 1);
        assert!(!store.contains_key("k"));
        assert_eq!(store.stats().tokens, 0);
    }
}
