//! Cache entries and write options.

use std::any::Any;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use octoadmin_core::InvalidationToken;

/// Opaque cached value. Wrapped in `Arc` so hits are a reference-count bump.
pub type CacheValue = Arc<dyn Any + Send + Sync>;

/// A cached value together with everything that decides its liveness.
#[derive(Clone)]
pub struct CacheEntry {
    pub key: String,
    pub(crate) value: CacheValue,
    pub tags: BTreeSet<String>,
    pub expires_at: Option<Instant>,
    pub cached_at: Instant,
    /// Token namespace the entry depends on.
    pub namespace: Option<String>,
    /// Tokens captured before the value was computed.
    pub(crate) dependencies: Vec<InvalidationToken>,
}

impl CacheEntry {
    pub(crate) fn new(
        key: String,
        value: CacheValue,
        options: &CacheOptions,
        dependencies: Vec<InvalidationToken>,
    ) -> Self {
        let cached_at = Instant::now();
        Self {
            key,
            value,
            tags: options.tags.iter().cloned().collect(),
            expires_at: options.ttl.map(|ttl| cached_at + ttl),
            cached_at,
            namespace: options.token.clone(),
            dependencies,
        }
    }

    /// Check if this entry has expired.
    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Live means not expired and no dependency has been invalidated.
    pub fn is_live(&self, now: Instant) -> bool {
        !self.is_expired(now) && !self.dependencies.iter().any(|t| t.is_invalidated())
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Typed view of the value.
    pub fn value<V: Send + Sync + 'static>(&self) -> Option<Arc<V>> {
        Arc::clone(&self.value).downcast::<V>().ok()
    }
}

impl std::fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEntry")
            .field("key", &self.key)
            .field("tags", &self.tags)
            .field("expires_at", &self.expires_at)
            .field("cached_at", &self.cached_at)
            .field("dependencies", &self.dependencies.len())
            .finish_non_exhaustive()
    }
}

/// How an entry is written: tags, expiry and token namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheOptions {
    pub tags: Vec<String>,
    pub ttl: Option<Duration>,
    /// Namespace whose invalidation token the entry depends on.
    pub token: Option<String>,
}

impl CacheOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Set the TTL only if none was given yet.
    pub fn with_default_ttl(mut self, ttl: Option<Duration>) -> Self {
        if self.ttl.is_none() {
            self.ttl = ttl;
        }
        self
    }

    pub fn with_token(mut self, namespace: impl Into<String>) -> Self {
        self.token = Some(namespace.into());
        self
    }
}
