//! Cancellable staleness signals.
//!
//! An [`InvalidationToken`] is handed out to every reader that depends on a
//! key namespace. Invalidating the namespace cancels the token those readers
//! hold and replaces it with a fresh one, so anyone still holding the old
//! token can observe that their data went stale.

use std::sync::Arc;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

/// A cancellable "this is stale now" signal.
#[derive(Debug, Clone, Default)]
pub struct InvalidationToken {
    inner: Arc<CancellationToken>,
}

impl InvalidationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark every holder of this token stale. Idempotent.
    pub fn invalidate(&self) {
        self.inner.cancel();
    }

    pub fn is_invalidated(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Resolves once the token has been invalidated.
    pub async fn invalidated(&self) {
        self.inner.cancelled().await;
    }

    /// True when this is the only handle to the token.
    fn is_unshared(&self) -> bool {
        Arc::strong_count(&self.inner) == 1
    }
}

/// Current token per namespace key. One producer (the namespace owner),
/// many consumers (readers that captured the token).
#[derive(Debug, Default)]
pub struct InvalidationTokens {
    tokens: DashMap<String, InvalidationToken>,
}

impl InvalidationTokens {
    pub fn new() -> Self {
        Self::default()
    }

    /// The live token for `key`, created on first use.
    pub fn current(&self, key: &str) -> InvalidationToken {
        if let Some(token) = self.tokens.get(key) {
            return token.clone();
        }
        self.tokens.entry(key.to_string()).or_default().clone()
    }

    /// Cancel the live token for `key`; the next [`current`](Self::current)
    /// call hands out a fresh one.
    ///
    /// Returns `false` when nobody had taken a token for `key` yet.
    pub fn invalidate(&self, key: &str) -> bool {
        match self.tokens.remove(key) {
            Some((_, token)) => {
                token.invalidate();
                tracing::trace!(key = %key, "invalidation token cancelled");
                true
            }
            None => false,
        }
    }

    /// Forget the token for `key` if nobody else holds it.
    ///
    /// Nothing is cancelled: no holder could observe it. A token still held
    /// by a reader or a pending computation stays registered, so a later
    /// [`invalidate`](Self::invalidate) reaches it.
    pub fn release(&self, key: &str) -> bool {
        self.tokens
            .remove_if(key, |_, token| token.is_unshared())
            .is_some()
    }

    /// Forget every token nobody else holds. Returns how many were dropped.
    pub fn release_unheld(&self) -> usize {
        let before = self.tokens.len();
        self.tokens.retain(|_, token| !token.is_unshared());
        before.saturating_sub(self.tokens.len())
    }

    /// Cancel every live token.
    pub fn invalidate_all(&self) -> usize {
        let keys: Vec<String> = self.tokens.iter().map(|e| e.key().clone()).collect();
        keys.iter().filter(|key| self.invalidate(key)).count()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
