//! Memoized computations that go stale when a dependency key is invalidated.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwapOption;
use octoadmin_core::{InvalidationToken, InvalidationTokens};
use tracing::trace;

/// Marks whether the current call is already propagating an invalidation.
///
/// Passed explicitly down the call chain. Invalidations issued while the
/// scope is active are suppressed, which breaks mutation → recompute →
/// mutation cycles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvalidationScope {
    depth: u32,
}

impl InvalidationScope {
    /// Outside any invalidation.
    pub const fn root() -> Self {
        Self { depth: 0 }
    }

    pub fn is_active(&self) -> bool {
        self.depth > 0
    }

    /// The scope seen by work done on behalf of an invalidation.
    #[must_use]
    pub fn enter(self) -> Self {
        Self {
            depth: self.depth.saturating_add(1),
        }
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }
}

/// Dependency keys and their current tokens.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    tokens: InvalidationTokens,
    suppressed: AtomicU64,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tokens for `keys`, to be captured before reading the state they cover.
    pub fn capture(&self, keys: &[String]) -> Vec<InvalidationToken> {
        keys.iter().map(|key| self.tokens.current(key)).collect()
    }

    /// Stale every computation depending on `key`.
    ///
    /// Returns `false` without doing anything when `scope` is active.
    pub fn invalidate(&self, key: &str, scope: InvalidationScope) -> bool {
        if scope.is_active() {
            self.suppressed.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, depth = scope.depth(), "nested invalidation suppressed");
            return false;
        }
        self.tokens.invalidate(key);
        true
    }

    /// Cancel and forget `key` because the state it covers no longer
    /// exists. Not subject to the re-entrancy guard.
    pub fn retire(&self, key: &str) {
        self.tokens.invalidate(key);
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// How many invalidations were dropped by the re-entrancy guard.
    pub fn suppressed(&self) -> u64 {
        self.suppressed.load(Ordering::Relaxed)
    }
}

/// A memoized value and the dependencies it was computed from.
#[derive(Debug)]
pub struct ComputeResult<T> {
    value: Arc<T>,
    dependencies: Vec<String>,
    tokens: Vec<InvalidationToken>,
}

impl<T> ComputeResult<T> {
    pub fn value(&self) -> &Arc<T> {
        &self.value
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// Stale once any dependency has been invalidated since capture.
    pub fn is_stale(&self) -> bool {
        self.tokens.iter().any(|t| t.is_invalidated())
    }
}

/// Lazily recomputed read.
///
/// Holds the last [`ComputeResult`] in an `ArcSwapOption`. A read returns the
/// memo while it is fresh and recomputes otherwise; nothing is recomputed
/// eagerly unless a caller asks for [`refresh`](Self::refresh).
#[derive(Debug)]
pub struct Computed<T> {
    memo: ArcSwapOption<ComputeResult<T>>,
    computations: AtomicU64,
}

impl<T> Computed<T> {
    pub fn new() -> Self {
        Self {
            memo: ArcSwapOption::empty(),
            computations: AtomicU64::new(0),
        }
    }

    /// The memoized value, recomputing with `compute` if stale or missing.
    pub fn get<F>(&self, graph: &DependencyGraph, dependencies: &[String], compute: F) -> Arc<T>
    where
        F: FnOnce() -> T,
    {
        if let Some(memo) = self.memo.load_full() {
            if !memo.is_stale() {
                return Arc::clone(&memo.value);
            }
        }
        self.refresh(graph, dependencies, compute)
    }

    /// Recompute unconditionally and memoize.
    pub fn refresh<F>(&self, graph: &DependencyGraph, dependencies: &[String], compute: F) -> Arc<T>
    where
        F: FnOnce() -> T,
    {
        // Capture first: an invalidation racing the computation leaves the memo stale.
        let tokens = graph.capture(dependencies);
        let value = Arc::new(compute());
        self.memo.store(Some(Arc::new(ComputeResult {
            value: Arc::clone(&value),
            dependencies: dependencies.to_vec(),
            tokens,
        })));
        self.computations.fetch_add(1, Ordering::Relaxed);
        value
    }

    /// The memo if present and fresh, without computing.
    pub fn peek(&self) -> Option<Arc<T>> {
        self.memo
            .load_full()
            .filter(|memo| !memo.is_stale())
            .map(|memo| Arc::clone(&memo.value))
    }

    /// Drop the memo without signalling dependents.
    pub fn invalidate(&self) {
        self.memo.store(None);
    }

    pub fn computations(&self) -> u64 {
        self.computations.load(Ordering::Relaxed)
    }
}

impl<T> Default for Computed<T> {
    fn default() -> Self {
        Self::new()
    }
}
