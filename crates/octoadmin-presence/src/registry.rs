//! Presence registry.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::{ArcSwap, Guard};
use dashmap::DashMap;
use tracing::{debug, trace};

use crate::compute::{Computed, DependencyGraph, InvalidationScope};
use crate::entry::{PresenceEntry, PresenceSet};
use crate::notifier::PresenceNotifier;

/// Context holding every connected identity.
pub const ONLINE_CONTEXT: &str = "online";

/// Dependency key invalidated whenever a context appears or is released.
const CONTEXTS_KEY: &str = "presence:contexts";

fn context_key(context: &str) -> String {
    format!("presence:{context}")
}

struct ContextSlot {
    members: ArcSwap<PresenceSet>,
    snapshot: Computed<Vec<PresenceEntry>>,
}

impl ContextSlot {
    fn new() -> Self {
        Self {
            members: ArcSwap::from_pointee(PresenceSet::new()),
            snapshot: Computed::new(),
        }
    }
}

/// Counters for monitoring.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceStats {
    pub contexts: usize,
    pub mutations: u64,
    /// Compare-and-swap attempts lost to a concurrent writer.
    pub cas_retries: u64,
    pub suppressed_invalidations: u64,
    /// Snapshot recomputations across all contexts.
    pub snapshot_computations: u64,
    /// Dependency keys with a live token.
    pub tracked_keys: usize,
}

/// Concurrently mutated presence sets, one per context.
pub struct PresenceRegistry {
    contexts: DashMap<String, Arc<ContextSlot>>,
    graph: DependencyGraph,
    summary: Computed<BTreeMap<String, usize>>,
    notifier: Option<Arc<dyn PresenceNotifier>>,
    mutations: AtomicU64,
    cas_retries: AtomicU64,
    snapshot_computations: AtomicU64,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self {
            contexts: DashMap::new(),
            graph: DependencyGraph::new(),
            summary: Computed::new(),
            notifier: None,
            mutations: AtomicU64::new(0),
            cas_retries: AtomicU64::new(0),
            snapshot_computations: AtomicU64::new(0),
        }
    }

    pub fn with_notifier(notifier: Arc<dyn PresenceNotifier>) -> Self {
        Self {
            notifier: Some(notifier),
            ..Self::new()
        }
    }

    /// Add `entry` to `context`. Returns `false` if its identity was already present.
    pub async fn add(&self, context: &str, entry: PresenceEntry) -> bool {
        self.add_in(context, entry, InvalidationScope::root()).await
    }

    pub async fn add_in(&self, context: &str, entry: PresenceEntry, scope: InvalidationScope) -> bool {
        let slot = loop {
            let slot = self.slot_or_create(context, scope);
            if !self.mutate(&slot, |set| set.with_entry(entry.clone())) {
                return false;
            }
            if self.is_registered(context, &slot) {
                break slot;
            }
            // The slot was released while empty; the write went nowhere.
            trace!(context = %context, "context released during add, retrying");
        };
        debug!(context = %context, identity = %entry.identity, "presence added");
        self.propagate(context, &slot, scope).await;
        true
    }

    /// Remove `identity` from `context`. Returns `false` if it was absent.
    pub async fn remove(&self, context: &str, identity: &str) -> bool {
        self.remove_in(context, identity, InvalidationScope::root()).await
    }

    pub async fn remove_in(&self, context: &str, identity: &str, scope: InvalidationScope) -> bool {
        let Some(slot) = self.slot(context) else {
            return false;
        };
        if !self.mutate(&slot, |set| set.without(identity)) {
            return false;
        }
        debug!(context = %context, identity = %identity, "presence removed");
        self.propagate(context, &slot, scope).await;
        self.release_if_empty(context, &slot, scope);
        true
    }

    /// Remove `identity` from every context. Returns the contexts it left.
    pub async fn remove_all(&self, identity: &str) -> Vec<String> {
        self.remove_all_in(identity, InvalidationScope::root()).await
    }

    pub async fn remove_all_in(&self, identity: &str, scope: InvalidationScope) -> Vec<String> {
        let mut left = Vec::new();
        for (context, slot) in self.slots() {
            if self.mutate(&slot, |set| set.without(identity)) {
                self.propagate(&context, &slot, scope).await;
                self.release_if_empty(&context, &slot, scope);
                left.push(context);
            }
        }
        if !left.is_empty() {
            debug!(identity = %identity, contexts = ?left, "presence removed from all contexts");
        }
        left
    }

    /// Remove every member of `context`. Returns `false` if it was already empty.
    pub async fn clear(&self, context: &str) -> bool {
        let Some(slot) = self.slot(context) else {
            return false;
        };
        let cleared = self.mutate(&slot, |set| (!set.is_empty()).then(PresenceSet::new));
        if cleared {
            debug!(context = %context, "presence context cleared");
            self.propagate(context, &slot, InvalidationScope::root()).await;
            self.release_if_empty(context, &slot, InvalidationScope::root());
        }
        cleared
    }

    /// Mark `entry` online.
    pub async fn connect(&self, entry: PresenceEntry) -> bool {
        self.add(ONLINE_CONTEXT, entry).await
    }

    /// Drop `identity` from the online set and every session context.
    pub async fn disconnect(&self, identity: &str) -> Vec<String> {
        self.remove_all(identity).await
    }

    /// Memoized member list of `context`.
    pub fn snapshot(&self, context: &str) -> Arc<Vec<PresenceEntry>> {
        self.snapshot_in(context, InvalidationScope::root())
    }

    /// Like [`snapshot`](Self::snapshot), but returns an empty interim list
    /// while `scope` is active instead of reading a mutation in progress.
    pub fn snapshot_in(&self, context: &str, scope: InvalidationScope) -> Arc<Vec<PresenceEntry>> {
        if scope.is_active() {
            trace!(context = %context, "interim snapshot during invalidation");
            return Arc::new(Vec::new());
        }
        match self.slot(context) {
            Some(slot) => self.compute_snapshot(context, &slot, false),
            None => Arc::new(Vec::new()),
        }
    }

    /// Online users.
    pub fn online(&self) -> Arc<Vec<PresenceEntry>> {
        self.snapshot(ONLINE_CONTEXT)
    }

    pub fn contains(&self, context: &str, identity: &str) -> bool {
        self.slot(context)
            .is_some_and(|slot| slot.members.load().contains(identity))
    }

    /// Every context currently holding members, plus the online context, sorted.
    pub fn contexts(&self) -> Vec<String> {
        let mut names: Vec<String> = self.contexts.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Member count per non-empty context, memoized over every context.
    pub fn summary(&self) -> Arc<BTreeMap<String, usize>> {
        let mut dependencies = vec![CONTEXTS_KEY.to_string()];
        let slots = self.slots();
        dependencies.extend(slots.iter().map(|(context, _)| context_key(context)));

        self.summary.get(&self.graph, &dependencies, || {
            slots
                .iter()
                .map(|(context, slot)| (context.clone(), slot.members.load().len()))
                .filter(|(_, count)| *count > 0)
                .collect()
        })
    }

    pub fn stats(&self) -> PresenceStats {
        PresenceStats {
            contexts: self.contexts.len(),
            mutations: self.mutations.load(Ordering::Relaxed),
            cas_retries: self.cas_retries.load(Ordering::Relaxed),
            suppressed_invalidations: self.graph.suppressed(),
            snapshot_computations: self.snapshot_computations.load(Ordering::Relaxed),
            tracked_keys: self.graph.len(),
        }
    }

    fn slot(&self, context: &str) -> Option<Arc<ContextSlot>> {
        self.contexts.get(context).map(|slot| Arc::clone(slot.value()))
    }

    fn slot_or_create(&self, context: &str, scope: InvalidationScope) -> Arc<ContextSlot> {
        if let Some(slot) = self.slot(context) {
            return slot;
        }
        let mut created = false;
        let slot = self
            .contexts
            .entry(context.to_string())
            .or_insert_with(|| {
                created = true;
                Arc::new(ContextSlot::new())
            })
            .clone();
        if created {
            self.invalidate_key(CONTEXTS_KEY, scope);
        }
        slot
    }

    fn is_registered(&self, context: &str, slot: &Arc<ContextSlot>) -> bool {
        self.contexts
            .get(context)
            .is_some_and(|current| Arc::ptr_eq(current.value(), slot))
    }

    /// Drop `slot` if it is still the registered slot for `context` and
    /// empty. The online context is never released.
    fn release_if_empty(&self, context: &str, slot: &Arc<ContextSlot>, scope: InvalidationScope) {
        if context == ONLINE_CONTEXT {
            return;
        }
        let released = self
            .contexts
            .remove_if(context, |_, current| {
                Arc::ptr_eq(current, slot) && current.members.load().is_empty()
            })
            .is_some();
        if released {
            self.graph.retire(&context_key(context));
            self.invalidate_key(CONTEXTS_KEY, scope);
            trace!(context = %context, "empty presence context released");
        }
    }

    /// Signal every dependent of `key`. Inside an active scope the signal is
    /// suppressed and only this registry's own summary memo is dropped.
    fn invalidate_key(&self, key: &str, scope: InvalidationScope) -> bool {
        if self.graph.invalidate(key, scope) {
            return true;
        }
        self.summary.invalidate();
        false
    }

    fn slots(&self) -> Vec<(String, Arc<ContextSlot>)> {
        self.contexts
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect()
    }

    /// Swap in `change(current)` with compare-and-swap, retrying on conflict.
    ///
    /// `change` returning `None` means there is nothing to do.
    fn mutate<F>(&self, slot: &ContextSlot, change: F) -> bool
    where
        F: Fn(&PresenceSet) -> Option<PresenceSet>,
    {
        let mut current = slot.members.load_full();
        loop {
            let Some(next) = change(&current) else {
                return false;
            };
            let previous = slot.members.compare_and_swap(&current, Arc::new(next));
            if Arc::ptr_eq(&*previous, &current) {
                self.mutations.fetch_add(1, Ordering::Relaxed);
                return true;
            }
            self.cas_retries.fetch_add(1, Ordering::Relaxed);
            current = Guard::into_inner(previous);
        }
    }

    /// Stale the context's dependents and notify subscribers with a
    /// freshly computed snapshot. Without a notifier the snapshot is left
    /// for the next read to recompute.
    ///
    /// Inside an active scope only the registry's own memos are dropped: no
    /// dependents are signalled and nobody is notified.
    async fn propagate(&self, context: &str, slot: &ContextSlot, scope: InvalidationScope) {
        if !self.invalidate_key(&context_key(context), scope) {
            slot.snapshot.invalidate();
            return;
        }

        let Some(notifier) = &self.notifier else {
            slot.snapshot.invalidate();
            return;
        };
        let snapshot = self.compute_snapshot(context, slot, true);
        notifier
            .presence_changed(context, snapshot, scope.enter())
            .await;
    }

    fn compute_snapshot(&self, context: &str, slot: &ContextSlot, force: bool) -> Arc<Vec<PresenceEntry>> {
        let dependencies = [context_key(context)];
        let compute = || {
            self.snapshot_computations.fetch_add(1, Ordering::Relaxed);
            slot.members.load().to_vec()
        };
        if force {
            slot.snapshot.refresh(&self.graph, &dependencies, compute)
        } else {
            slot.snapshot.get(&self.graph, &dependencies, compute)
        }
    }
}

impl Default for PresenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PresenceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresenceRegistry")
            .field("stats", &self.stats())
            .field("has_notifier", &self.notifier.is_some())
            .finish()
    }
}
