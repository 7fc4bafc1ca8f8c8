//! Presence tracking for online users and per-context sessions.
//!
//! Each context (a page, a connection scope, or the global
//! [`ONLINE_CONTEXT`]) holds an immutable [`PresenceSet`] behind an
//! `ArcSwap`. Writers build a new set and swap it in with compare-and-swap,
//! retrying on conflict; readers never block.
//!
//! Reads are memoized through [`Computed`] and go stale when the context's
//! dependency key is invalidated. Propagation is guarded by an explicit
//! [`InvalidationScope`] so a change that triggers further mutations does not
//! cascade.

pub mod compute;
pub mod entry;
pub mod notifier;
pub mod registry;

pub use compute::{ComputeResult, Computed, DependencyGraph, InvalidationScope};
pub use entry::{PresenceEntry, PresenceSet};
pub use notifier::{BroadcastNotifier, PresenceChange, PresenceNotifier};
pub use registry::{ONLINE_CONTEXT, PresenceRegistry, PresenceStats};
