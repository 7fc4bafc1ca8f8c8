//! Key/tag-addressable value cache.
//!
//! ## Addressing
//!
//! - **Key**: one live entry per key, replaced atomically on write
//! - **Tag**: many-to-many; removing a tag drops every entry carrying it
//! - **Token namespace**: entries may depend on a namespace's
//!   [`InvalidationToken`](octoadmin_core::InvalidationToken); cancelling it
//!   makes them stale
//!
//! ## Liveness
//!
//! ```text
//! entry live  ⇔  not expired  ∧  key token live  ∧  every tag token live  ∧  namespace token live
//! ```
//!
//! Tag and namespace invalidation flip a single token, so every entry in the
//! group goes stale at the same instant; physical removal follows.
//!
//! ## Stampede control
//!
//! [`CacheStore::get_or_compute`] keeps one in-flight marker per key. The
//! first miss computes, concurrent misses wait for its result.

pub mod entry;
mod flight;
pub mod store;

pub use entry::{CacheEntry, CacheOptions, CacheValue};
pub use store::{CacheError, CacheStats, CacheStore, CacheStoreConfig};
