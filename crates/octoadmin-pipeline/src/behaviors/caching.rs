use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use octoadmin_cache::{CacheOptions, CacheStore};
use octoadmin_core::PipelineError;
use tracing::trace;

use crate::behavior::{Behavior, Flow, Next};
use crate::context::RequestContext;
use crate::metrics;
use crate::request::Request;

/// Read-through caching for [`Cacheable`](crate::Cacheable) requests.
///
/// Concurrent misses on one key share a single run of the inner chain
/// (see [`CacheStore::get_or_compute`]). Failures are never cached.
pub struct CachingBehavior {
    cache: Arc<CacheStore>,
    invocations: AtomicU64,
}

impl CachingBehavior {
    pub fn new(cache: Arc<CacheStore>) -> Self {
        Self {
            cache,
            invocations: AtomicU64::new(0),
        }
    }

    /// How many requests went through this behavior.
    pub fn invocations(&self) -> u64 {
        self.invocations.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl<R: Request> Behavior<R> for CachingBehavior {
    fn name(&self) -> &'static str {
        "caching"
    }

    async fn handle(&self, ctx: &RequestContext, request: &R, next: Next<'_, R>) -> Flow<R::Response> {
        self.invocations.fetch_add(1, Ordering::Relaxed);

        let Some(cacheable) = request.as_cacheable() else {
            return next.run(ctx, request).await;
        };
        if cacheable.bypass_cache() {
            trace!(request = ctx.request_name(), "cache bypassed");
            return next.run(ctx, request).await;
        }

        let key = cacheable.cache_key();
        let mut options = CacheOptions::new().with_tags(cacheable.cache_tags());
        if let Some(ttl) = cacheable.expiration() {
            options = options.with_ttl(ttl);
        }
        if let Some(namespace) = cacheable.dependency_token() {
            options = options.with_token(namespace);
        }

        let mut computed = false;
        let value = self
            .cache
            .get_or_compute::<R::Response, PipelineError, _, _>(&key, &options, || {
                computed = true;
                next.run(ctx, request)
            })
            .await?;

        if computed {
            metrics::record_cache_miss(ctx.request_name());
        } else {
            metrics::record_cache_hit(ctx.request_name());
            trace!(request = ctx.request_name(), key = %key, "served from cache");
        }
        Ok(R::Response::clone(&value))
    }
}
