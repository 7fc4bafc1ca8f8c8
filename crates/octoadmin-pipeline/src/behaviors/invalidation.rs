use std::sync::Arc;

use async_trait::async_trait;
use octoadmin_cache::CacheStore;
use tracing::debug;

use crate::behavior::{Behavior, Flow, Next};
use crate::context::RequestContext;
use crate::request::Request;

/// Invalidates cached reads after a [`CacheInvalidator`](crate::CacheInvalidator)
/// request succeeds: its key, then its tags, then its token.
pub struct CacheInvalidationBehavior {
    cache: Arc<CacheStore>,
}

impl CacheInvalidationBehavior {
    pub fn new(cache: Arc<CacheStore>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl<R: Request> Behavior<R> for CacheInvalidationBehavior {
    fn name(&self) -> &'static str {
        "cache_invalidation"
    }

    async fn handle(&self, ctx: &RequestContext, request: &R, next: Next<'_, R>) -> Flow<R::Response> {
        let response = next.run(ctx, request).await?;

        if let Some(invalidator) = request.as_cache_invalidator() {
            let key = invalidator.cache_key();
            if let Some(key) = &key {
                self.cache.remove(key);
            }

            let tags = invalidator.cache_tags();
            let removed: usize = tags.iter().map(|tag| self.cache.remove_tag(tag)).sum();

            let token = invalidator.invalidation_token();
            if let Some(namespace) = &token {
                self.cache.invalidate_token(namespace);
            }

            debug!(
                request = ctx.request_name(),
                correlation_id = %ctx.correlation_id(),
                key = ?key,
                tags = ?tags,
                token = ?token,
                removed,
                "cache invalidated"
            );
        }

        Ok(response)
    }
}
