//! Per-request execution context and the caller it runs for.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use octoadmin_core::Identity;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Resolves the identity of the current caller.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn resolve_identity(&self) -> Option<Identity>;
}

/// Identity known up front (or known to be absent).
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity(Option<Identity>);

impl StaticIdentity {
    pub fn new(identity: Identity) -> Self {
        Self(Some(identity))
    }

    pub fn anonymous() -> Self {
        Self(None)
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn resolve_identity(&self) -> Option<Identity> {
        self.0.clone()
    }
}

/// Who is sending a request, and the signal that cancels it.
#[derive(Clone)]
pub struct Caller {
    identity: Arc<dyn IdentityProvider>,
    cancellation: CancellationToken,
}

impl Caller {
    pub fn anonymous() -> Self {
        Self::with_provider(Arc::new(StaticIdentity::anonymous()))
    }

    pub fn with_identity(identity: Identity) -> Self {
        Self::with_provider(Arc::new(StaticIdentity::new(identity)))
    }

    pub fn with_provider(identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            identity,
            cancellation: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }
}

impl Default for Caller {
    fn default() -> Self {
        Self::anonymous()
    }
}

impl std::fmt::Debug for Caller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Caller")
            .field("cancelled", &self.cancellation.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// State shared by every behavior of one `send`.
pub struct RequestContext {
    correlation_id: Uuid,
    request_name: &'static str,
    started_at: Instant,
    cancellation: CancellationToken,
    provider: Arc<dyn IdentityProvider>,
    identity: OnceCell<Option<Identity>>,
}

impl RequestContext {
    pub fn new(request_name: &'static str, caller: &Caller) -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            request_name,
            started_at: Instant::now(),
            cancellation: caller.cancellation.clone(),
            provider: Arc::clone(&caller.identity),
            identity: OnceCell::new(),
        }
    }

    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    pub fn request_name(&self) -> &'static str {
        self.request_name
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Caller identity, resolved once per request.
    ///
    /// A lookup abandoned half-way (e.g. by a timeout) is retried by the
    /// next caller.
    pub async fn identity(&self) -> Option<&Identity> {
        self.identity
            .get_or_init(|| self.provider.resolve_identity())
            .await
            .as_ref()
    }

    /// Identity if it has already been resolved, without waiting.
    pub fn resolved_identity(&self) -> Option<&Identity> {
        self.identity.get().and_then(Option::as_ref)
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("correlation_id", &self.correlation_id)
            .field("request_name", &self.request_name)
            .field("identity", &self.resolved_identity().map(|i| &i.id))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl IdentityProvider for Counting {
        async fn resolve_identity(&self) -> Option<Identity> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Some(Identity::new("u1", "ada"))
        }
    }

    #[tokio::test]
    async fn test_identity_resolved_once() {
        let provider = Arc::new(Counting {
            calls: AtomicUsize::new(0),
        });
        let caller = Caller::with_provider(provider.clone());
        let ctx = RequestContext::new("Test", &caller);

        assert!(ctx.resolved_identity().is_none());
        assert_eq!(ctx.identity().await.unwrap().name, "ada");
        assert_eq!(ctx.identity().await.unwrap().id, "u1");
        assert!(ctx.resolved_identity().is_some());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_anonymous_caller() {
        let ctx = RequestContext::new("Test", &Caller::anonymous());
        assert!(ctx.identity().await.is_none());
    }

    #[test]
    fn test_cancellation_shared_with_caller() {
        let token = CancellationToken::new();
        let caller = Caller::anonymous().with_cancellation(token.clone());
        let ctx = RequestContext::new("Test", &caller);
        assert!(!ctx.is_cancelled());
        token.cancel();
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn test_correlation_ids_are_unique() {
        let caller = Caller::anonymous();
        let a = RequestContext::new("Test", &caller);
        let b = RequestContext::new("Test", &caller);
        assert_ne!(a.correlation_id(), b.correlation_id());
    }
}
