use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, trace};

use crate::behavior::{Behavior, Flow, Next};
use crate::context::RequestContext;
use crate::request::Request;

/// Request tracing before and after the rest of the chain.
///
/// The caller identity is looked up best-effort: a lookup slower than
/// `identity_timeout` is abandoned and the request is logged without it.
#[derive(Debug)]
pub struct LoggingBehavior {
    identity_timeout: Duration,
}

impl LoggingBehavior {
    pub fn new(identity_timeout: Duration) -> Self {
        Self { identity_timeout }
    }
}

#[async_trait]
impl<R: Request> Behavior<R> for LoggingBehavior {
    fn name(&self) -> &'static str {
        "logging"
    }

    async fn handle(&self, ctx: &RequestContext, request: &R, next: Next<'_, R>) -> Flow<R::Response> {
        let user = match tokio::time::timeout(self.identity_timeout, ctx.identity()).await {
            Ok(identity) => identity.map(|i| i.name.clone()),
            Err(_) => {
                trace!(request = ctx.request_name(), "identity lookup timed out");
                None
            }
        };

        trace!(
            request = ctx.request_name(),
            correlation_id = %ctx.correlation_id(),
            user = user.as_deref().unwrap_or("anonymous"),
            "handling request"
        );

        let result = next.run(ctx, request).await;

        let elapsed_ms = ctx.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => trace!(
                request = ctx.request_name(),
                correlation_id = %ctx.correlation_id(),
                elapsed_ms,
                "request handled"
            ),
            Err(error) => debug!(
                request = ctx.request_name(),
                correlation_id = %ctx.correlation_id(),
                user = user.as_deref().unwrap_or("anonymous"),
                kind = %error.kind(),
                error = %error,
                elapsed_ms,
                "request failed"
            ),
        }
        result
    }
}
