//! The single contract every pipeline step is built around.

use std::sync::Arc;

use async_trait::async_trait;
use octoadmin_core::PipelineError;

use crate::context::RequestContext;
use crate::request::Request;

/// Result flowing back out through the chain.
pub type Flow<T> = Result<T, PipelineError>;

/// Performs the actual work of a request.
#[async_trait]
pub trait Handler<R: Request>: Send + Sync {
    async fn handle(&self, request: &R, ctx: &RequestContext) -> Flow<R::Response>;
}

/// One cross-cutting concern wrapped around the rest of the chain.
///
/// A behavior may run `next` once, or not at all to short-circuit. `Next` is
/// consumed by [`Next::run`], so running it twice does not compile.
#[async_trait]
pub trait Behavior<R: Request>: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, ctx: &RequestContext, request: &R, next: Next<'_, R>)
    -> Flow<R::Response>;
}

/// The remainder of the chain: the behaviors still to run, then the handler.
pub struct Next<'a, R: Request> {
    behaviors: &'a [Arc<dyn Behavior<R>>],
    handler: &'a dyn Handler<R>,
}

impl<'a, R: Request> Next<'a, R> {
    pub fn new(behaviors: &'a [Arc<dyn Behavior<R>>], handler: &'a dyn Handler<R>) -> Self {
        Self { behaviors, handler }
    }

    pub async fn run(self, ctx: &RequestContext, request: &R) -> Flow<R::Response> {
        match self.behaviors.split_first() {
            Some((behavior, rest)) => {
                let next = Next {
                    behaviors: rest,
                    handler: self.handler,
                };
                behavior.handle(ctx, request, next).await
            }
            None => self.handler.handle(request, ctx).await,
        }
    }

    /// Behaviors left before the handler.
    pub fn remaining(&self) -> usize {
        self.behaviors.len()
    }
}
