use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use octoadmin_core::PipelineError;
use tracing::debug;

use crate::behavior::{Behavior, Flow, Next};
use crate::context::RequestContext;
use crate::request::Request;
use crate::validation::Validator;

/// Runs every validator registered for `R` and short-circuits with all of
/// their errors combined.
pub struct ValidationBehavior<R: Request> {
    validators: Vec<Arc<dyn Validator<R>>>,
}

impl<R: Request> ValidationBehavior<R> {
    pub fn new() -> Self {
        Self {
            validators: Vec::new(),
        }
    }

    pub fn push(&mut self, validator: Arc<dyn Validator<R>>) {
        self.validators.push(validator);
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }
}

impl<R: Request> Default for ValidationBehavior<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<R: Request> Behavior<R> for ValidationBehavior<R> {
    fn name(&self) -> &'static str {
        "validation"
    }

    async fn handle(&self, ctx: &RequestContext, request: &R, next: Next<'_, R>) -> Flow<R::Response> {
        let errors: Vec<_> = join_all(self.validators.iter().map(|v| v.validate(request)))
            .await
            .into_iter()
            .flatten()
            .collect();

        if !errors.is_empty() {
            debug!(
                request = ctx.request_name(),
                correlation_id = %ctx.correlation_id(),
                errors = errors.len(),
                "validation failed"
            );
            return Err(PipelineError::validation(errors));
        }

        next.run(ctx, request).await
    }
}
