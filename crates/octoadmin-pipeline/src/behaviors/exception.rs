//! Outermost behavior: panics, cancellation and failure classification.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures_util::FutureExt;
use octoadmin_core::{Failure, Outcome, PipelineError};
use tracing::{debug, error};

use crate::behavior::{Behavior, Flow, Next};
use crate::config::FailurePolicy;
use crate::context::RequestContext;
use crate::request::Request;

/// Catches whatever the inner chain throws and classifies it exactly once.
///
/// Handler faults (persistence and unexpected errors, panics) are logged at
/// error level with the correlation id. Failures that inner behaviors
/// already resolved (validation, authorization) are only logged at debug.
#[derive(Debug, Default)]
pub struct ExceptionTranslationBehavior {
    policy: FailurePolicy,
}

impl ExceptionTranslationBehavior {
    pub fn new(policy: FailurePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Convert the chain's result into the uniform outcome returned to callers.
    pub fn into_outcome<T>(result: Flow<T>, ctx: &RequestContext) -> Outcome<T> {
        match result {
            Ok(value) => Outcome::Success(value),
            Err(error) => Outcome::Failure(Failure::from_error(&error, ctx.correlation_id())),
        }
    }

    fn log_failure(&self, ctx: &RequestContext, error: &PipelineError) {
        if error.is_fault() {
            error!(
                request = ctx.request_name(),
                correlation_id = %ctx.correlation_id(),
                kind = %error.kind(),
                category = %error.category(),
                error = %error,
                "request failed"
            );
        } else {
            debug!(
                request = ctx.request_name(),
                correlation_id = %ctx.correlation_id(),
                kind = %error.kind(),
                "request rejected"
            );
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

#[async_trait]
impl<R: Request> Behavior<R> for ExceptionTranslationBehavior {
    fn name(&self) -> &'static str {
        "exception_translation"
    }

    async fn handle(&self, ctx: &RequestContext, request: &R, next: Next<'_, R>) -> Flow<R::Response> {
        if ctx.is_cancelled() {
            let error = PipelineError::Cancelled;
            self.log_failure(ctx, &error);
            return Err(error);
        }

        let guarded = AssertUnwindSafe(next.run(ctx, request)).catch_unwind();
        let caught = tokio::select! {
            biased;
            _ = ctx.cancellation().cancelled() => None,
            caught = guarded => Some(caught),
        };

        let result = match caught {
            None => Err(PipelineError::Cancelled),
            Some(Ok(result)) => result,
            Some(Err(panic)) => {
                let message = panic_message(panic.as_ref());
                if self.policy == FailurePolicy::PropagatePanics {
                    error!(
                        request = ctx.request_name(),
                        correlation_id = %ctx.correlation_id(),
                        panic = %message,
                        "request panicked"
                    );
                    std::panic::resume_unwind(panic);
                }
                Err(PipelineError::unexpected(format!("handler panicked: {message}")))
            }
        };

        if let Err(error) = &result {
            self.log_failure(ctx, error);
        }
        result
    }
}
