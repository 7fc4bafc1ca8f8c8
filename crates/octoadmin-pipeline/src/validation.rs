use async_trait::async_trait;
use octoadmin_core::FieldError;

use crate::request::Request;

/// Checks one request and reports every problem it finds.
///
/// Must be free of side effects; all validators registered for a request
/// type run on every send, even after one of them has failed.
#[async_trait]
pub trait Validator<R: Request>: Send + Sync {
    async fn validate(&self, request: &R) -> Vec<FieldError>;
}

/// Adapts a synchronous closure into a [`Validator`].
pub struct FnValidator<F>(pub F);

#[async_trait]
impl<R, F> Validator<R> for FnValidator<F>
where
    R: Request,
    F: Fn(&R) -> Vec<FieldError> + Send + Sync,
{
    async fn validate(&self, request: &R) -> Vec<FieldError> {
        (self.0)(request)
    }
}
