//! Pipeline composition and the `send` entry point.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use octoadmin_cache::CacheStore;
use octoadmin_core::{Failure, Outcome, PipelineError};
use tracing::error;

use crate::auth::{Authorizer, ClaimsAuthorizer};
use crate::behavior::{Behavior, Handler, Next};
use crate::behaviors::{
    AuthorizationBehavior, CacheInvalidationBehavior, CachingBehavior,
    ExceptionTranslationBehavior, LoggingBehavior, PerformanceBehavior, ValidationBehavior,
};
use crate::config::PipelineConfig;
use crate::context::{Caller, RequestContext};
use crate::metrics::{self, ExecutionMetrics};
use crate::request::{Capabilities, Request};
use crate::validation::{FnValidator, Validator};

/// One handler per request type.
#[derive(Default)]
struct HandlerRegistry {
    handlers: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl HandlerRegistry {
    fn insert<R: Request>(&mut self, handler: Arc<dyn Handler<R>>) {
        self.handlers.insert(TypeId::of::<R>(), Box::new(handler));
    }

    fn get<R: Request>(&self) -> Option<Arc<dyn Handler<R>>> {
        self.handlers
            .get(&TypeId::of::<R>())
            .and_then(|slot| slot.downcast_ref::<Arc<dyn Handler<R>>>())
            .cloned()
    }
}

/// Validators grouped per request type, each group already wrapped in its
/// [`ValidationBehavior`].
#[derive(Default)]
struct ValidatorRegistry {
    building: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    behaviors: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl ValidatorRegistry {
    fn push<R: Request>(&mut self, validator: Arc<dyn Validator<R>>) {
        let slot = self
            .building
            .entry(TypeId::of::<R>())
            .or_insert_with(|| Box::new(ValidationBehavior::<R>::new()));
        if let Some(behavior) = slot.downcast_mut::<ValidationBehavior<R>>() {
            behavior.push(validator);
        }
    }

    fn freeze(&mut self) {
        for (type_id, behavior) in self.building.drain() {
            self.behaviors.insert(type_id, Arc::from(behavior));
        }
    }

    fn behavior<R: Request>(&self) -> Option<Arc<ValidationBehavior<R>>> {
        self.behaviors
            .get(&TypeId::of::<R>())
            .cloned()
            .and_then(|behavior| behavior.downcast::<ValidationBehavior<R>>().ok())
    }
}

/// Composes behaviors around registered handlers and executes requests.
pub struct Pipeline {
    handlers: HandlerRegistry,
    validators: ValidatorRegistry,
    exception: Arc<ExceptionTranslationBehavior>,
    logging: Arc<LoggingBehavior>,
    performance: Arc<PerformanceBehavior>,
    authorization: Arc<AuthorizationBehavior>,
    caching: Arc<CachingBehavior>,
    invalidation: Arc<CacheInvalidationBehavior>,
    cache: Arc<CacheStore>,
    default_caller: Caller,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Send `request` on behalf of the pipeline's default caller.
    pub async fn send<R: Request>(&self, request: R) -> Outcome<R::Response> {
        self.send_with(&self.default_caller, request).await
    }

    /// Send `request` on behalf of `caller`.
    ///
    /// Never panics under [`FailurePolicy::Convert`](crate::FailurePolicy):
    /// every failure comes back as [`Outcome::Failure`].
    pub async fn send_with<R: Request>(&self, caller: &Caller, request: R) -> Outcome<R::Response> {
        let ctx = RequestContext::new(request.request_name(), caller);

        let Some(handler) = self.handlers.get::<R>() else {
            return self.reject(
                &ctx,
                PipelineError::unexpected(format!(
                    "no handler registered for {}",
                    ctx.request_name()
                )),
            );
        };
        let chain = match self.compose(&request) {
            Ok(chain) => chain,
            Err(error) => return self.reject(&ctx, error),
        };

        let result = Next::new(&chain, handler.as_ref()).run(&ctx, &request).await;
        metrics::record_request(
            ctx.request_name(),
            if result.is_ok() { "success" } else { "failure" },
        );
        ExceptionTranslationBehavior::into_outcome(result, &ctx)
    }

    /// The behaviors `request` runs through, outermost first.
    pub fn compose<R: Request>(
        &self,
        request: &R,
    ) -> Result<Vec<Arc<dyn Behavior<R>>>, PipelineError> {
        let validation = self.validators.behavior::<R>();
        let capabilities = Capabilities::of(request);
        if capabilities.cacheable && capabilities.cache_invalidator {
            return Err(PipelineError::unexpected(format!(
                "{} is both cacheable and a cache invalidator",
                request.request_name()
            )));
        }

        let mut chain: Vec<Arc<dyn Behavior<R>>> = Vec::with_capacity(6);
        chain.push(self.exception.clone());
        chain.push(self.logging.clone());
        chain.push(self.performance.clone());
        if capabilities.authorizable {
            chain.push(self.authorization.clone());
        }
        if let Some(validation) = validation {
            chain.push(validation);
        }
        if capabilities.cacheable {
            chain.push(self.caching.clone());
        } else if capabilities.cache_invalidator {
            chain.push(self.invalidation.clone());
        }
        Ok(chain)
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    pub fn caching(&self) -> &CachingBehavior {
        &self.caching
    }

    pub fn execution_metrics(&self) -> &Arc<ExecutionMetrics> {
        self.performance.execution_metrics()
    }

    fn reject<T>(&self, ctx: &RequestContext, error: PipelineError) -> Outcome<T> {
        error!(
            request = ctx.request_name(),
            correlation_id = %ctx.correlation_id(),
            error = %error,
            "request could not be dispatched"
        );
        metrics::record_request(ctx.request_name(), "failure");
        Outcome::Failure(Failure::from_error(&error, ctx.correlation_id()))
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("handlers", &self.handlers.handlers.len())
            .field("validated_types", &self.validators.behaviors.len())
            .field("failure_policy", &self.exception.policy())
            .finish_non_exhaustive()
    }
}

pub struct PipelineBuilder {
    config: PipelineConfig,
    cache: Option<Arc<CacheStore>>,
    authorizer: Option<Arc<dyn Authorizer>>,
    execution_metrics: Option<Arc<ExecutionMetrics>>,
    default_caller: Caller,
    handlers: HandlerRegistry,
    validators: ValidatorRegistry,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
            cache: None,
            authorizer: None,
            execution_metrics: None,
            default_caller: Caller::anonymous(),
            handlers: HandlerRegistry::default(),
            validators: ValidatorRegistry::default(),
        }
    }

    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn cache(mut self, cache: Arc<CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = Some(authorizer);
        self
    }

    pub fn execution_metrics(mut self, metrics: Arc<ExecutionMetrics>) -> Self {
        self.execution_metrics = Some(metrics);
        self
    }

    pub fn default_caller(mut self, caller: Caller) -> Self {
        self.default_caller = caller;
        self
    }

    /// Register the handler for `R`, replacing any previous one.
    pub fn handler<R, H>(mut self, handler: H) -> Self
    where
        R: Request,
        H: Handler<R> + 'static,
    {
        self.handlers.insert::<R>(Arc::new(handler));
        self
    }

    pub fn validator<R, V>(mut self, validator: V) -> Self
    where
        R: Request,
        V: Validator<R> + 'static,
    {
        self.validators.push::<R>(Arc::new(validator));
        self
    }

    pub fn validator_fn<R, F>(self, validate: F) -> Self
    where
        R: Request,
        F: Fn(&R) -> Vec<octoadmin_core::FieldError> + Send + Sync + 'static,
    {
        self.validator::<R, _>(FnValidator(validate))
    }

    pub fn build(mut self) -> Pipeline {
        self.validators.freeze();
        let cache = self.cache.unwrap_or_default();
        let authorizer = self
            .authorizer
            .unwrap_or_else(|| Arc::new(ClaimsAuthorizer::new()));
        let execution_metrics = self.execution_metrics.unwrap_or_default();

        Pipeline {
            handlers: self.handlers,
            validators: self.validators,
            exception: Arc::new(ExceptionTranslationBehavior::new(self.config.failure_policy)),
            logging: Arc::new(LoggingBehavior::new(
                self.config.logging.identity_lookup_timeout(),
            )),
            performance: Arc::new(PerformanceBehavior::new(
                execution_metrics,
                self.config.performance,
            )),
            authorization: Arc::new(AuthorizationBehavior::new(authorizer)),
            caching: Arc::new(CachingBehavior::new(Arc::clone(&cache))),
            invalidation: Arc::new(CacheInvalidationBehavior::new(Arc::clone(&cache))),
            cache,
            default_caller: self.default_caller,
        }
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
