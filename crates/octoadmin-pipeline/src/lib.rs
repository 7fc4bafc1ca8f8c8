//! Request pipeline.
//!
//! Every request is sent through a fixed chain of behaviors around its
//! handler:
//!
//! ```text
//! ExceptionTranslation → Logging → Performance → Authorization → Validation
//!     → Caching | CacheInvalidation → Handler
//! ```
//!
//! Which behaviors take part is decided per request from the capabilities it
//! exposes ([`Request::as_authorizable`], [`Request::as_cacheable`],
//! [`Request::as_cache_invalidator`]) and from the validators registered for
//! its type. The order itself never changes.

pub mod auth;
pub mod behavior;
pub mod behaviors;
pub mod config;
pub mod context;
pub mod metrics;
pub mod pipeline;
pub mod request;
pub mod validation;

pub use auth::{Authorizer, ClaimsAuthorizer};
pub use behavior::{Behavior, Flow, Handler, Next};
pub use config::{FailurePolicy, PerformanceConfig, PipelineConfig, RequestLoggingConfig};
pub use context::{Caller, IdentityProvider, RequestContext, StaticIdentity};
pub use metrics::ExecutionMetrics;
pub use pipeline::{Pipeline, PipelineBuilder};
pub use request::{
    Authorizable, AuthorizationRequirements, CacheInvalidator, Cacheable, Capabilities, Request,
};
pub use validation::{FnValidator, Validator};

pub use octoadmin_core::{FieldError, Identity, Outcome, PipelineError};
