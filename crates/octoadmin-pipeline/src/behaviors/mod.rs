//! The seven pipeline behaviors, outermost first.

pub mod authorization;
pub mod caching;
pub mod exception;
pub mod invalidation;
pub mod logging;
pub mod performance;
pub mod validation;

pub use authorization::AuthorizationBehavior;
pub use caching::CachingBehavior;
pub use exception::ExceptionTranslationBehavior;
pub use invalidation::CacheInvalidationBehavior;
pub use logging::LoggingBehavior;
pub use performance::PerformanceBehavior;
pub use validation::ValidationBehavior;
