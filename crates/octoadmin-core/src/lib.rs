pub mod error;
pub mod identity;
pub mod outcome;
pub mod token;

pub use error::{ErrorCategory, ErrorKind, PersistenceError, PersistenceErrorKind, PipelineError, Result};
pub use identity::Identity;
pub use outcome::{Failure, FieldError, Outcome};
pub use token::{InvalidationToken, InvalidationTokens};
