//! Uniform result of a pipeline execution.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ErrorKind, PipelineError};

/// A single field-level message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Failure side of an [`Outcome`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Failure {
    pub kind: ErrorKind,
    /// Field-level errors; empty for failures that are not tied to fields.
    pub errors: Vec<FieldError>,
    /// User-safe summary message. Never contains internal detail.
    pub message: String,
    pub correlation_id: Uuid,
}

impl Failure {
    /// Translate a pipeline error into its user-facing form.
    pub fn from_error(error: &PipelineError, correlation_id: Uuid) -> Self {
        let (errors, message) = match error {
            PipelineError::Validation(errors) => (
                errors.clone(),
                "One or more validation errors occurred.".to_string(),
            ),
            PipelineError::AuthenticationRequired => (
                Vec::new(),
                "You must be signed in to perform this action.".to_string(),
            ),
            PipelineError::Forbidden { .. } => (
                Vec::new(),
                "You do not have permission to perform this action.".to_string(),
            ),
            PipelineError::NotFound { entity, .. } => {
                (Vec::new(), format!("The requested {entity} was not found."))
            }
            PipelineError::Persistence(err) => {
                let errors = err
                    .field
                    .as_ref()
                    .map(|field| vec![FieldError::new(field.clone(), err.user_message())])
                    .unwrap_or_default();
                (errors, err.user_message())
            }
            PipelineError::Cancelled => (Vec::new(), "The request was cancelled.".to_string()),
            PipelineError::Unexpected { .. } => (
                Vec::new(),
                format!("An unexpected error occurred. Reference: {correlation_id}."),
            ),
        };

        Self {
            kind: error.kind(),
            errors,
            message,
            correlation_id,
        }
    }

    /// Every human-readable message carried by this failure.
    ///
    /// Field errors when present, otherwise the summary message, so the
    /// list is never empty.
    pub fn messages(&self) -> Vec<&str> {
        if self.errors.is_empty() {
            vec![self.message.as_str()]
        } else {
            self.errors.iter().map(|e| e.message.as_str()).collect()
        }
    }
}

/// Result of sending a request: `Success(value)` or `Failure(..)`.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Success(T),
    Failure(Failure),
}

impl<T> Outcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    pub fn success(&self) -> Option<&T> {
        match self {
            Self::Success(value) => Some(value),
            Self::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Self::Success(_) => None,
            Self::Failure(failure) => Some(failure),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Self::Success(value) => Outcome::Success(f(value)),
            Self::Failure(failure) => Outcome::Failure(failure),
        }
    }

    pub fn into_result(self) -> std::result::Result<T, Failure> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Failure(failure) => Err(failure),
        }
    }
}
