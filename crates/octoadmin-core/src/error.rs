use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::outcome::FieldError;

/// Subtypes of persistence failures raised by request handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistenceErrorKind {
    UniqueConstraint,
    RequiredFieldMissing,
    LengthExceeded,
    NumericRange,
    ReferenceConstraint,
    Generic,
}

impl PersistenceErrorKind {
    /// Classify a PostgreSQL SQLSTATE code.
    pub fn from_sqlstate(code: &str) -> Self {
        match code {
            "23505" => Self::UniqueConstraint,
            "23502" => Self::RequiredFieldMissing,
            "22001" => Self::LengthExceeded,
            "22003" => Self::NumericRange,
            "23503" => Self::ReferenceConstraint,
            _ => Self::Generic,
        }
    }
}

impl std::fmt::Display for PersistenceErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UniqueConstraint => write!(f, "unique_constraint"),
            Self::RequiredFieldMissing => write!(f, "required_field_missing"),
            Self::LengthExceeded => write!(f, "length_exceeded"),
            Self::NumericRange => write!(f, "numeric_range"),
            Self::ReferenceConstraint => write!(f, "reference_constraint"),
            Self::Generic => write!(f, "generic"),
        }
    }
}

/// A storage failure surfaced by a handler.
///
/// `detail` carries the raw driver message and is only ever logged;
/// [`PersistenceError::user_message`] is what callers get to see.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("persistence error ({kind}): {detail}")]
pub struct PersistenceError {
    pub kind: PersistenceErrorKind,
    /// Column or field the violation is attributed to, when known.
    pub field: Option<String>,
    pub detail: String,
}

impl PersistenceError {
    pub fn new(kind: PersistenceErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            field: None,
            detail: detail.into(),
        }
    }

    /// Build from a PostgreSQL SQLSTATE code and the driver's message.
    pub fn from_sqlstate(code: &str, detail: impl Into<String>) -> Self {
        Self::new(PersistenceErrorKind::from_sqlstate(code), detail)
    }

    pub fn unique(field: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(PersistenceErrorKind::UniqueConstraint, detail).with_field(field)
    }

    pub fn required(field: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(PersistenceErrorKind::RequiredFieldMissing, detail).with_field(field)
    }

    pub fn generic(detail: impl Into<String>) -> Self {
        Self::new(PersistenceErrorKind::Generic, detail)
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Message that is safe to show to an end user.
    pub fn user_message(&self) -> String {
        let field = self.field.as_deref();
        match (self.kind, field) {
            (PersistenceErrorKind::UniqueConstraint, Some(f)) => {
                format!("A record with the same {f} already exists.")
            }
            (PersistenceErrorKind::UniqueConstraint, None) => {
                "A record with the same value already exists.".to_string()
            }
            (PersistenceErrorKind::RequiredFieldMissing, Some(f)) => {
                format!("The field '{f}' is required.")
            }
            (PersistenceErrorKind::RequiredFieldMissing, None) => {
                "A required field is missing.".to_string()
            }
            (PersistenceErrorKind::LengthExceeded, Some(f)) => {
                format!("The value of '{f}' is too long.")
            }
            (PersistenceErrorKind::LengthExceeded, None) => {
                "One of the values is too long.".to_string()
            }
            (PersistenceErrorKind::NumericRange, Some(f)) => {
                format!("The value of '{f}' is out of range.")
            }
            (PersistenceErrorKind::NumericRange, None) => {
                "A numeric value is out of range.".to_string()
            }
            (PersistenceErrorKind::ReferenceConstraint, _) => {
                "The record is referenced by other data and cannot be changed.".to_string()
            }
            (PersistenceErrorKind::Generic, _) => {
                "The data could not be saved. Please try again.".to_string()
            }
        }
    }
}

/// Errors flowing through the request pipeline.
///
/// `Validation`, `AuthenticationRequired` and `Forbidden` are produced by
/// pipeline behaviors when they short-circuit. `NotFound`, `Persistence`
/// and `Unexpected` come out of handlers and are classified once at the
/// exception translation boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error("validation failed with {} error(s)", .0.len())]
    Validation(Vec<FieldError>),

    #[error("authentication required")]
    AuthenticationRequired,

    #[error("forbidden: {reason}")]
    Forbidden { reason: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("request cancelled")]
    Cancelled,

    #[error("unexpected error: {message}")]
    Unexpected { message: String },
}

impl PipelineError {
    pub fn validation(errors: Vec<FieldError>) -> Self {
        Self::Validation(errors)
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden {
            reason: reason.into(),
        }
    }

    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::AuthenticationRequired => ErrorKind::AuthenticationRequired,
            Self::Forbidden { .. } => ErrorKind::Forbidden,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Persistence(e) => ErrorKind::Persistence(e.kind),
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Unexpected { .. } => ErrorKind::Unexpected,
        }
    }

    /// Failures raised from inside a handler that must be logged with detail.
    pub fn is_fault(&self) -> bool {
        matches!(self, Self::Persistence(_) | Self::Unexpected { .. })
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation(_) => ErrorCategory::Validation,
            Self::AuthenticationRequired | Self::Forbidden { .. } => ErrorCategory::Security,
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::Persistence(_) => ErrorCategory::Storage,
            Self::Cancelled => ErrorCategory::Cancelled,
            Self::Unexpected { .. } => ErrorCategory::System,
        }
    }
}

impl From<anyhow::Error> for PipelineError {
    fn from(err: anyhow::Error) -> Self {
        Self::unexpected(format!("{err:#}"))
    }
}

/// Fine-grained failure classification carried by [`crate::Failure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "subtype", rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    AuthenticationRequired,
    Forbidden,
    NotFound,
    Persistence(PersistenceErrorKind),
    Cancelled,
    Unexpected,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::AuthenticationRequired => write!(f, "authentication_required"),
            Self::Forbidden => write!(f, "forbidden"),
            Self::NotFound => write!(f, "not_found"),
            Self::Persistence(kind) => write!(f, "persistence:{kind}"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Unexpected => write!(f, "unexpected"),
        }
    }
}

/// Error categories for monitoring and classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Security,
    NotFound,
    Storage,
    Cancelled,
    System,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::Security => write!(f, "security"),
            Self::NotFound => write!(f, "not_found"),
            Self::Storage => write!(f, "storage"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::System => write!(f, "system"),
        }
    }
}

/// Convenience result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
