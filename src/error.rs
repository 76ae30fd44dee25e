//! Service outcome types.
//!
//! Every failure that can leave the orchestration pipeline is expressed as a
//! [`ServiceError`]. Errors are raised where they are detected, propagated with
//! `?`, and converted into a [`ServiceResponse`](crate::service::ServiceResponse)
//! exactly once at the outermost boundary.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Result code used when a remove request arrives without an identifier.
pub const REMOVE_REC_NOT_DEFINED: &str = "REMOVE_REC_NOT_DEFINED";

/// Main error type for service operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ServiceError {
    /// Optimistic conflict: the caller's copy is out of date or the row vanished.
    #[error("Stale data: the record was changed or removed by another user")]
    StaleData,

    /// Validation failed with either one blocking message or a field-error list.
    #[error("Validation failed: {0}")]
    Validation(ValidationFailure),

    /// A confirmation round-trip is required before the action may proceed.
    #[error("Confirmation required ({code}): {message}")]
    Warning { code: String, message: String },

    /// Unexpected or infrastructure failure. `message` is safe to show to callers.
    #[error("System failure ({code}): {message}")]
    System { code: String, message: String },
}

impl ServiceError {
    /// Create a validation failure carrying a single blocking message.
    pub fn validation_message(message: impl Into<String>) -> Self {
        Self::Validation(ValidationFailure::Message(message.into()))
    }

    /// Create a validation failure carrying formatted field errors.
    pub fn validation_errors(errors: Vec<ValidationError>) -> Self {
        Self::Validation(ValidationFailure::Fields(errors))
    }

    /// Create a confirmation warning the caller must echo back via `actionCode`.
    pub fn warning(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Warning {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Create a system failure.
    pub fn system(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::System {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Whether the caller can resolve this outcome by reloading and retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StaleData | Self::Warning { .. })
    }
}

/// The two mutually exclusive shapes of a validation failure.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationFailure {
    Message(String),
    Fields(Vec<ValidationError>),
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationFailure::Message(message) => write!(f, "{}", message),
            ValidationFailure::Fields(errors) => {
                write!(f, "{} field error(s)", errors.len())?;
                for error in errors {
                    match &error.field {
                        Some(field) => write!(f, "; {}: {}", field, error.message)?,
                        None => write!(f, "; {}", error.message)?,
                    }
                }
                Ok(())
            }
        }
    }
}

/// A single validation problem.
///
/// `message` holds a catalog key until the pipeline formats it, after which it
/// holds the resolved text. Field names lose any qualifying suffix after the
/// first `_`, so `name_unique` and `name_length` both report against `name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub field: Option<String>,
    pub message: String,
    pub args: Vec<String>,
}

impl ValidationError {
    /// Create an error that is not tied to a field.
    pub fn general(message: impl Into<String>) -> Self {
        Self {
            field: None,
            message: message.into(),
            args: Vec::new(),
        }
    }

    /// Create an error reported against `field`.
    pub fn field(field: impl AsRef<str>, message: impl Into<String>) -> Self {
        Self {
            field: Some(strip_qualifier(field.as_ref()).to_string()),
            message: message.into(),
            args: Vec::new(),
        }
    }

    /// Attach positional arguments for message formatting.
    pub fn with_args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

fn strip_qualifier(field: &str) -> &str {
    match field.find('_') {
        Some(index) => &field[..index],
        None => field,
    }
}

/// Result type for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;
