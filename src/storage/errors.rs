//! Storage-specific error types.
//!
//! These errors describe persistence failures only. The service layer maps
//! [`StoreError::Conflict`] to a stale-data outcome and everything else to a
//! generic system failure.

use std::fmt;

/// Errors that can occur during storage operations.
#[derive(Debug)]
pub enum StoreError {
    /// Optimistic conflict: the row changed or vanished since it was read.
    Conflict {
        table: String,
        id: String,
        expected_version: Option<String>,
        actual_version: Option<String>,
    },

    /// The row targeted by a write does not exist.
    NotFound { table: String, id: String },

    /// The row could not be stored as given.
    InvalidData {
        message: String,
        cause: Option<String>,
    },

    /// A query referenced something the store cannot evaluate.
    InvalidQuery { message: String },

    /// Generic internal storage error.
    Internal {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Conflict {
                table,
                id,
                expected_version,
                actual_version,
            } => match (expected_version, actual_version) {
                (Some(expected), Some(actual)) => write!(
                    f,
                    "Concurrent modification of {}/{} (expected {}, found {})",
                    table, id, expected, actual
                ),
                _ => write!(f, "Concurrent modification of {}/{}", table, id),
            },
            StoreError::NotFound { table, id } => {
                write!(f, "Row not found: {}/{}", table, id)
            }
            StoreError::InvalidData { message, cause } => {
                if let Some(cause) = cause {
                    write!(f, "Invalid data: {} (cause: {})", message, cause)
                } else {
                    write!(f, "Invalid data: {}", message)
                }
            }
            StoreError::InvalidQuery { message } => write!(f, "Invalid query: {}", message),
            StoreError::Internal { message, .. } => {
                write!(f, "Internal storage error: {}", message)
            }
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Internal { source, .. } => source
                .as_ref()
                .map(|e| e.as_ref() as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

impl StoreError {
    /// Create a new Conflict error.
    pub fn conflict(table: impl Into<String>, id: impl Into<String>) -> Self {
        Self::Conflict {
            table: table.into(),
            id: id.into(),
            expected_version: None,
            actual_version: None,
        }
    }

    /// Create a Conflict error carrying both versions.
    pub fn version_conflict(
        table: impl Into<String>,
        id: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::Conflict {
            table: table.into(),
            id: id.into(),
            expected_version: Some(expected.into()),
            actual_version: Some(actual.into()),
        }
    }

    /// Create a new NotFound error.
    pub fn not_found(table: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            table: table.into(),
            id: id.into(),
        }
    }

    /// Create a new InvalidData error.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
            cause: None,
        }
    }

    /// Create a new InvalidData error with a cause.
    pub fn invalid_data_with_cause(message: impl Into<String>, cause: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
            cause: Some(cause.into()),
        }
    }

    /// Create a new InvalidQuery error.
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery {
            message: message.into(),
        }
    }

    /// Create a new Internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Create a new Internal error with a source.
    pub fn internal_with_source(
        message: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Whether this is an optimistic conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}
