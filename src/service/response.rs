//! Outbound response envelope.

use crate::error::{ServiceError, ValidationFailure};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome category reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultType {
    Ok,
    SystemError,
    ValidationError,
    Warning,
    StaleData,
}

/// One field error as reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    /// Field name, or `null` for general errors.
    pub id: Option<String>,
    pub msg: String,
}

/// The response envelope. Every key is always serialized, with explicit nulls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceResponse {
    pub success: bool,
    pub result_type: ResultType,
    pub result_code: Option<String>,
    pub message: Option<String>,
    pub total: Option<usize>,
    pub errors: Option<Vec<ErrorEntry>>,
    /// An object for single-record responses, an array for lists.
    pub data: Value,
    pub master: Option<Value>,
}

impl ServiceResponse {
    /// Successful response carrying `data`.
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            result_type: ResultType::Ok,
            result_code: None,
            message: None,
            total: None,
            errors: None,
            data,
            master: None,
        }
    }

    /// Successful list response.
    pub fn list(items: Vec<Value>, total: usize) -> Self {
        Self::ok(Value::Array(items)).with_total(total)
    }

    pub fn with_master(mut self, master: Option<Value>) -> Self {
        self.master = master;
        self
    }

    pub fn with_message(mut self, message: Option<String>) -> Self {
        self.message = message;
        self
    }

    pub fn with_total(mut self, total: usize) -> Self {
        self.total = Some(total);
        self
    }

    fn failure(result_type: ResultType) -> Self {
        Self {
            success: false,
            result_type,
            ..Self::ok(Value::Null)
        }
    }

    /// Whether the caller must echo `code` back to proceed.
    pub fn requires_confirmation(&self, code: &str) -> bool {
        self.result_type == ResultType::Warning && self.result_code.as_deref() == Some(code)
    }
}

impl From<ServiceError> for ServiceResponse {
    fn from(error: ServiceError) -> Self {
        match error {
            ServiceError::StaleData => Self::failure(ResultType::StaleData),
            ServiceError::Validation(ValidationFailure::Message(message)) => Self {
                message: Some(message),
                ..Self::failure(ResultType::ValidationError)
            },
            ServiceError::Validation(ValidationFailure::Fields(errors)) => Self {
                errors: Some(
                    errors
                        .into_iter()
                        .map(|error| ErrorEntry {
                            id: error.field,
                            msg: error.message,
                        })
                        .collect(),
                ),
                ..Self::failure(ResultType::ValidationError)
            },
            ServiceError::Warning { code, message } => Self {
                result_code: Some(code),
                message: Some(message),
                ..Self::failure(ResultType::Warning)
            },
            ServiceError::System { code, message } => Self {
                result_code: Some(code),
                message: Some(message),
                ..Self::failure(ResultType::SystemError)
            },
        }
    }
}
