//! Error response utilities for operation handlers

use crate::error::ServiceError;
use crate::messages::{GENERAL_EXCEPTION, MessageCatalog};
use crate::service::ServiceResponse;
use log::warn;

/// Result code for requests that do not parse.
pub const INVALID_REQUEST: &str = "INVALID_REQUEST";

/// Create an error response from a ServiceError.
pub fn create_error_response(error: ServiceError) -> ServiceResponse {
    ServiceResponse::from(error)
}

/// Response for a request envelope that could not be read.
pub(super) fn invalid_request_response(detail: &str, messages: &MessageCatalog) -> ServiceResponse {
    warn!("Invalid operation request: {}", detail);
    create_error_response(ServiceError::system(
        INVALID_REQUEST,
        messages.format(GENERAL_EXCEPTION, &[INVALID_REQUEST]),
    ))
}
