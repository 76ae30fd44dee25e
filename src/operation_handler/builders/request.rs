//! Request builder utilities for OperationRequest

use crate::operation_handler::core::{OperationRequest, OperationType};
use crate::service::{PageInfo, ServiceRequest};
use serde_json::Value;

impl OperationRequest {
    fn new(operation: OperationType, entity_type: impl Into<String>, request: ServiceRequest) -> Self {
        Self {
            operation,
            entity_type: entity_type.into(),
            request,
            request_id: None,
        }
    }

    /// Create a new find operation request.
    pub fn find(entity_type: impl Into<String>, entity_id: impl Into<Value>) -> Self {
        Self::new(
            OperationType::Find,
            entity_type,
            ServiceRequest::new().with_entity_id(entity_id),
        )
    }

    /// Create a new find-all operation request.
    pub fn find_all(entity_type: impl Into<String>) -> Self {
        Self::new(OperationType::FindAll, entity_type, ServiceRequest::new())
    }

    /// Create a new find-page operation request.
    pub fn find_page(entity_type: impl Into<String>, paging: PageInfo) -> Self {
        Self::new(
            OperationType::FindPage,
            entity_type,
            ServiceRequest::new().with_paging(paging),
        )
    }

    /// Create a new save operation request that creates a record.
    pub fn save(entity_type: impl Into<String>, data: Value) -> Self {
        Self::new(OperationType::Save, entity_type, ServiceRequest::new().with_data(data))
    }

    /// Create a new save operation request that updates a record.
    pub fn update(entity_type: impl Into<String>, entity_id: impl Into<Value>, data: Value) -> Self {
        Self::new(
            OperationType::Save,
            entity_type,
            ServiceRequest::new().with_entity_id(entity_id).with_data(data),
        )
    }

    /// Create a new remove operation request.
    pub fn remove(entity_type: impl Into<String>, entity_id: impl Into<Value>) -> Self {
        Self::new(
            OperationType::Remove,
            entity_type,
            ServiceRequest::new().with_entity_id(entity_id),
        )
    }

    /// Add request ID to the request.
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Attach a payload, such as the token a remove is checked against.
    pub fn with_data(mut self, data: Value) -> Self {
        self.request = self.request.with_data(data);
        self
    }

    /// Echo a confirmation code from a previous warning.
    pub fn with_action_code(mut self, code: impl Into<String>) -> Self {
        self.request.action_code = Some(code.into());
        self
    }

    /// Replace the request envelope.
    pub fn with_request(mut self, request: ServiceRequest) -> Self {
        self.request = request;
        self
    }
}
