//! Core operation handler infrastructure
//!
//! The handler struct, the structured request type and the dispatcher.

use crate::service::{EntityService, ServiceHooks, ServiceRequest, ServiceResponse};
use crate::storage::EntityStore;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Framework-agnostic handler for entity operations.
pub struct OperationHandler<S: EntityStore, H: ServiceHooks<S::Session> = crate::service::NoHooks> {
    pub(super) service: EntityService<S, H>,
}

/// Structured request for one entity operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationRequest {
    pub operation: OperationType,
    /// Registered entity type name, e.g. `"Scorecard"`.
    pub entity_type: String,
    #[serde(default)]
    pub request: ServiceRequest,
    /// Correlation id for logging. Generated when absent.
    #[serde(default)]
    pub request_id: Option<String>,
}

/// Operations supported by the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationType {
    /// Load one record by id
    Find,
    /// Load every record of a type
    FindAll,
    /// Load one filtered, sorted page
    FindPage,
    /// Create or update one record
    Save,
    /// Remove one record and its dependents
    Remove,
}

impl<S, H> OperationHandler<S, H>
where
    S: EntityStore,
    H: ServiceHooks<S::Session>,
{
    pub fn new(service: EntityService<S, H>) -> Self {
        Self { service }
    }

    /// Dispatch a structured request.
    pub async fn handle_operation(&self, request: OperationRequest) -> ServiceResponse {
        let request_id = request
            .request_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        info!(
            "Operation handler processing {:?} for {} (request: '{}')",
            request.operation, request.entity_type, request_id
        );

        let response = match request.operation {
            OperationType::Find => super::handlers::crud::handle_find(self, &request).await,
            OperationType::Save => super::handlers::crud::handle_save(self, &request).await,
            OperationType::Remove => super::handlers::crud::handle_remove(self, &request).await,
            OperationType::FindAll => super::handlers::query::handle_find_all(self, &request).await,
            OperationType::FindPage => {
                super::handlers::query::handle_find_page(self, &request).await
            }
        };

        if response.success {
            debug!(
                "Operation handler completed successfully (request: '{}')",
                request_id
            );
        } else {
            warn!(
                "Operation handler finished with {:?} (request: '{}')",
                response.result_type, request_id
            );
        }

        response
    }

    /// Dispatch a request given as JSON and answer with the JSON envelope.
    ///
    /// Requests that do not parse yield a `SYSTEM_ERROR` envelope.
    pub async fn handle_json(&self, request: Value) -> Value {
        let response = match serde_json::from_value::<OperationRequest>(request) {
            Ok(request) => self.handle_operation(request).await,
            Err(e) => super::errors::invalid_request_response(&e.to_string(), self.service.messages()),
        };
        serde_json::to_value(&response).unwrap_or(Value::Null)
    }

    /// Get access to the underlying service.
    pub fn service(&self) -> &EntityService<S, H> {
        &self.service
    }
}
