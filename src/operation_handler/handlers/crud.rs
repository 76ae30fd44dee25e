//! Single-record operation handlers

use crate::operation_handler::core::{OperationHandler, OperationRequest};
use crate::service::{ServiceHooks, ServiceResponse};
use crate::storage::EntityStore;
use log::debug;

/// Handle find operations.
pub async fn handle_find<S, H>(
    handler: &OperationHandler<S, H>,
    request: &OperationRequest,
) -> ServiceResponse
where
    S: EntityStore,
    H: ServiceHooks<S::Session>,
{
    handler
        .service()
        .find_entity(&request.entity_type, &request.request)
        .await
}

/// Handle save operations. A request without an id creates.
pub async fn handle_save<S, H>(
    handler: &OperationHandler<S, H>,
    request: &OperationRequest,
) -> ServiceResponse
where
    S: EntityStore,
    H: ServiceHooks<S::Session>,
{
    match &request.request.entity_id {
        Some(id) => debug!("Updating {} {}", request.entity_type, id),
        None => debug!("Creating {}", request.entity_type),
    }
    handler
        .service()
        .save_entity(&request.entity_type, &request.request)
        .await
}

/// Handle remove operations.
pub async fn handle_remove<S, H>(
    handler: &OperationHandler<S, H>,
    request: &OperationRequest,
) -> ServiceResponse
where
    S: EntityStore,
    H: ServiceHooks<S::Session>,
{
    if let Some(code) = &request.request.action_code {
        debug!("Remove of {} confirmed with '{}'", request.entity_type, code);
    }
    handler
        .service()
        .remove_entity(&request.entity_type, &request.request)
        .await
}
