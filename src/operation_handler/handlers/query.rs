//! List operation handlers

use crate::operation_handler::core::{OperationHandler, OperationRequest};
use crate::service::{ServiceHooks, ServiceResponse};
use crate::storage::EntityStore;
use log::debug;

/// Handle find-all operations.
pub async fn handle_find_all<S, H>(
    handler: &OperationHandler<S, H>,
    request: &OperationRequest,
) -> ServiceResponse
where
    S: EntityStore,
    H: ServiceHooks<S::Session>,
{
    handler
        .service()
        .find_all_entities(&request.entity_type, &request.request)
        .await
}

/// Handle find-page operations. Missing paging selects everything.
pub async fn handle_find_page<S, H>(
    handler: &OperationHandler<S, H>,
    request: &OperationRequest,
) -> ServiceResponse
where
    S: EntityStore,
    H: ServiceHooks<S::Session>,
{
    if let Some(paging) = &request.request.paging {
        debug!(
            "Paging {} from {} (limit {:?}, {} sorter(s), {} filter(s))",
            request.entity_type,
            paging.offset(),
            paging.limit,
            paging.sorters.len(),
            paging.filters.len()
        );
    }
    handler
        .service()
        .find_page_of_entities(&request.entity_type, &request.request)
        .await
}
