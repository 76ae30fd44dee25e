//! Transport-agnostic operation handler.
//!
//! Wraps an [`EntityService`](crate::service::EntityService) behind a single
//! structured request type so HTTP, message-queue or in-process callers all
//! dispatch the same way.
//!
//! # Key Types
//!
//! - [`OperationHandler`] - Dispatches requests to the service
//! - [`OperationRequest`] - Operation, entity type and request envelope
//! - [`OperationType`] - The five supported operations
//!
//! # Examples
//!
//! ```rust,no_run
//! use crud_ledger::operation_handler::{OperationHandler, OperationRequest};
//! use crud_ledger::{EntityRegistry, EntityService, LedgerConfig};
//! use crud_ledger::storage::InMemoryStore;
//! use serde_json::json;
//!
//! # async fn example(registry: EntityRegistry) {
//! let service = EntityService::new(InMemoryStore::new(), registry, LedgerConfig::default());
//! let handler = OperationHandler::new(service);
//!
//! let request = OperationRequest::save("Scorecard", json!({"name": "Quarterly"}));
//! let response = handler.handle_operation(request).await;
//! # }
//! ```

mod builders;
mod core;
mod errors;
mod handlers;

pub use self::core::{OperationHandler, OperationRequest, OperationType};

pub use errors::{INVALID_REQUEST, create_error_response};
