//! Optimistic-concurrency CRUD services for clusters of related records.
//!
//! A *master* record carries a version token that governs every *mastered*
//! record belonging to it. Saves and removes compare the caller's copy against
//! the stored one, bump the master's version before writing a dependent, and
//! report conflicts as stale data rather than overwriting.
//!
//! # Core Components
//!
//! - [`EntityService`] - Runs find, save and remove pipelines in one store session
//! - [`EntityStore`] - Trait for transactional storage backends
//! - [`EntityRegistry`] - Registration-time entity metadata
//! - [`OperationHandler`] - Transport-agnostic dispatch over the request envelope
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use crud_ledger::{EntityRegistry, EntityService, LedgerConfig};
//! use crud_ledger::entity::{EntityType, FieldSpec};
//! use crud_ledger::storage::InMemoryStore;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let scorecard = EntityType::builder("Scorecard", "scorecard")
//!     .id(FieldSpec::numeric("scorecardId"))
//!     .version_field("lastUpdated")
//!     .field(FieldSpec::text("name").required().max_len(60))
//!     .build();
//! let registry = EntityRegistry::new().with(scorecard)?;
//! let service = EntityService::new(InMemoryStore::new(), registry, LedgerConfig::default());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod entity;
pub mod error;
pub mod messages;
pub mod operation_handler;
pub mod query;
pub mod service;
pub mod storage;

// Re-export commonly used types for convenience
pub use config::{ConfigError, ControlOverrides, LedgerConfig};
pub use entity::{Action, EntityRecord, EntityRegistry, EntityType, VersionToken};
pub use error::{ServiceError, ServiceResult, ValidationError};
pub use messages::MessageCatalog;
pub use service::{EntityService, NoHooks, ResultType, ServiceHooks, ServiceRequest, ServiceResponse};
pub use storage::{EntityStore, InMemoryStore, StoreError, StoreSession};

pub use operation_handler::{OperationHandler, OperationRequest, OperationType};
