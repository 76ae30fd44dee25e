//! Type-specific extension points.
//!
//! A service is built with one [`ServiceHooks`] implementation shared by all
//! entity types; implementations branch on the record's type name. Every
//! method has a no-op default, so hooks only override what they need.
//!
//! ```rust
//! use crud_ledger::entity::{Action, EntityRecord};
//! use crud_ledger::error::{ServiceError, ServiceResult};
//! use crud_ledger::service::{ServiceHooks, ServiceRequest};
//! use crud_ledger::storage::StoreSession;
//!
//! const REMOVE_CONF: &str = "REMOVE_CONF";
//!
//! struct ConfirmRemoval;
//!
//! impl<S: StoreSession> ServiceHooks<S> for ConfirmRemoval {
//!     async fn do_business_operations(
//!         &self,
//!         _session: &mut S,
//!         action: Action,
//!         request: &ServiceRequest,
//!         _record: &mut EntityRecord,
//!     ) -> ServiceResult<Option<String>> {
//!         if action == Action::Remove && !request.confirms(REMOVE_CONF) {
//!             return Err(ServiceError::warning(REMOVE_CONF, "Remove this record?"));
//!         }
//!         Ok(None)
//!     }
//! }
//! ```

use crate::entity::{Action, EntityRecord};
use crate::error::{ServiceResult, ValidationError};
use crate::service::ServiceRequest;
use crate::storage::StoreSession;
use std::future::Future;

pub trait ServiceHooks<S: StoreSession>: Send + Sync {
    /// Cross-record checks that need lookups, such as uniqueness.
    ///
    /// Push field errors onto `errors`, or return a single blocking error.
    /// A blocking error wins over every field error.
    fn validate_feasibility(
        &self,
        _session: &mut S,
        _action: Action,
        _request: &ServiceRequest,
        _record: &EntityRecord,
        _errors: &mut Vec<ValidationError>,
    ) -> impl Future<Output = ServiceResult<Option<ValidationError>>> + Send {
        async { Ok(None) }
    }

    /// Side effects run after validation and before the write.
    ///
    /// May raise a confirmation warning. A returned message is reported on
    /// the success response.
    fn do_business_operations(
        &self,
        _session: &mut S,
        _action: Action,
        _request: &ServiceRequest,
        _record: &mut EntityRecord,
    ) -> impl Future<Output = ServiceResult<Option<String>>> + Send {
        async { Ok(None) }
    }

    /// Side effects run once a save is flushed and reloaded, for work that
    /// needs the stored key. A returned message replaces the one from
    /// [`do_business_operations`](Self::do_business_operations).
    fn after_persist(
        &self,
        _session: &mut S,
        _request: &ServiceRequest,
        _stored: &EntityRecord,
    ) -> impl Future<Output = ServiceResult<Option<String>>> + Send {
        async { Ok(None) }
    }

    /// Post-process records returned by a find.
    fn process_retrieved(&self, records: Vec<EntityRecord>) -> Vec<EntityRecord> {
        records
    }
}

/// Hooks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl<S: StoreSession> ServiceHooks<S> for NoHooks {}
