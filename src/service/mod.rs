//! CRUD orchestration.
//!
//! [`EntityService`] runs every operation inside one store session and
//! translates the outcome into a [`ServiceResponse`] exactly once, at the end.
//!
//! Saves run `prepare → verify → validate → business hook → persist`;
//! removes run `prepare → verify → validate → business hook → delete`. The
//! first failing step ends the operation and rolls the session back,
//! including any forced master version bump.
//!
//! # Example Usage
//!
//! ```rust
//! use crud_ledger::config::LedgerConfig;
//! use crud_ledger::entity::{EntityRegistry, EntityType, FieldSpec};
//! use crud_ledger::service::{EntityService, ResultType, ServiceRequest};
//! use crud_ledger::storage::InMemoryStore;
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let scorecard = EntityType::builder("Scorecard", "scorecard")
//!     .id(FieldSpec::numeric("scorecardId"))
//!     .version_field("lastUpdated")
//!     .field(FieldSpec::text("name").required())
//!     .build();
//! let registry = EntityRegistry::new().with(scorecard)?;
//! let service = EntityService::new(InMemoryStore::new(), registry, LedgerConfig::default());
//!
//! let request = ServiceRequest::new().with_data(json!({"name": "Quarterly"}));
//! let response = service.save_entity("Scorecard", &request).await;
//! assert_eq!(response.result_type, ResultType::Ok);
//! assert!(response.data["versionControl"].is_string());
//! # Ok(())
//! # }
//! ```

mod concurrency;
pub mod hooks;
pub mod request;
pub mod response;
pub mod validation;

pub use hooks::{NoHooks, ServiceHooks};
pub use request::{FilterSpec, PageInfo, ServiceRequest, SortSpec};
pub use response::{ErrorEntry, ResultType, ServiceResponse};

use crate::config::LedgerConfig;
use crate::entity::{Action, EntityRecord, EntityRegistry, EntityType, RecordError};
use crate::error::{REMOVE_REC_NOT_DEFINED, ServiceError, ServiceResult};
use crate::messages::{GENERAL_EXCEPTION, MessageCatalog};
use crate::query::{QueryBuilder, QueryError};
use crate::storage::{EntityStore, StoreError, StoreSession};
use log::{debug, error, info, trace, warn};
use serde_json::Value;
use std::sync::Arc;

/// Result code for requests naming an unregistered entity type.
pub const UNKNOWN_ENTITY_TYPE: &str = "UNKNOWN_ENTITY_TYPE";
/// Result code for payloads that cannot be decoded onto a record.
pub const DECODE_FAILED: &str = "DECODE_FAILED";
/// Result code for rejected paging, sort or filter parameters.
pub const QUERY_REJECTED: &str = "QUERY_REJECTED";
/// Result code for unexpected store failures.
pub const STORE_FAILURE: &str = "STORE_FAILURE";

/// Catalog argument identifying a remove without an id.
const REMOVE_WITHOUT_ID_ARG: &str = "BEX001";

/// Orchestrates find, save and remove over one store.
pub struct EntityService<S: EntityStore, H: ServiceHooks<S::Session> = NoHooks> {
    store: S,
    registry: EntityRegistry,
    config: LedgerConfig,
    messages: MessageCatalog,
    hooks: H,
}

impl<S: EntityStore> EntityService<S, NoHooks> {
    /// Create a service without hooks, using the default message catalog.
    pub fn new(store: S, registry: EntityRegistry, config: LedgerConfig) -> Self {
        Self::with_hooks(store, registry, config, NoHooks)
    }
}

impl<S, H> EntityService<S, H>
where
    S: EntityStore,
    H: ServiceHooks<S::Session>,
{
    /// Create a service with type-specific hooks.
    pub fn with_hooks(store: S, registry: EntityRegistry, config: LedgerConfig, hooks: H) -> Self {
        Self {
            store,
            registry,
            config,
            messages: MessageCatalog::with_defaults(),
            hooks,
        }
    }

    /// Replace the message catalog.
    pub fn with_messages(mut self, messages: MessageCatalog) -> Self {
        self.messages = messages;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn messages(&self) -> &MessageCatalog {
        &self.messages
    }

    /// Load one record by `request.entity_id`. A missing record is a
    /// success with `null` data.
    pub async fn find_entity(&self, entity_type: &str, request: &ServiceRequest) -> ServiceResponse {
        trace!("find_entity {}", entity_type);
        let entity_type = match self.entity_type(entity_type) {
            Ok(entity_type) => entity_type,
            Err(e) => return e.into(),
        };
        let mut session = match self.store.begin().await {
            Ok(session) => session,
            Err(e) => return self.store_failure(e).into(),
        };
        let result = self.run_find(&mut session, &entity_type, request).await;
        self.complete(session, result).await
    }

    /// Load every record of a type, ordered by key.
    pub async fn find_all_entities(&self, entity_type: &str, request: &ServiceRequest) -> ServiceResponse {
        trace!("find_all_entities {}", entity_type);
        let entity_type = match self.entity_type(entity_type) {
            Ok(entity_type) => entity_type,
            Err(e) => return e.into(),
        };
        let mut session = match self.store.begin().await {
            Ok(session) => session,
            Err(e) => return self.store_failure(e).into(),
        };
        let result = self.run_find_all(&mut session, &entity_type, request).await;
        self.complete(session, result).await
    }

    /// Load one page of records selected by `request.paging`.
    pub async fn find_page_of_entities(
        &self,
        entity_type: &str,
        request: &ServiceRequest,
    ) -> ServiceResponse {
        trace!("find_page_of_entities {}", entity_type);
        let entity_type = match self.entity_type(entity_type) {
            Ok(entity_type) => entity_type,
            Err(e) => return e.into(),
        };
        let mut session = match self.store.begin().await {
            Ok(session) => session,
            Err(e) => return self.store_failure(e).into(),
        };
        let result = self.run_find_page(&mut session, &entity_type, request).await;
        self.complete(session, result).await
    }

    /// Create or update one record.
    pub async fn save_entity(&self, entity_type: &str, request: &ServiceRequest) -> ServiceResponse {
        info!("save_entity {} {:?}", entity_type, request.entity_id);
        let entity_type = match self.entity_type(entity_type) {
            Ok(entity_type) => entity_type,
            Err(e) => return e.into(),
        };
        let mut session = match self.store.begin().await {
            Ok(session) => session,
            Err(e) => return self.store_failure(e).into(),
        };
        let result = self.run_save(&mut session, &entity_type, request).await;
        self.complete(session, result).await
    }

    /// Remove one record and its dependents.
    pub async fn remove_entity(&self, entity_type: &str, request: &ServiceRequest) -> ServiceResponse {
        info!("remove_entity {} {:?}", entity_type, request.entity_id);
        let entity_type = match self.entity_type(entity_type) {
            Ok(entity_type) => entity_type,
            Err(e) => return e.into(),
        };
        let mut session = match self.store.begin().await {
            Ok(session) => session,
            Err(e) => return self.store_failure(e).into(),
        };
        let result = self.run_remove(&mut session, &entity_type, request).await;
        self.complete(session, result).await
    }

    async fn run_find(
        &self,
        session: &mut S::Session,
        entity_type: &Arc<EntityType>,
        request: &ServiceRequest,
    ) -> ServiceResult<ServiceResponse> {
        let Some(id) = request.typed_entity_id(entity_type) else {
            return Ok(ServiceResponse::ok(Value::Null));
        };
        let with_master = self.controls_for(entity_type).set_master_on_load;
        let record = self.load_record(session, entity_type, &id, with_master).await?;
        let records = self.hooks.process_retrieved(record.into_iter().collect());

        Ok(match records.into_iter().next() {
            Some(record) => ServiceResponse::ok(Value::Object(record.encode()))
                .with_master(encoded_master(&record)),
            None => ServiceResponse::ok(Value::Null),
        })
    }

    async fn run_find_all(
        &self,
        session: &mut S::Session,
        entity_type: &Arc<EntityType>,
        _request: &ServiceRequest,
    ) -> ServiceResult<ServiceResponse> {
        let rows = session
            .find_all(entity_type)
            .await
            .map_err(|e| self.store_failure(e))?;
        let total = rows.len();
        let records = self.records_from_rows(session, entity_type, rows).await?;
        Ok(ServiceResponse::list(encode_all(&records), total))
    }

    async fn run_find_page(
        &self,
        session: &mut S::Session,
        entity_type: &Arc<EntityType>,
        request: &ServiceRequest,
    ) -> ServiceResult<ServiceResponse> {
        let paging = request.paging.clone().unwrap_or_default();
        let builder = QueryBuilder::new(entity_type);
        let mut query = builder
            .select(&paging.sorter_pairs(), &paging.filter_pairs())
            .map_err(|e| self.query_failure(e))?;
        query.offset = paging.offset();
        query.limit = paging.limit;

        let statement = builder.to_sql(&query);
        debug!("find_page_of_entities {} with {} param(s)", entity_type.name(), statement.params.len());

        let page = session
            .query(entity_type, &query)
            .await
            .map_err(|e| self.store_failure(e))?;
        debug!(
            "find_page_of_entities count={} start={} limit={:?}",
            page.total, query.offset, query.limit
        );
        let records = self.records_from_rows(session, entity_type, page.rows).await?;
        Ok(ServiceResponse::list(encode_all(&records), page.total))
    }

    async fn records_from_rows(
        &self,
        session: &mut S::Session,
        entity_type: &Arc<EntityType>,
        rows: Vec<crate::entity::Document>,
    ) -> ServiceResult<Vec<EntityRecord>> {
        let controls = self.controls_for(entity_type);
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let mut record = EntityRecord::from_row(entity_type.clone(), controls, row);
            if controls.set_master_on_load {
                self.attach_master(session, &mut record).await?;
            }
            record.set_master_and_version(controls.set_master_on_load);
            records.push(record);
        }
        Ok(self.hooks.process_retrieved(records))
    }

    async fn run_save(
        &self,
        session: &mut S::Session,
        entity_type: &Arc<EntityType>,
        request: &ServiceRequest,
    ) -> ServiceResult<ServiceResponse> {
        let mut revised = self.prepare_save(session, entity_type, request).await?;
        self.verify(session, &mut revised).await?;
        self.validate(session, Action::Save, request, &revised).await?;
        let message = self
            .hooks
            .do_business_operations(session, Action::Save, request, &mut revised)
            .await?;

        let stored = self.persist(session, &revised).await?;
        let message = self
            .hooks
            .after_persist(session, request, &stored)
            .await?
            .or(message);

        Ok(ServiceResponse::ok(Value::Object(stored.encode()))
            .with_master(encoded_master(&stored))
            .with_message(message))
    }

    /// Write, flush and re-read a revised record.
    async fn persist(
        &self,
        session: &mut S::Session,
        revised: &EntityRecord,
    ) -> ServiceResult<EntityRecord> {
        let entity_type = revised.entity_type().clone();
        let saved = session
            .save(&entity_type, revised.to_row())
            .await
            .map_err(|e| self.store_failure(e))?;
        session.flush().await.map_err(|e| self.store_failure(e))?;

        let id = saved
            .get(&entity_type.id_field().name)
            .cloned()
            .ok_or_else(|| self.store_failure(StoreError::invalid_data("saved row has no key")))?;
        debug!("Saved {} {}", entity_type.name(), id);

        let controls = self.controls_for(&entity_type);
        let mut stored = if controls.auto_refresh {
            let row = session
                .find_by_id(&entity_type, &id)
                .await
                .map_err(|e| self.store_failure(e))?
                .ok_or(ServiceError::StaleData)?;
            EntityRecord::from_row(entity_type.clone(), controls, row)
        } else {
            EntityRecord::from_row(entity_type.clone(), controls, saved)
        };
        stored.set_blobs(revised.blobs().clone());
        self.attach_master(session, &mut stored).await?;
        stored.set_master_and_version(true);
        Ok(stored)
    }

    async fn run_remove(
        &self,
        session: &mut S::Session,
        entity_type: &Arc<EntityType>,
        request: &ServiceRequest,
    ) -> ServiceResult<ServiceResponse> {
        let (current, mut revised) = self.prepare_remove(session, entity_type, request).await?;
        self.verify(session, &mut revised).await?;
        self.validate(session, Action::Remove, request, &revised).await?;
        let message = self
            .hooks
            .do_business_operations(session, Action::Remove, request, &mut revised)
            .await?;

        let id = current
            .id()
            .cloned()
            .ok_or_else(|| self.remove_without_id())?;
        session
            .delete(entity_type, &id)
            .await
            .map_err(|e| self.store_failure(e))?;
        session.flush().await.map_err(|e| self.store_failure(e))?;
        session
            .detach(entity_type, &id)
            .await
            .map_err(|e| self.store_failure(e))?;
        debug!("Removed {} {}", entity_type.name(), id);

        let master = if revised.is_mastered() {
            encoded_master(&revised)
        } else {
            None
        };
        Ok(ServiceResponse::ok(Value::Null)
            .with_master(master)
            .with_message(message))
    }

    /// Commit on success, roll back on failure, and build the response.
    async fn complete(
        &self,
        session: S::Session,
        result: ServiceResult<ServiceResponse>,
    ) -> ServiceResponse {
        match result {
            Ok(response) => match session.commit().await {
                Ok(()) => response,
                Err(e) => {
                    warn!("Commit failed: {}", e);
                    self.store_failure(e).into()
                }
            },
            Err(failure) => {
                if let Err(e) = session.rollback().await {
                    error!("Rollback failed: {}", e);
                }
                debug!("Operation failed: {}", failure);
                failure.into()
            }
        }
    }

    pub(crate) fn entity_type(&self, name: &str) -> ServiceResult<Arc<EntityType>> {
        self.registry.get(name).cloned().ok_or_else(|| {
            warn!("Unknown entity type '{}'", name);
            ServiceError::system(
                UNKNOWN_ENTITY_TYPE,
                self.messages.format(GENERAL_EXCEPTION, &[UNKNOWN_ENTITY_TYPE]),
            )
        })
    }

    /// Process defaults with the type's overrides applied.
    fn controls_for(&self, entity_type: &EntityType) -> LedgerConfig {
        self.config.with_overrides(entity_type.overrides())
    }

    /// Conflicts are stale data; anything else is a system failure whose
    /// detail is logged but not returned.
    fn store_failure(&self, failure: StoreError) -> ServiceError {
        if failure.is_conflict() {
            debug!("Store conflict: {}", failure);
            return ServiceError::StaleData;
        }
        error!("Store failure: {}", failure);
        ServiceError::system(
            STORE_FAILURE,
            self.messages.format(GENERAL_EXCEPTION, &[STORE_FAILURE]),
        )
    }

    fn decode_failure(&self, failure: RecordError) -> ServiceError {
        warn!("Rejected payload: {}", failure);
        ServiceError::system(
            DECODE_FAILED,
            self.messages.format(GENERAL_EXCEPTION, &[DECODE_FAILED]),
        )
    }

    fn query_failure(&self, failure: QueryError) -> ServiceError {
        warn!("Rejected query: {}", failure);
        ServiceError::system(
            QUERY_REJECTED,
            self.messages.format(GENERAL_EXCEPTION, &[QUERY_REJECTED]),
        )
    }

    fn remove_without_id(&self) -> ServiceError {
        ServiceError::system(
            REMOVE_REC_NOT_DEFINED,
            self.messages.format(GENERAL_EXCEPTION, &[REMOVE_WITHOUT_ID_ARG]),
        )
    }
}

fn encode_all(records: &[EntityRecord]) -> Vec<Value> {
    records
        .iter()
        .map(|record| Value::Object(record.encode()))
        .collect()
}

/// The governing master as returned alongside a record.
fn encoded_master(record: &EntityRecord) -> Option<Value> {
    record
        .master_entity()
        .map(|master| Value::Object(master.encode()))
}
