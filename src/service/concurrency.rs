//! Loading, preparing and verifying records against the version ledger.
//!
//! Every write starts from a *revised* record built on a copy of the stored
//! row, compared against that stored row as its reference. For mastered
//! types the reference's master chain is always loaded, regardless of
//! `set_master_on_load`, so the check has a version to compare with.

use crate::entity::{Document, EntityRecord, EntityType, MasterLink};
use crate::error::{ServiceError, ServiceResult, ValidationError};
use crate::service::validation::REQUIRED;
use crate::service::{EntityService, ServiceHooks, ServiceRequest};
use crate::storage::{EntityStore, StoreSession};
use log::{debug, trace};
use serde_json::Value;
use std::sync::Arc;

/// Master chains are followed at most this far.
const MAX_MASTER_HOPS: usize = 2;

impl<S, H> EntityService<S, H>
where
    S: EntityStore,
    H: ServiceHooks<S::Session>,
{
    /// Load one record, with its master chain when `with_master` is set.
    ///
    /// The ledger is derived afterwards following `set_master_on_load`.
    pub(super) async fn load_record(
        &self,
        session: &mut S::Session,
        entity_type: &Arc<EntityType>,
        id: &Value,
        with_master: bool,
    ) -> ServiceResult<Option<EntityRecord>> {
        let Some(row) = session
            .find_by_id(entity_type, id)
            .await
            .map_err(|e| self.store_failure(e))?
        else {
            return Ok(None);
        };

        let controls = self.controls_for(entity_type);
        let mut record = EntityRecord::from_row(entity_type.clone(), controls, row);
        if with_master {
            self.attach_master(session, &mut record).await?;
        }
        record.set_master_and_version(controls.set_master_on_load);
        Ok(Some(record))
    }

    /// Load and link the master chain of `record` from its link field.
    ///
    /// Leaves the master unset when the link field is empty or the master
    /// row no longer exists.
    pub(super) async fn attach_master(
        &self,
        session: &mut S::Session,
        record: &mut EntityRecord,
    ) -> ServiceResult<()> {
        let Some((master_type, master_id)) = self.master_key(record)? else {
            record.set_master(None);
            return Ok(());
        };

        // Walk up to the last hop first, then link downwards.
        let mut chain: Vec<EntityRecord> = Vec::with_capacity(MAX_MASTER_HOPS);
        let mut next = Some((master_type, master_id));
        while let Some((entity_type, id)) = next.take() {
            if chain.len() == MAX_MASTER_HOPS {
                break;
            }
            let Some(row) = session
                .find_by_id(&entity_type, &id)
                .await
                .map_err(|e| self.store_failure(e))?
            else {
                break;
            };
            let master = EntityRecord::from_row(entity_type.clone(), self.controls_for(&entity_type), row);
            next = self.master_key(&master)?;
            chain.push(master);
        }

        let mut linked: Option<Arc<EntityRecord>> = None;
        while let Some(mut master) = chain.pop() {
            master.set_master(linked.take());
            master.set_master_and_version(true);
            linked = Some(Arc::new(master));
        }

        trace!(
            "{} master {}",
            record.entity_type().name(),
            if linked.is_some() { "attached" } else { "missing" }
        );
        record.set_master(linked);
        Ok(())
    }

    /// Type and key of the record's direct master, if it names one.
    fn master_key(&self, record: &EntityRecord) -> ServiceResult<Option<(Arc<EntityType>, Value)>> {
        let MasterLink::MasteredBy {
            master_type,
            via_field,
        } = record.entity_type().master_link()
        else {
            return Ok(None);
        };
        let Some(id) = record.get(via_field) else {
            return Ok(None);
        };
        Ok(Some((self.entity_type(master_type)?, id.clone())))
    }

    /// Build the revised record for a save.
    ///
    /// Updates copy the stored row and overlay the payload; the row must
    /// still exist. Creates of mastered types compare against an empty
    /// reference wired to the loaded master.
    pub(super) async fn prepare_save(
        &self,
        session: &mut S::Session,
        entity_type: &Arc<EntityType>,
        request: &ServiceRequest,
    ) -> ServiceResult<EntityRecord> {
        let id = request.typed_entity_id(entity_type);
        let mut revised = EntityRecord::new(entity_type.clone(), self.controls_for(entity_type));

        if let Some(id) = &id {
            let current = self
                .load_record(session, entity_type, id, true)
                .await?
                .ok_or_else(|| {
                    debug!("{} {} vanished before save", entity_type.name(), id);
                    ServiceError::StaleData
                })?;
            revised.copy_from(&Arc::new(current));
            revised.set_baseline();
        }

        self.overlay(&mut revised, request.data.as_ref())?;
        revised.set_id(id.clone());
        revised.set_blobs(request.blobs.clone());

        if id.is_none() && revised.is_mastered() {
            self.attach_created_master(session, &mut revised).await?;
        }

        Ok(revised)
    }

    async fn attach_created_master(
        &self,
        session: &mut S::Session,
        revised: &mut EntityRecord,
    ) -> ServiceResult<()> {
        if let MasterLink::MasteredBy { via_field, .. } = revised.entity_type().master_link() {
            if revised.get(via_field).is_none() {
                let error = ValidationError::field(via_field, self.messages.format(REQUIRED, &[via_field]));
                return Err(ServiceError::validation_errors(vec![error]));
            }
        }

        self.attach_master(session, revised).await?;
        if revised.master().is_none() {
            debug!("Master of new {} could not be loaded", revised.entity_type().name());
            return Err(ServiceError::StaleData);
        }

        let mut reference = revised.new_instance();
        reference.set_master(revised.master().cloned());
        revised.set_reference(Some(Arc::new(reference)));
        Ok(())
    }

    /// Build the revised record for a remove. The id is mandatory.
    pub(super) async fn prepare_remove(
        &self,
        session: &mut S::Session,
        entity_type: &Arc<EntityType>,
        request: &ServiceRequest,
    ) -> ServiceResult<(Arc<EntityRecord>, EntityRecord)> {
        let id = request
            .typed_entity_id(entity_type)
            .ok_or_else(|| self.remove_without_id())?;

        let current = self
            .load_record(session, entity_type, &id, true)
            .await?
            .map(Arc::new)
            .ok_or_else(|| {
                debug!("{} {} vanished before remove", entity_type.name(), id);
                ServiceError::StaleData
            })?;

        let mut revised = current.new_instance();
        revised.copy_from(&current);
        revised.set_baseline();
        self.overlay(&mut revised, request.data.as_ref())?;
        revised.set_id(Some(id));

        Ok((current, revised))
    }

    /// Overlay the request payload. A missing payload still clears the
    /// tokens copied from the stored row.
    fn overlay(&self, revised: &mut EntityRecord, data: Option<&Document>) -> ServiceResult<()> {
        let empty = Document::new();
        revised
            .decode(data.unwrap_or(&empty))
            .map_err(|e| self.decode_failure(e))
    }

    /// Reject stale copies, then bump the governing master's version.
    ///
    /// The bump happens before the dependent row is written and is flushed
    /// so later reads in this session see it. It is rolled back with the
    /// rest of the session if any later step fails.
    pub(super) async fn verify(
        &self,
        session: &mut S::Session,
        revised: &mut EntityRecord,
    ) -> ServiceResult<()> {
        if !revised.is_current() {
            debug!(
                "Stale {} {:?} (master {:?})",
                revised.entity_type().name(),
                revised.entity_id(),
                revised.cached_master_entity_id()
            );
            return Err(ServiceError::StaleData);
        }

        if !revised.is_mastered() {
            return Ok(());
        }

        let governing = revised
            .reference()
            .and_then(|reference| reference.master_entity())
            .or_else(|| revised.master_entity())
            .and_then(|master| Some((master.entity_type().clone(), master.id()?.clone())));
        let Some((master_type, master_id)) = governing else {
            debug!("No master to increment for {}", revised.entity_type().name());
            return Err(ServiceError::StaleData);
        };

        let version = session
            .force_increment(&master_type, &master_id)
            .await
            .map_err(|e| self.store_failure(e))?;
        session.flush().await.map_err(|e| self.store_failure(e))?;
        debug!("{} {} now at {}", master_type.name(), master_id, version);

        self.attach_master(session, revised).await
    }
}
