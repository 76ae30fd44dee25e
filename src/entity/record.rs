//! The versioned entity record and its JSON projection.
//!
//! An [`EntityRecord`] lives for a single operation. It is created empty,
//! populated from a stored row or an inbound document, optionally linked to
//! the persisted copy it is compared against (its *reference*), and dropped
//! when the operation ends.

use crate::config::LedgerConfig;
use crate::entity::{EntityType, Overlay, TokenError, VersionToken};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A JSON object: the encoded form of a record, or a stored row.
pub type Document = Map<String, Value>;

pub const ENTITY_ID: &str = "entityId";
pub const MASTER_ENTITY_ID: &str = "masterEntityId";
pub const CURRENCY_CONTROL: &str = "currencyControl";
pub const VERSION_CONTROL: &str = "versionControl";

/// Errors raised while decoding a document onto a record.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RecordError {
    #[error("Invalid value for '{key}': {source}")]
    InvalidToken {
        key: &'static str,
        source: TokenError,
    },
}

/// Version, currency and master identity as last derived or decoded.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct LedgerState {
    pub(crate) version: Option<VersionToken>,
    pub(crate) currency: Option<VersionToken>,
    pub(crate) master_entity_id: Option<String>,
}

/// One versioned entity instance.
///
/// `master` and `reference` are shared, read-only views of other records
/// loaded during the same operation.
#[derive(Debug, Clone)]
pub struct EntityRecord {
    pub(super) entity_type: Arc<EntityType>,
    pub(super) controls: LedgerConfig,
    pub(super) fields: Document,
    pub(crate) ledger: LedgerState,
    pub(super) master: Option<Arc<EntityRecord>>,
    pub(super) reference: Option<Arc<EntityRecord>>,
    baseline: Option<Document>,
    blobs: BTreeMap<String, Vec<u8>>,
}

impl EntityRecord {
    /// Create an empty record governed by `controls`.
    pub fn new(entity_type: Arc<EntityType>, controls: LedgerConfig) -> Self {
        Self {
            entity_type,
            controls,
            fields: Document::new(),
            ledger: LedgerState::default(),
            master: None,
            reference: None,
            baseline: None,
            blobs: BTreeMap::new(),
        }
    }

    /// Create a record holding a stored row.
    pub fn from_row(entity_type: Arc<EntityType>, controls: LedgerConfig, row: Document) -> Self {
        let mut record = Self::new(entity_type, controls);
        record.fields = row
            .into_iter()
            .filter(|(_, value)| !value.is_null())
            .collect();
        record
    }

    /// A fresh, empty record of the same type and controls.
    pub fn new_instance(&self) -> Self {
        Self::new(self.entity_type.clone(), self.controls)
    }

    pub fn entity_type(&self) -> &Arc<EntityType> {
        &self.entity_type
    }

    pub fn controls(&self) -> &LedgerConfig {
        &self.controls
    }

    pub fn is_mastered(&self) -> bool {
        self.entity_type.is_mastered()
    }

    /// The key value, if this record has been persisted.
    pub fn id(&self) -> Option<&Value> {
        self.get(&self.entity_type.id_field().name)
    }

    /// The key rendered as a string.
    pub fn entity_id(&self) -> Option<String> {
        self.id().map(value_to_key)
    }

    pub fn set_id(&mut self, id: Option<Value>) {
        let name = self.entity_type.id_field().name.clone();
        self.set(&name, id.unwrap_or(Value::Null));
    }

    /// A non-null field value.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).filter(|value| !value.is_null())
    }

    /// Set a field; `null` clears it.
    pub fn set(&mut self, name: &str, value: Value) {
        if value.is_null() {
            self.fields.remove(name);
        } else {
            self.fields.insert(name.to_string(), value);
        }
    }

    pub fn fields(&self) -> &Document {
        &self.fields
    }

    pub fn master(&self) -> Option<&Arc<EntityRecord>> {
        self.master.as_ref()
    }

    pub fn set_master(&mut self, master: Option<Arc<EntityRecord>>) {
        self.master = master;
    }

    pub fn reference(&self) -> Option<&Arc<EntityRecord>> {
        self.reference.as_ref()
    }

    pub fn set_reference(&mut self, reference: Option<Arc<EntityRecord>>) {
        self.reference = reference;
    }

    pub fn baseline(&self) -> Option<&Document> {
        self.baseline.as_ref()
    }

    /// Snapshot the current encoded state as this record's baseline.
    pub fn set_baseline(&mut self) {
        self.baseline = Some(self.encode());
    }

    pub fn blobs(&self) -> &BTreeMap<String, Vec<u8>> {
        &self.blobs
    }

    pub fn set_blobs(&mut self, blobs: BTreeMap<String, Vec<u8>>) {
        self.blobs = blobs;
    }

    /// Encode the record: key, master id and tokens first, then declared fields.
    ///
    /// Absent values are omitted rather than written as `null`.
    pub fn encode(&self) -> Document {
        let mut document = Document::new();

        if let Some(id) = self.entity_id() {
            document.insert(ENTITY_ID.to_string(), Value::String(id));
        }
        if let Some(master_id) = &self.ledger.master_entity_id {
            document.insert(MASTER_ENTITY_ID.to_string(), Value::String(master_id.clone()));
        }
        if let Some(currency) = &self.ledger.currency {
            document.insert(CURRENCY_CONTROL.to_string(), currency.to_json());
        }
        if let Some(version) = &self.ledger.version {
            document.insert(VERSION_CONTROL.to_string(), version.to_json());
        }

        let id_name = &self.entity_type.id_field().name;
        if let Some(id) = self.get(id_name) {
            document.insert(id_name.clone(), id.clone());
        }
        for field in self.entity_type.fields() {
            if let Some(value) = self.get(&field.name) {
                document.insert(field.name.clone(), value.clone());
            }
        }

        document
    }

    /// Overlay `document` onto this record.
    ///
    /// Tokens, the master id and the key are always replaced, even by absence.
    /// Other fields follow their declared [`Overlay`]: by default they change
    /// only when the document supplies a non-null value.
    pub fn decode(&mut self, document: &Document) -> Result<(), RecordError> {
        let currency = read_token(document, CURRENCY_CONTROL)?;
        let version = read_token(document, VERSION_CONTROL)?;

        self.ledger.currency = currency;
        self.ledger.version = version;
        self.ledger.master_entity_id = document
            .get(MASTER_ENTITY_ID)
            .filter(|value| !value.is_null())
            .map(value_to_key);

        let entity_type = self.entity_type.clone();
        let id_field = entity_type.id_field();
        let specs = std::iter::once(id_field).chain(entity_type.fields());

        for spec in specs {
            let incoming = document.get(&spec.name).filter(|value| !value.is_null());
            match (spec.overlay, incoming) {
                (_, Some(value)) => self.set(&spec.name, value.clone()),
                (Overlay::Always, None) => self.set(&spec.name, Value::Null),
                (Overlay::WhenPresent, None) => {}
            }
        }

        Ok(())
    }

    /// Become a copy of `target` and compare against it from now on.
    ///
    /// Equivalent to overlaying `target`'s encoded form, except that the
    /// stored version column and the loaded master travel with the copy.
    pub fn copy_from(&mut self, target: &Arc<EntityRecord>) {
        self.fields = target.fields.clone();
        self.ledger = target.ledger.clone();
        self.master = target.master.clone();
        self.reference = Some(target.clone());
    }

    /// Overlay `target`'s baseline, if it has one, and compare against `target`.
    pub fn copy_from_baseline(&mut self, target: &Arc<EntityRecord>) -> Result<(), RecordError> {
        if let Some(baseline) = target.baseline() {
            self.decode(baseline)?;
        }
        self.reference = Some(target.clone());
        Ok(())
    }

    /// The row to hand to the store: key, version column and persistent fields.
    pub fn to_row(&self) -> Document {
        let mut row = Document::new();
        let id_name = &self.entity_type.id_field().name;
        if let Some(id) = self.get(id_name) {
            row.insert(id_name.clone(), id.clone());
        }
        if let Some(version_field) = self.entity_type.version_field() {
            if let Some(version) = self.get(version_field) {
                row.insert(version_field.to_string(), version.clone());
            }
        }
        for field in self.entity_type.fields().iter().filter(|f| f.persistent) {
            row.insert(
                field.name.clone(),
                self.get(&field.name).cloned().unwrap_or(Value::Null),
            );
        }
        row
    }

    /// Same type and same key.
    pub fn same_identity(&self, other: &EntityRecord) -> bool {
        self.entity_type.name() == other.entity_type.name()
            && self.id().is_some()
            && self.entity_id() == other.entity_id()
    }

    /// `true` if `matches` is empty or holds only this record.
    ///
    /// Used by uniqueness checks: query for records sharing a value, then ask
    /// whether the only hit is the record being saved.
    pub fn is_only_me(&self, matches: &[EntityRecord]) -> bool {
        match matches {
            [] => true,
            [only] => only.entity_id().is_some() && only.entity_id() == self.entity_id(),
            _ => false,
        }
    }
}

fn read_token(document: &Document, key: &'static str) -> Result<Option<VersionToken>, RecordError> {
    VersionToken::from_json(document.get(key)).map_err(|source| RecordError::InvalidToken { key, source })
}

/// Render a key value as the string form used in documents and filters.
pub fn value_to_key(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
