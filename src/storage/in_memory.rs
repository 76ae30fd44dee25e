//! In-memory relational store.
//!
//! Tables are maps from key to row, guarded by one async `RwLock`. Each
//! session works on its own snapshot and keeps the committed revision of
//! every row it writes. Commit re-checks those revisions under the write lock
//! and refuses to apply anything if another session got there first.
//!
//! # Example Usage
//!
//! ```rust
//! use crud_ledger::entity::{EntityType, FieldSpec};
//! use crud_ledger::storage::{EntityStore, InMemoryStore, StoreSession};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let scorecard = EntityType::builder("Scorecard", "scorecard")
//!     .id(FieldSpec::numeric("scorecardId"))
//!     .version_field("lastUpdated")
//!     .field(FieldSpec::text("name"))
//!     .build();
//! let store = InMemoryStore::new();
//!
//! let mut first = store.begin().await?;
//! let mut second = store.begin().await?;
//!
//! let row = json!({"name": "Quarterly"}).as_object().cloned().unwrap_or_default();
//! first.save(&scorecard, row.clone()).await?;
//! second.save(&scorecard, row).await?;
//!
//! first.commit().await?;
//! second.commit().await?; // different keys, so no conflict
//! assert_eq!(store.stats().await.total_rows, 2);
//! # Ok(())
//! # }
//! ```

use crate::entity::{Document, EntityType, VersionToken, value_to_key};
use crate::query::{OrderTerm, SelectQuery, SortDirection};
use crate::storage::{EntityStore, Page, RowKey, StoreError, StoreSession};
use log::{debug, trace};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct StoredRow {
    data: Document,
    revision: u64,
}

type Table = HashMap<String, StoredRow>;

#[derive(Debug, Default)]
struct StoreState {
    tables: HashMap<String, Table>,
    sequences: HashMap<String, u64>,
    revision: u64,
}

/// Thread-safe in-memory store.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<StoreState>>,
}

/// Row counts for debugging and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InMemoryStoreStats {
    pub table_count: usize,
    pub total_rows: usize,
}

impl InMemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn stats(&self) -> InMemoryStoreStats {
        let state = self.state.read().await;
        InMemoryStoreStats {
            table_count: state.tables.values().filter(|t| !t.is_empty()).count(),
            total_rows: state.tables.values().map(HashMap::len).sum(),
        }
    }

    /// Number of committed rows in `table`.
    pub async fn row_count(&self, table: &str) -> usize {
        let state = self.state.read().await;
        state.tables.get(table).map(HashMap::len).unwrap_or(0)
    }

    /// Remove all data (useful for testing).
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.tables.clear();
        state.sequences.clear();
    }
}

impl EntityStore for InMemoryStore {
    type Session = InMemorySession;

    async fn begin(&self) -> Result<Self::Session, StoreError> {
        let state = self.state.read().await;
        trace!("Opening session at revision {}", state.revision);
        Ok(InMemorySession {
            state: self.state.clone(),
            working: state.tables.clone(),
            staged: BTreeMap::new(),
            observed: HashMap::new(),
        })
    }
}

/// A unit of work over an [`InMemoryStore`].
pub struct InMemorySession {
    state: Arc<RwLock<StoreState>>,
    /// Snapshot at begin plus flushed writes.
    working: HashMap<String, Table>,
    /// Writes not yet flushed; `None` marks a delete.
    staged: BTreeMap<RowKey, Option<Document>>,
    /// Committed revision of each written row as first seen; `None` if new.
    observed: HashMap<RowKey, Option<u64>>,
}

impl InMemorySession {
    fn flushed(&self, key: &RowKey) -> Option<&StoredRow> {
        self.working.get(key.table()).and_then(|table| table.get(key.id()))
    }

    /// Latest state of a row including unflushed writes.
    fn latest(&self, key: &RowKey) -> Option<&Document> {
        match self.staged.get(key) {
            Some(staged) => staged.as_ref(),
            None => self.flushed(key).map(|row| &row.data),
        }
    }

    /// Latest rows of a table including unflushed writes.
    fn latest_rows(&self, table: &str) -> Vec<(String, Document)> {
        let mut rows: BTreeMap<String, Document> = self
            .working
            .get(table)
            .map(|rows| {
                rows.iter()
                    .map(|(id, row)| (id.clone(), row.data.clone()))
                    .collect()
            })
            .unwrap_or_default();

        for (key, staged) in self.staged.iter().filter(|(key, _)| key.table() == table) {
            match staged {
                Some(row) => {
                    rows.insert(key.id().to_string(), row.clone());
                }
                None => {
                    rows.remove(key.id());
                }
            }
        }
        rows.into_iter().collect()
    }

    fn stage(&mut self, key: RowKey, row: Option<Document>) {
        if !self.observed.contains_key(&key) {
            let revision = self.flushed(&key).map(|row| row.revision);
            self.observed.insert(key.clone(), revision);
        }
        self.staged.insert(key, row);
    }

    fn flushed_rows_ordered(&self, entity_type: &EntityType) -> Vec<Document> {
        let mut rows: Vec<Document> = self
            .working
            .get(entity_type.table())
            .map(|table| table.values().map(|row| row.data.clone()).collect())
            .unwrap_or_default();
        by_key(entity_type).sort(&mut rows);
        rows
    }

    async fn next_key(&self, entity_type: &EntityType) -> Value {
        if !entity_type.has_numeric_key() {
            return Value::String(uuid::Uuid::new_v4().to_string());
        }

        let mut state = self.state.write().await;
        let table = entity_type.table();
        let highest_committed = state
            .tables
            .get(table)
            .map(|rows| {
                rows.keys()
                    .filter_map(|id| id.parse::<u64>().ok())
                    .max()
                    .unwrap_or(0)
            })
            .unwrap_or(0);
        let sequence = state.sequences.entry(table.to_string()).or_insert(0);
        *sequence = (*sequence).max(highest_committed) + 1;
        Value::from(*sequence)
    }

    fn delete_cascading(&mut self, entity_type: &EntityType, id: &Value) -> Result<(), StoreError> {
        let key = RowKey::of(entity_type, id);
        if self.latest(&key).is_none() {
            return Err(StoreError::conflict(key.table(), key.id()));
        }

        let owner_key = value_to_key(id);
        for dependent in entity_type.dependents() {
            let dependent_type = dependent.entity_type.clone();
            let dependent_id_field = &dependent_type.id_field().name;
            let children: Vec<Value> = self
                .latest_rows(dependent_type.table())
                .into_iter()
                .filter(|(_, row)| {
                    row.get(&dependent.via_field)
                        .is_some_and(|value| !value.is_null() && value_to_key(value) == owner_key)
                })
                .filter_map(|(_, row)| row.get(dependent_id_field).cloned())
                .collect();

            for child in children {
                trace!("Cascading delete to {}/{}", dependent_type.table(), value_to_key(&child));
                self.delete_cascading(&dependent_type, &child)?;
            }
        }

        self.stage(key, None);
        Ok(())
    }
}

fn by_key(entity_type: &EntityType) -> SelectQuery {
    SelectQuery {
        order: vec![OrderTerm {
            field: entity_type.id_field().name.clone(),
            direction: SortDirection::Asc,
        }],
        ..Default::default()
    }
}

fn read_version(row: &Document, column: &str) -> Result<Option<VersionToken>, StoreError> {
    VersionToken::from_json(row.get(column))
        .map_err(|e| StoreError::invalid_data_with_cause(format!("bad version in '{}'", column), e.to_string()))
}

impl StoreSession for InMemorySession {
    async fn find_by_id(
        &mut self,
        entity_type: &EntityType,
        id: &Value,
    ) -> Result<Option<Document>, StoreError> {
        let key = RowKey::of(entity_type, id);
        Ok(self.flushed(&key).map(|row| row.data.clone()))
    }

    async fn find_all(&mut self, entity_type: &EntityType) -> Result<Vec<Document>, StoreError> {
        Ok(self.flushed_rows_ordered(entity_type))
    }

    async fn save(
        &mut self,
        entity_type: &EntityType,
        mut row: Document,
    ) -> Result<Document, StoreError> {
        let id_field = entity_type.id_field().name.clone();
        let id = match row.get(&id_field).filter(|value| !value.is_null()) {
            Some(id) => id.clone(),
            None => {
                let id = self.next_key(entity_type).await;
                row.insert(id_field, id.clone());
                id
            }
        };
        let key = RowKey::of(entity_type, &id);

        if let Some(column) = entity_type.version_field() {
            let stored = match self.latest(&key) {
                Some(existing) => read_version(existing, column)?,
                None => None,
            };
            let incoming = read_version(&row, column)?;

            if let (Some(incoming), Some(stored)) = (incoming, stored) {
                if incoming != stored {
                    debug!("Version column mismatch on {}", key);
                    return Err(StoreError::version_conflict(
                        key.table(),
                        key.id(),
                        incoming.to_string(),
                        stored.to_string(),
                    ));
                }
            }

            let next = stored
                .map(|stored| VersionToken::after(&stored))
                .unwrap_or_else(VersionToken::now);
            row.insert(column.to_string(), next.to_json());
        }

        trace!("Staging save of {}", key);
        self.stage(key, Some(row.clone()));
        Ok(row)
    }

    async fn delete(&mut self, entity_type: &EntityType, id: &Value) -> Result<(), StoreError> {
        self.delete_cascading(entity_type, id)
    }

    async fn force_increment(
        &mut self,
        entity_type: &EntityType,
        id: &Value,
    ) -> Result<VersionToken, StoreError> {
        let column = entity_type.version_field().ok_or_else(|| {
            StoreError::invalid_data(format!("{} has no version column", entity_type.name()))
        })?;
        let key = RowKey::of(entity_type, id);
        let mut row = self
            .latest(&key)
            .cloned()
            .ok_or_else(|| StoreError::conflict(key.table(), key.id()))?;

        let next = match read_version(&row, column)? {
            Some(previous) => VersionToken::after(&previous),
            None => VersionToken::now(),
        };
        row.insert(column.to_string(), next.to_json());
        debug!("Force increment of {} to {}", key, next);
        self.stage(key, Some(row));
        Ok(next)
    }

    async fn query(
        &mut self,
        entity_type: &EntityType,
        query: &SelectQuery,
    ) -> Result<Page, StoreError> {
        let mut rows: Vec<Document> = self
            .flushed_rows_ordered(entity_type)
            .into_iter()
            .filter(|row| query.matches(row))
            .collect();
        query.sort(&mut rows);

        let total = rows.len();
        let rows = rows
            .into_iter()
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .collect();
        Ok(Page { rows, total })
    }

    async fn flush(&mut self) -> Result<(), StoreError> {
        for (key, staged) in std::mem::take(&mut self.staged) {
            let table = self.working.entry(key.table().to_string()).or_default();
            match staged {
                Some(data) => {
                    let revision = table.get(key.id()).map(|row| row.revision).unwrap_or(0);
                    table.insert(key.id().to_string(), StoredRow { data, revision });
                }
                None => {
                    table.remove(key.id());
                }
            }
        }
        Ok(())
    }

    async fn detach(&mut self, entity_type: &EntityType, id: &Value) -> Result<(), StoreError> {
        self.staged.remove(&RowKey::of(entity_type, id));
        Ok(())
    }

    async fn commit(mut self) -> Result<(), StoreError> {
        self.flush().await?;
        let mut state = self.state.write().await;

        for (key, seen) in &self.observed {
            let current = state
                .tables
                .get(key.table())
                .and_then(|table| table.get(key.id()))
                .map(|row| row.revision);
            if current != *seen {
                debug!("Commit rejected: {} changed since it was read", key);
                return Err(StoreError::conflict(key.table(), key.id()));
            }
        }

        for key in self.observed.keys() {
            state.revision += 1;
            let revision = state.revision;
            let written = self
                .working
                .get(key.table())
                .and_then(|table| table.get(key.id()))
                .map(|row| row.data.clone());
            let table = state.tables.entry(key.table().to_string()).or_default();
            match written {
                Some(data) => {
                    table.insert(key.id().to_string(), StoredRow { data, revision });
                }
                None => {
                    table.remove(key.id());
                }
            }
        }

        trace!("Committed {} row change(s)", self.observed.len());
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        trace!("Rolled back {} row change(s)", self.observed.len());
        Ok(())
    }
}
