//! Persistence collaborator.
//!
//! The service layer never talks to a database directly. It opens one
//! [`StoreSession`] per request through an [`EntityStore`], performs all reads
//! and writes inside that session, and finally commits or rolls it back.
//!
//! # Contract
//!
//! A session behaves like an ORM unit of work:
//! - writes are staged and become visible to reads in the same session only
//!   after [`flush`](StoreSession::flush);
//! - saving a row of a type with a version column refreshes that column, and
//!   raises [`StoreError::Conflict`] if the incoming column no longer matches
//!   the stored one;
//! - [`commit`](StoreSession::commit) raises [`StoreError::Conflict`] when a
//!   row written in the session was changed by another session since it was
//!   read; nothing from the session is applied in that case;
//! - [`rollback`](StoreSession::rollback) discards everything, including any
//!   forced version increments.
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
//!
//! let store = InMemoryStore::new();
//! let mut session = store.begin().await?;
//! let row = json!({"name": "Quarterly"}).as_object().cloned().unwrap_or_default();
//! let saved = session.save(&scorecard, row).await?;
//! session.flush().await?;
//! session.commit().await?;
//! assert!(saved.contains_key("scorecardId"));
//! # Ok(())
//! # }
//! ```

pub mod errors;
pub mod in_memory;

pub use errors::StoreError;
pub use in_memory::{InMemoryStore, InMemoryStoreStats};

use crate::entity::{Document, EntityType, VersionToken, value_to_key};
use crate::query::SelectQuery;
use serde_json::Value;
use std::fmt;
use std::future::Future;

/// Identifies one stored row: table plus key rendered as a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowKey {
    table: String,
    id: String,
}

impl RowKey {
    pub fn new(table: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            id: id.into(),
        }
    }

    /// Key for `id` in the table backing `entity_type`.
    pub fn of(entity_type: &EntityType, id: &Value) -> Self {
        Self::new(entity_type.table(), value_to_key(id))
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.table, self.id)
    }
}

/// One page of query results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub rows: Vec<Document>,
    /// Rows matching the predicate before paging.
    pub total: usize,
}

/// A source of transactional sessions.
pub trait EntityStore: Send + Sync {
    type Session: StoreSession;

    /// Open a new unit of work.
    fn begin(&self) -> impl Future<Output = Result<Self::Session, StoreError>> + Send;
}

/// One unit of work against the store.
pub trait StoreSession: Send {
    /// Load a row by key. `Ok(None)` when absent.
    fn find_by_id(
        &mut self,
        entity_type: &EntityType,
        id: &Value,
    ) -> impl Future<Output = Result<Option<Document>, StoreError>> + Send;

    /// Load every row of a type, ordered by key.
    fn find_all(
        &mut self,
        entity_type: &EntityType,
    ) -> impl Future<Output = Result<Vec<Document>, StoreError>> + Send;

    /// Insert or update a row and return it as stored.
    ///
    /// Rows without a key are inserted under a newly assigned key. Types with
    /// a version column get a fresh token on every write.
    fn save(
        &mut self,
        entity_type: &EntityType,
        row: Document,
    ) -> impl Future<Output = Result<Document, StoreError>> + Send;

    /// Delete a row and, transitively, the dependent rows that reference it.
    fn delete(
        &mut self,
        entity_type: &EntityType,
        id: &Value,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Bump a master's version column without changing anything else.
    fn force_increment(
        &mut self,
        entity_type: &EntityType,
        id: &Value,
    ) -> impl Future<Output = Result<VersionToken, StoreError>> + Send;

    /// Run a select and count over one type.
    fn query(
        &mut self,
        entity_type: &EntityType,
        query: &SelectQuery,
    ) -> impl Future<Output = Result<Page, StoreError>> + Send;

    /// Make staged writes visible to subsequent reads in this session.
    fn flush(&mut self) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Drop unflushed writes for a row. Flushed state, including a flushed
    /// delete, is untouched.
    fn detach(
        &mut self,
        entity_type: &EntityType,
        id: &Value,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Apply the session's writes atomically.
    fn commit(self) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Discard the session's writes.
    fn rollback(self) -> impl Future<Output = Result<(), StoreError>> + Send;
}
