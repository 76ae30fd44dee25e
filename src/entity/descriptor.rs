//! Registration-time entity metadata.
//!
//! An [`EntityType`] is an explicit table describing one kind of record: its
//! key, its own version column (for masters), its fields and their kinds,
//! and how it links to the master whose version governs it. Query building,
//! JSON overlay and structural validation all read this table; nothing is
//! discovered at runtime.

use crate::config::ControlOverrides;
use crate::entity::{Action, EntityRecord};
use crate::error::ValidationError;
use std::fmt;
use std::sync::Arc;

/// Storage and comparison kind of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Text,
    Temporal,
    Numeric,
    Boolean,
    /// Key of another entity; compared and bound like a number.
    ForeignKey,
}

impl FieldKind {
    /// Text and temporal values bind as strings, everything else as literals.
    pub fn binds_as_text(self) -> bool {
        matches!(self, FieldKind::Text | FieldKind::Temporal)
    }

    pub fn label(self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Temporal => "date/time",
            FieldKind::Numeric => "numeric",
            FieldKind::Boolean => "true/false",
            FieldKind::ForeignKey => "reference",
        }
    }
}

/// How a decoded document affects an existing value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overlay {
    /// Always replaced, even by `null` or absence.
    Always,
    /// Replaced only when the document supplies a non-null value.
    WhenPresent,
}

/// One declared field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub overlay: Overlay,
    pub required: bool,
    pub max_len: Option<usize>,
    /// Transient fields are encoded for callers but never stored.
    pub persistent: bool,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            overlay: Overlay::WhenPresent,
            required: false,
            max_len: None,
            persistent: true,
        }
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Text)
    }

    pub fn temporal(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Temporal)
    }

    pub fn numeric(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Numeric)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Boolean)
    }

    pub fn foreign_key(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::ForeignKey)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn max_len(mut self, max_len: usize) -> Self {
        self.max_len = Some(max_len);
        self
    }

    pub fn always_overwrite(mut self) -> Self {
        self.overlay = Overlay::Always;
        self
    }

    pub fn transient(mut self) -> Self {
        self.persistent = false;
        self
    }
}

/// Where an entity's version comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MasterLink {
    /// The entity is its own master and carries a version column.
    SelfMaster,
    /// The entity is governed by the master named `master_type`, found by
    /// reading `via_field` on this entity.
    MasteredBy {
        master_type: String,
        via_field: String,
    },
}

/// Rows of another type removed together with their owner.
#[derive(Debug, Clone)]
pub struct DependentLink {
    pub entity_type: Arc<EntityType>,
    /// Field on the dependent holding the owner's key.
    pub via_field: String,
}

/// Entity-declared integrity checks.
///
/// Returning `Some` yields a single blocking message that wins over any
/// accumulated field errors. Otherwise push errors onto `errors`.
pub trait EntityRules: Send + Sync {
    fn check_integrity(
        &self,
        action: Action,
        record: &EntityRecord,
        errors: &mut Vec<ValidationError>,
    ) -> Option<ValidationError>;
}

/// Metadata for one entity type.
pub struct EntityType {
    name: String,
    table: String,
    id: FieldSpec,
    version_field: Option<String>,
    fields: Vec<FieldSpec>,
    master: MasterLink,
    master_key_mapping: Option<String>,
    dependents: Vec<DependentLink>,
    overrides: ControlOverrides,
    rules: Option<Arc<dyn EntityRules>>,
}

impl EntityType {
    /// Start describing a type stored in `table`.
    pub fn builder(name: impl Into<String>, table: impl Into<String>) -> EntityTypeBuilder {
        let name = name.into();
        EntityTypeBuilder {
            entity: EntityType {
                id: FieldSpec::numeric("id").always_overwrite(),
                table: table.into(),
                name,
                version_field: None,
                fields: Vec::new(),
                master: MasterLink::SelfMaster,
                master_key_mapping: None,
                dependents: Vec::new(),
                overrides: ControlOverrides::default(),
                rules: None,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn id_field(&self) -> &FieldSpec {
        &self.id
    }

    pub fn version_field(&self) -> Option<&str> {
        self.version_field.as_deref()
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn master_link(&self) -> &MasterLink {
        &self.master
    }

    pub fn is_mastered(&self) -> bool {
        matches!(self.master, MasterLink::MasteredBy { .. })
    }

    /// Pipe-delimited fields that a composite master id expands into.
    pub fn master_key_mapping(&self) -> Option<&str> {
        self.master_key_mapping.as_deref()
    }

    pub fn dependents(&self) -> &[DependentLink] {
        &self.dependents
    }

    pub fn overrides(&self) -> &ControlOverrides {
        &self.overrides
    }

    pub fn rules(&self) -> Option<&dyn EntityRules> {
        self.rules.as_deref()
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Kind of any queryable column, including the key and version column.
    pub fn column_kind(&self, name: &str) -> Option<FieldKind> {
        if name == self.id.name {
            return Some(self.id.kind);
        }
        if self.version_field.as_deref() == Some(name) {
            return Some(FieldKind::Temporal);
        }
        self.field(name)
            .filter(|field| field.persistent)
            .map(|field| field.kind)
    }

    /// Whether identifiers are assigned from a numeric sequence.
    pub fn has_numeric_key(&self) -> bool {
        matches!(self.id.kind, FieldKind::Numeric | FieldKind::ForeignKey)
    }
}

impl fmt::Debug for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityType")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("id", &self.id.name)
            .field("version_field", &self.version_field)
            .field("master", &self.master)
            .field("fields", &self.fields.len())
            .field("dependents", &self.dependents.len())
            .finish_non_exhaustive()
    }
}

/// Builder for [`EntityType`].
pub struct EntityTypeBuilder {
    entity: EntityType,
}

impl EntityTypeBuilder {
    /// Declare the key field. Keys are always overwritten on decode.
    pub fn id(mut self, field: FieldSpec) -> Self {
        self.entity.id = field.always_overwrite();
        self
    }

    /// Declare the column the store refreshes on every write of a master.
    pub fn version_field(mut self, name: impl Into<String>) -> Self {
        self.entity.version_field = Some(name.into());
        self
    }

    pub fn field(mut self, field: FieldSpec) -> Self {
        self.entity.fields.push(field);
        self
    }

    /// Mark the type as governed by `master_type` through `via_field`.
    pub fn mastered_by(mut self, master_type: impl Into<String>, via_field: impl Into<String>) -> Self {
        self.entity.master = MasterLink::MasteredBy {
            master_type: master_type.into(),
            via_field: via_field.into(),
        };
        self
    }

    pub fn master_key_mapping(mut self, mapping: impl Into<String>) -> Self {
        self.entity.master_key_mapping = Some(mapping.into());
        self
    }

    /// Remove rows of `dependent` whose `via_field` holds this record's key
    /// whenever this record is removed.
    pub fn dependent(mut self, dependent: Arc<EntityType>, via_field: impl Into<String>) -> Self {
        self.entity.dependents.push(DependentLink {
            entity_type: dependent,
            via_field: via_field.into(),
        });
        self
    }

    pub fn overrides(mut self, overrides: ControlOverrides) -> Self {
        self.entity.overrides = overrides;
        self
    }

    pub fn rules(mut self, rules: Arc<dyn EntityRules>) -> Self {
        self.entity.rules = Some(rules);
        self
    }

    pub fn build(self) -> Arc<EntityType> {
        Arc::new(self.entity)
    }
}
