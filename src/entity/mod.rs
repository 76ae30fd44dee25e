//! Entity model and version ledger.
//!
//! - [`EntityType`] describes a kind of record at registration time.
//! - [`EntityRecord`] is one record instance together with its ledger state.
//! - [`VersionToken`] is the opaque ordered token the ledger compares.
//! - [`EntityRegistry`] holds the types a service can operate on.

pub mod descriptor;
pub mod ledger;
pub mod record;
pub mod registry;
pub mod token;

pub use descriptor::{
    DependentLink, EntityRules, EntityType, EntityTypeBuilder, FieldKind, FieldSpec, MasterLink,
    Overlay,
};
pub use record::{Document, EntityRecord, RecordError, value_to_key};
pub use registry::{EntityRegistry, RegistryError};
pub use token::{TokenError, VersionToken};

/// The write being validated or hooked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Save,
    Remove,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Save => "SAVE",
            Action::Remove => "REMOVE",
        }
    }
}
