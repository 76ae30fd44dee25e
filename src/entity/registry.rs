//! Registry of entity types known to a service.

use crate::entity::{EntityType, MasterLink};
use std::collections::HashMap;
use std::sync::Arc;

/// Errors raised while registering entity types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Entity type '{0}' is already registered")]
    Duplicate(String),

    #[error("Entity type '{entity}' is mastered by unregistered type '{master}'")]
    UnknownMaster { entity: String, master: String },

    #[error("Entity type '{entity}' links to its master through undeclared field '{field}'")]
    UnknownLinkField { entity: String, field: String },

    #[error("Entity type '{0}' is its own master but declares no version field")]
    MissingVersionField(String),

    #[error("Entity type '{entity}' maps master keys onto undeclared field '{field}'")]
    UnknownMappingField { entity: String, field: String },
}

/// Entity types keyed by name.
///
/// Masters must be registered before the types they govern so every link can
/// be checked at registration time.
#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    types: HashMap<String, Arc<EntityType>>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, entity_type: Arc<EntityType>) -> Result<(), RegistryError> {
        let name = entity_type.name().to_string();
        if self.types.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }

        match entity_type.master_link() {
            MasterLink::SelfMaster => {
                if entity_type.version_field().is_none() {
                    return Err(RegistryError::MissingVersionField(name));
                }
            }
            MasterLink::MasteredBy {
                master_type,
                via_field,
            } => {
                if master_type != &name && !self.types.contains_key(master_type) {
                    return Err(RegistryError::UnknownMaster {
                        entity: name,
                        master: master_type.clone(),
                    });
                }
                if entity_type.column_kind(via_field).is_none() {
                    return Err(RegistryError::UnknownLinkField {
                        entity: name,
                        field: via_field.clone(),
                    });
                }
            }
        }

        if let Some(mapping) = entity_type.master_key_mapping() {
            let unknown = mapping
                .split('|')
                .filter(|segment| !segment.is_empty())
                .find(|segment| entity_type.column_kind(segment).is_none());
            if let Some(field) = unknown {
                return Err(RegistryError::UnknownMappingField {
                    entity: name,
                    field: field.to_string(),
                });
            }
        }

        log::debug!("Registered entity type '{}'", name);
        self.types.insert(name, entity_type);
        Ok(())
    }

    /// Builder-style registration.
    pub fn with(mut self, entity_type: Arc<EntityType>) -> Result<Self, RegistryError> {
        self.register(entity_type)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<EntityType>> {
        self.types.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.types.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
