//! Validation stages.
//!
//! Structural checks come from field metadata, integrity checks from the
//! type's [`EntityRules`](crate::entity::EntityRules), feasibility checks from
//! the service hooks. A blocking message from integrity wins over one from
//! feasibility, which wins over the accumulated field errors.

use crate::entity::{Action, EntityRecord, FieldKind, FieldSpec};
use crate::error::{ServiceError, ServiceResult, ValidationError};
use crate::messages::MessageCatalog;
use crate::service::{EntityService, ServiceHooks, ServiceRequest};
use crate::storage::EntityStore;
use log::debug;
use serde_json::Value;

pub const REQUIRED: &str = "validation.required";
pub const MAX_LENGTH: &str = "validation.maxLength";
pub const WRONG_TYPE: &str = "validation.type";

impl<S, H> EntityService<S, H>
where
    S: EntityStore,
    H: ServiceHooks<S::Session>,
{
    pub(super) async fn validate(
        &self,
        session: &mut S::Session,
        action: Action,
        request: &ServiceRequest,
        record: &EntityRecord,
    ) -> ServiceResult<()> {
        let mut errors = match action {
            Action::Save => structural_errors(record),
            Action::Remove => Vec::new(),
        };

        if let Some(rules) = record.entity_type().rules() {
            if let Some(blocking) = rules.check_integrity(action, record, &mut errors) {
                debug!("Integrity check blocked {} of {}", action.as_str(), record.entity_type().name());
                return Err(ServiceError::validation_message(format_error(&self.messages, &blocking)));
            }
        }

        if let Some(blocking) = self
            .hooks
            .validate_feasibility(session, action, request, record, &mut errors)
            .await?
        {
            debug!("Feasibility check blocked {} of {}", action.as_str(), record.entity_type().name());
            return Err(ServiceError::validation_message(format_error(&self.messages, &blocking)));
        }

        if errors.is_empty() {
            return Ok(());
        }

        debug!("{} field error(s) on {}", errors.len(), record.entity_type().name());
        Err(ServiceError::validation_errors(
            errors
                .into_iter()
                .map(|error| ValidationError {
                    message: format_error(&self.messages, &error),
                    ..error
                })
                .collect(),
        ))
    }
}

fn format_error(messages: &MessageCatalog, error: &ValidationError) -> String {
    messages.format(&error.message, &error.args)
}

/// Required, length and kind checks for every declared field.
pub fn structural_errors(record: &EntityRecord) -> Vec<ValidationError> {
    record
        .entity_type()
        .fields()
        .iter()
        .filter_map(|field| check_field(field, record.get(&field.name)))
        .collect()
}

fn check_field(field: &FieldSpec, value: Option<&Value>) -> Option<ValidationError> {
    let Some(value) = value else {
        return field
            .required
            .then(|| ValidationError::field(&field.name, REQUIRED).with_args([field.name.as_str()]));
    };

    let kind_ok = match field.kind {
        FieldKind::Text | FieldKind::Temporal => value.is_string(),
        FieldKind::Numeric => value.is_number(),
        FieldKind::Boolean => value.is_boolean(),
        FieldKind::ForeignKey => value.is_number() || value.is_string(),
    };
    if !kind_ok {
        return Some(
            ValidationError::field(&field.name, WRONG_TYPE)
                .with_args([field.name.as_str(), field.kind.label()]),
        );
    }

    let too_long = match (field.max_len, value.as_str()) {
        (Some(max), Some(text)) => text.chars().count() > max,
        _ => false,
    };
    too_long.then(|| {
        ValidationError::field(&field.name, MAX_LENGTH)
            .with_args([field.name.clone(), field.max_len.unwrap_or_default().to_string()])
    })
}
