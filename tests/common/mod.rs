//! Common test utilities.
//!
//! Fixtures for a scorecard cluster plus hooks that exercise every extension
//! point: integrity rules, uniqueness feasibility, confirmation on remove and
//! fan-out after persist.

use crud_ledger::entity::{
    Action, Document, EntityRecord, EntityRegistry, EntityRules, EntityType, FieldSpec,
};
use crud_ledger::error::{ServiceError, ServiceResult, ValidationError};
use crud_ledger::query::QueryBuilder;
use crud_ledger::service::{
    EntityService, ResultType, ServiceHooks, ServiceRequest, ServiceResponse,
};
use crud_ledger::storage::{InMemoryStore, StoreSession};
use crud_ledger::{LedgerConfig, MessageCatalog, VersionToken};
use serde_json::{Value, json};
use std::sync::Arc;

pub const SCORECARD: &str = "Scorecard";
pub const CRITERION: &str = "Criterion";
pub const SCORE: &str = "Score";

/// Confirmation code required to remove a scorecard.
pub const REMOVE_CONF: &str = "REMOVE_CONF";

pub type TestService = EntityService<InMemoryStore, LedgerHooks>;

/// Route log output through the test harness.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Scorecards cannot be saved once their status is `LOCKED`.
pub struct ScorecardRules;

impl EntityRules for ScorecardRules {
    fn check_integrity(
        &self,
        action: Action,
        record: &EntityRecord,
        errors: &mut Vec<ValidationError>,
    ) -> Option<ValidationError> {
        if action != Action::Save {
            return None;
        }
        if record.get("status") == Some(&json!("LOCKED")) {
            let name = record.get("name").and_then(Value::as_str).unwrap_or_default();
            return Some(ValidationError::general("scorecard.locked").with_args([name]));
        }
        if let (Some(low), Some(high)) = (
            record.get("minScore").and_then(Value::as_i64),
            record.get("maxScore").and_then(Value::as_i64),
        ) {
            if low > high {
                errors.push(ValidationError::field("minScore_range", "scorecard.range"));
            }
        }
        None
    }
}

pub fn scorecard_types() -> (Arc<EntityType>, Arc<EntityType>, Arc<EntityType>) {
    let score = EntityType::builder(SCORE, "score")
        .id(FieldSpec::numeric("scoreId"))
        .field(FieldSpec::foreign_key("criterionId").required())
        .field(FieldSpec::numeric("value"))
        .mastered_by(CRITERION, "criterionId")
        .build();
    let criterion = EntityType::builder(CRITERION, "criterion")
        .id(FieldSpec::numeric("criterionId"))
        .field(FieldSpec::foreign_key("scorecardId").required())
        .field(FieldSpec::text("name").required().max_len(40))
        .field(FieldSpec::numeric("weight"))
        .mastered_by(SCORECARD, "scorecardId")
        .master_key_mapping("scorecardId")
        .dependent(score.clone(), "criterionId")
        .build();
    let scorecard = EntityType::builder(SCORECARD, "scorecard")
        .id(FieldSpec::numeric("scorecardId"))
        .version_field("lastUpdated")
        .field(FieldSpec::text("name").required().max_len(20))
        .field(FieldSpec::text("description"))
        .field(FieldSpec::text("status"))
        .field(FieldSpec::numeric("minScore"))
        .field(FieldSpec::numeric("maxScore"))
        .dependent(criterion.clone(), "scorecardId")
        .rules(Arc::new(ScorecardRules))
        .build();
    (scorecard, criterion, score)
}

/// Registry with masters registered before the types they govern.
pub fn registry() -> EntityRegistry {
    let (scorecard, criterion, score) = scorecard_types();
    let mut registry = EntityRegistry::new();
    registry.register(scorecard).unwrap();
    registry.register(criterion).unwrap();
    registry.register(score).unwrap();
    registry
}

pub fn messages() -> MessageCatalog {
    MessageCatalog::with_defaults()
        .with("scorecard.locked", "Scorecard {0} is locked")
        .with("scorecard.frozen", "Scorecards are frozen")
        .with("scorecard.nameUnique", "A scorecard named {0} already exists")
        .with("scorecard.range", "Minimum score exceeds maximum")
        .with("scorecard.removeConfirm", "Remove scorecard and all its criteria?")
}

/// Hooks for the scorecard cluster.
pub struct LedgerHooks;

impl<S: StoreSession> ServiceHooks<S> for LedgerHooks {
    async fn validate_feasibility(
        &self,
        session: &mut S,
        action: Action,
        request: &ServiceRequest,
        record: &EntityRecord,
        errors: &mut Vec<ValidationError>,
    ) -> ServiceResult<Option<ValidationError>> {
        if action != Action::Save || record.entity_type().name() != SCORECARD {
            return Ok(None);
        }
        if request.context.get("frozen") == Some(&Value::Bool(true)) {
            return Ok(Some(ValidationError::general("scorecard.frozen")));
        }

        let Some(name) = record.get("name").and_then(Value::as_str) else {
            return Ok(None);
        };
        let entity_type = record.entity_type();
        let query = QueryBuilder::new(entity_type)
            .select(&[], &[("name".to_string(), name.to_string())])
            .map_err(|e| ServiceError::system("QUERY_REJECTED", e.to_string()))?;
        let page = session
            .query(entity_type, &query)
            .await
            .map_err(|e| ServiceError::system("STORE_FAILURE", e.to_string()))?;
        let matches: Vec<EntityRecord> = page
            .rows
            .into_iter()
            .map(|row| EntityRecord::from_row(entity_type.clone(), *record.controls(), row))
            .collect();
        if !record.is_only_me(&matches) {
            errors.push(ValidationError::field("name_unique", "scorecard.nameUnique").with_args([name]));
        }
        Ok(None)
    }

    async fn do_business_operations(
        &self,
        _session: &mut S,
        action: Action,
        request: &ServiceRequest,
        record: &mut EntityRecord,
    ) -> ServiceResult<Option<String>> {
        if action == Action::Remove
            && record.entity_type().name() == SCORECARD
            && !request.confirms(REMOVE_CONF)
        {
            return Err(ServiceError::warning(
                REMOVE_CONF,
                messages().format::<&str>("scorecard.removeConfirm", &[]),
            ));
        }
        Ok(None)
    }

    async fn after_persist(
        &self,
        session: &mut S,
        request: &ServiceRequest,
        stored: &EntityRecord,
    ) -> ServiceResult<Option<String>> {
        if stored.entity_type().name() != CRITERION {
            return Ok(None);
        }
        let Some(count) = request.context.get("seedScores").and_then(Value::as_u64) else {
            return Ok(None);
        };
        let Some(score_type) = stored
            .entity_type()
            .dependents()
            .first()
            .map(|link| link.entity_type.clone())
        else {
            return Ok(None);
        };
        let criterion_id = stored.id().cloned().unwrap_or(Value::Null);
        for _ in 0..count {
            let row = json!({"criterionId": criterion_id, "value": 0});
            session
                .save(&score_type, row.as_object().cloned().unwrap_or_default())
                .await
                .map_err(|e| ServiceError::system("STORE_FAILURE", e.to_string()))?;
        }
        session
            .flush()
            .await
            .map_err(|e| ServiceError::system("STORE_FAILURE", e.to_string()))?;
        Ok(Some(format!("Created {} score(s)", count)))
    }
}

pub fn service() -> TestService {
    service_with(LedgerConfig::default())
}

pub fn service_with(config: LedgerConfig) -> TestService {
    init_logging();
    EntityService::with_hooks(InMemoryStore::new(), registry(), config, LedgerHooks)
        .with_messages(messages())
}

pub fn create(data: Value) -> ServiceRequest {
    ServiceRequest::new().with_data(data)
}

pub fn update(id: &str, data: Value) -> ServiceRequest {
    ServiceRequest::new().with_entity_id(id).with_data(data)
}

pub fn assert_ok(response: &ServiceResponse) {
    assert_eq!(
        response.result_type,
        ResultType::Ok,
        "unexpected failure: {:?}",
        response
    );
    assert!(response.success);
}

/// The `entityId` of an encoded record.
pub fn entity_id(document: &Value) -> String {
    document["entityId"]
        .as_str()
        .unwrap_or_else(|| panic!("no entityId in {}", document))
        .to_string()
}

/// The `versionControl` token of an encoded record.
pub fn version(document: &Value) -> VersionToken {
    document["versionControl"]
        .as_str()
        .unwrap_or_else(|| panic!("no versionControl in {}", document))
        .parse()
        .unwrap()
}

pub fn document(value: Value) -> Document {
    value.as_object().cloned().unwrap()
}

/// Create a scorecard and return its response.
pub async fn create_scorecard(service: &TestService, name: &str) -> ServiceResponse {
    let response = service
        .save_entity(SCORECARD, &create(json!({"name": name})))
        .await;
    assert_ok(&response);
    response
}

/// The current cluster token of a stored record, if versions are controlled.
pub async fn current_version(service: &TestService, entity_type: &str, id: &str) -> Option<VersionToken> {
    let found = service
        .find_entity(entity_type, &ServiceRequest::new().with_entity_id(id))
        .await;
    assert_ok(&found);
    found.data["versionControl"].as_str().map(|token| token.parse().unwrap())
}

/// Create a criterion under `scorecard_id` with the scorecard's current token.
pub async fn create_criterion(service: &TestService, scorecard_id: &str, name: &str) -> ServiceResponse {
    let mut data = json!({"scorecardId": scorecard_id.parse::<i64>().unwrap(), "name": name});
    if let Some(token) = current_version(service, SCORECARD, scorecard_id).await {
        data["versionControl"] = json!(token.to_string());
    }
    let response = service.save_entity(CRITERION, &create(data)).await;
    assert_ok(&response);
    response
}
