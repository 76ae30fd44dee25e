//! Two-phase removal and cascades.

use crate::common::{
    CRITERION, REMOVE_CONF, SCORE, SCORECARD, assert_ok, create, create_criterion,
    create_scorecard, entity_id, service, version,
};
use crud_ledger::error::REMOVE_REC_NOT_DEFINED;
use crud_ledger::operation_handler::{OperationHandler, OperationRequest};
use crud_ledger::service::{ResultType, ServiceRequest};
use serde_json::{Value, json};

#[tokio::test]
async fn removing_a_scorecard_asks_first() {
    let service = service();
    let card = create_scorecard(&service, "Annual").await;
    let card_id = entity_id(&card.data);
    let criterion = create_criterion(&service, &card_id, "Clarity").await;

    let request = ServiceRequest::new()
        .with_entity_id(card_id.as_str())
        .with_data(json!({"versionControl": version(&criterion.data).to_string()}));
    let warning = service.remove_entity(SCORECARD, &request).await;
    assert_eq!(warning.result_type, ResultType::Warning);
    assert!(!warning.success);
    assert!(warning.requires_confirmation(REMOVE_CONF));
    assert_eq!(
        warning.message.as_deref(),
        Some("Remove scorecard and all its criteria?")
    );

    let still_there = service.find_entity(SCORECARD, &request).await;
    assert_eq!(still_there.data["name"], json!("Annual"));

    let confirmed = service
        .remove_entity(SCORECARD, &request.clone().with_action_code(REMOVE_CONF))
        .await;
    assert_ok(&confirmed);
    assert_eq!(confirmed.data, Value::Null);
    assert_eq!(confirmed.master, None);

    let gone = service.find_entity(SCORECARD, &request).await;
    assert_eq!(gone.data, Value::Null);
    let criteria = service.find_all_entities(CRITERION, &ServiceRequest::new()).await;
    assert_eq!(criteria.total, Some(0));
}

#[tokio::test]
async fn removing_a_criterion_cascades_and_reports_the_master() {
    let service = service();
    let card = create_scorecard(&service, "Annual").await;
    let card_id = entity_id(&card.data);
    let kept = create_criterion(&service, &card_id, "Kept").await;
    let doomed = service
        .save_entity(
            CRITERION,
            &create(json!({
                "scorecardId": 1,
                "name": "Doomed",
                "versionControl": version(&kept.data).to_string()
            }))
            .with_context("seedScores", json!(2)),
        )
        .await;
    assert_ok(&doomed);
    let before = version(&doomed.data);

    let removed = service
        .remove_entity(
            CRITERION,
            &ServiceRequest::new()
                .with_entity_id(entity_id(&doomed.data))
                .with_data(json!({"versionControl": before.to_string()})),
        )
        .await;
    assert_ok(&removed);
    assert_eq!(removed.data, Value::Null);
    let master = removed.master.unwrap();
    assert_eq!(entity_id(&master), card_id);
    assert!(version(&master) > before);

    let scores = service.find_all_entities(SCORE, &ServiceRequest::new()).await;
    assert_eq!(scores.total, Some(0));
    let criteria = service.find_all_entities(CRITERION, &ServiceRequest::new()).await;
    assert_eq!(criteria.data.as_array().unwrap().len(), 1);
    assert_eq!(criteria.data[0]["entityId"], kept.data["entityId"]);
}

#[tokio::test]
async fn removal_with_a_stale_token_is_rejected() {
    let service = service();
    let card = create_scorecard(&service, "Annual").await;
    let card_id = entity_id(&card.data);
    let criterion = create_criterion(&service, &card_id, "Clarity").await;

    let removed = service
        .remove_entity(
            CRITERION,
            &ServiceRequest::new()
                .with_entity_id(entity_id(&criterion.data))
                .with_data(json!({"versionControl": version(&card.data).to_string()})),
        )
        .await;
    assert_eq!(removed.result_type, ResultType::StaleData);

    let criteria = service.find_all_entities(CRITERION, &ServiceRequest::new()).await;
    assert_eq!(criteria.total, Some(1));
}

#[tokio::test]
async fn removal_without_a_token_is_stale() {
    let service = service();
    let card = create_scorecard(&service, "Annual").await;
    let criterion = create_criterion(&service, &entity_id(&card.data), "Clarity").await;

    let removed = service
        .remove_entity(
            CRITERION,
            &ServiceRequest::new().with_entity_id(entity_id(&criterion.data)),
        )
        .await;
    assert_eq!(removed.result_type, ResultType::StaleData);

    let criteria = service.find_all_entities(CRITERION, &ServiceRequest::new()).await;
    assert_eq!(criteria.total, Some(1));
}

#[tokio::test]
async fn removal_needs_an_id() {
    let service = service();
    let response = service.remove_entity(SCORECARD, &ServiceRequest::new()).await;
    assert_eq!(response.result_type, ResultType::SystemError);
    assert_eq!(response.result_code.as_deref(), Some(REMOVE_REC_NOT_DEFINED));
    assert_eq!(
        response.message.as_deref(),
        Some("A system error has occurred [BEX001]")
    );
}

#[tokio::test]
async fn removing_twice_is_stale() {
    let service = service();
    let card = create_scorecard(&service, "Annual").await;
    let criterion = create_criterion(&service, &entity_id(&card.data), "Clarity").await;
    let request = ServiceRequest::new()
        .with_entity_id(entity_id(&criterion.data))
        .with_data(json!({"versionControl": version(&criterion.data).to_string()}));

    assert_ok(&service.remove_entity(CRITERION, &request).await);
    let again = service.remove_entity(CRITERION, &request).await;
    assert_eq!(again.result_type, ResultType::StaleData);
}

#[tokio::test]
async fn confirmation_round_trip_through_the_handler() {
    let handler = OperationHandler::new(service());
    let card = handler
        .handle_operation(OperationRequest::save(SCORECARD, json!({"name": "Annual"})))
        .await;
    let id = entity_id(&card.data);
    let token = json!({"versionControl": card.data["versionControl"]});

    let first = handler
        .handle_operation(OperationRequest::remove(SCORECARD, id.as_str()).with_data(token.clone()))
        .await;
    assert!(first.requires_confirmation(REMOVE_CONF));

    let code = first.result_code.clone().unwrap();
    let second = handler
        .handle_operation(
            OperationRequest::remove(SCORECARD, id.as_str())
                .with_data(token)
                .with_action_code(code),
        )
        .await;
    assert_ok(&second);
}
