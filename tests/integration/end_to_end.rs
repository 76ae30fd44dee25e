//! Create, update and find across the scorecard cluster.

use crate::common::{
    CRITERION, SCORE, SCORECARD, assert_ok, create, create_criterion, create_scorecard, entity_id,
    service, update, version,
};
use crud_ledger::operation_handler::{INVALID_REQUEST, OperationHandler};
use crud_ledger::service::{ResultType, ServiceRequest};
use serde_json::{Value, json};

#[tokio::test]
async fn mastered_updates_advance_the_master_version() {
    let service = service();

    let card = create_scorecard(&service, "Annual").await;
    let card_id = entity_id(&card.data);
    let v1 = version(&card.data);
    assert_eq!(card.master.as_ref().map(version), Some(v1));

    // Creating a criterion with the current token bumps the scorecard.
    let created = service
        .save_entity(
            CRITERION,
            &create(json!({"scorecardId": 1, "name": "Clarity", "versionControl": v1.to_string()})),
        )
        .await;
    assert_ok(&created);
    let criterion_id = entity_id(&created.data);
    let v2 = version(&created.data);
    assert!(v2 > v1);
    assert_eq!(created.data["masterEntityId"], json!(card_id));
    let master = created.master.clone().unwrap();
    assert_eq!(entity_id(&master), card_id);
    assert_eq!(version(&master), v2);

    // A stale token is rejected.
    let stale = service
        .save_entity(
            CRITERION,
            &update(&criterion_id, json!({"name": "Stale", "versionControl": v1.to_string()})),
        )
        .await;
    assert_eq!(stale.result_type, ResultType::StaleData);
    assert!(!stale.success);
    assert_eq!(stale.data, Value::Null);

    // The current token succeeds and advances again.
    let updated = service
        .save_entity(
            CRITERION,
            &update(&criterion_id, json!({"name": "Coherence", "versionControl": v2.to_string()})),
        )
        .await;
    assert_ok(&updated);
    let v3 = version(&updated.data);
    assert!(v3 > v2);
    assert_eq!(updated.data["name"], json!("Coherence"));
    assert_eq!(updated.data["scorecardId"], json!(1));
}

#[tokio::test]
async fn self_master_update_checks_its_own_column() {
    let service = service();

    let card = create_scorecard(&service, "Annual").await;
    let id = entity_id(&card.data);
    let v1 = version(&card.data);

    let renamed = service
        .save_entity(
            SCORECARD,
            &update(&id, json!({"name": "Yearly", "versionControl": v1.to_string()})),
        )
        .await;
    assert_ok(&renamed);
    let v2 = version(&renamed.data);
    assert!(v2 > v1);
    assert_eq!(renamed.master.as_ref().map(version), Some(v2));

    let stale = service
        .save_entity(
            SCORECARD,
            &update(&id, json!({"name": "Stale", "versionControl": v1.to_string()})),
        )
        .await;
    assert_eq!(stale.result_type, ResultType::StaleData);

    let found = service
        .find_entity(SCORECARD, &ServiceRequest::new().with_entity_id(id.as_str()))
        .await;
    assert_ok(&found);
    assert_eq!(found.data["name"], json!("Yearly"));
    assert_eq!(version(&found.data), v2);
}

#[tokio::test]
async fn omitted_token_is_stale() {
    let service = service();
    let card = create_scorecard(&service, "Annual").await;
    let card_id = entity_id(&card.data);
    let criterion = create_criterion(&service, &card_id, "Clarity").await;
    let criterion_id = entity_id(&criterion.data);

    let edited = service
        .save_entity(
            CRITERION,
            &update(
                &criterion_id,
                json!({"weight": 3, "versionControl": version(&criterion.data).to_string()}),
            ),
        )
        .await;
    assert_ok(&edited);

    let blind = service
        .save_entity(CRITERION, &update(&criterion_id, json!({"name": "Blind"})))
        .await;
    assert_eq!(blind.result_type, ResultType::StaleData);

    let no_payload = service
        .save_entity(CRITERION, &ServiceRequest::new().with_entity_id(criterion_id.as_str()))
        .await;
    assert_eq!(no_payload.result_type, ResultType::StaleData);

    let card_blind = service
        .save_entity(SCORECARD, &update(&card_id, json!({"description": "No token"})))
        .await;
    assert_eq!(card_blind.result_type, ResultType::StaleData);

    let found = service
        .find_entity(CRITERION, &ServiceRequest::new().with_entity_id(criterion_id.as_str()))
        .await;
    assert_eq!(found.data["name"], json!("Clarity"));
    assert_eq!(version(&found.data), version(&edited.data));
}

#[tokio::test]
async fn mastered_create_without_a_token_is_stale() {
    let service = service();
    create_scorecard(&service, "Annual").await;

    let created = service
        .save_entity(CRITERION, &create(json!({"scorecardId": 1, "name": "Clarity"})))
        .await;
    assert_eq!(created.result_type, ResultType::StaleData);

    let criteria = service.find_all_entities(CRITERION, &ServiceRequest::new()).await;
    assert_eq!(criteria.total, Some(0));
}

#[tokio::test]
async fn two_hop_master_governs_scores() {
    let service = service();
    let card = create_scorecard(&service, "Annual").await;
    let card_id = entity_id(&card.data);
    let criterion = create_criterion(&service, &card_id, "Clarity").await;
    let criterion_id: i64 = entity_id(&criterion.data).parse().unwrap();
    let before = version(&criterion.data);

    let score = service
        .save_entity(
            SCORE,
            &create(json!({
                "criterionId": criterion_id,
                "value": 4,
                "versionControl": before.to_string()
            })),
        )
        .await;
    assert_ok(&score);
    assert_eq!(score.data["masterEntityId"], json!(card_id));
    assert!(version(&score.data) > before);

    let master = score.master.unwrap();
    assert_eq!(entity_id(&master), card_id);
    assert_eq!(version(&master), version(&score.data));
}

#[tokio::test]
async fn find_reports_master_and_tolerates_missing_rows() {
    let service = service();
    let card = create_scorecard(&service, "Annual").await;
    let card_id = entity_id(&card.data);
    let criterion = create_criterion(&service, &card_id, "Clarity").await;
    let criterion_id = entity_id(&criterion.data);

    let found = service
        .find_entity(CRITERION, &ServiceRequest::new().with_entity_id(criterion_id.as_str()))
        .await;
    assert_ok(&found);
    assert_eq!(found.data["name"], json!("Clarity"));
    assert_eq!(found.data["masterEntityId"], json!(card_id));
    assert_eq!(found.master.as_ref().map(entity_id), Some(card_id));

    let missing = service
        .find_entity(CRITERION, &ServiceRequest::new().with_entity_id(99))
        .await;
    assert_ok(&missing);
    assert_eq!(missing.data, Value::Null);

    let no_id = service.find_entity(CRITERION, &ServiceRequest::new()).await;
    assert_ok(&no_id);
    assert_eq!(no_id.data, Value::Null);
}

#[tokio::test]
async fn find_all_lists_every_record_in_key_order() {
    let service = service();
    for name in ["Gamma", "Alpha", "Beta"] {
        create_scorecard(&service, name).await;
    }

    let all = service.find_all_entities(SCORECARD, &ServiceRequest::new()).await;
    assert_ok(&all);
    assert_eq!(all.total, Some(3));
    let names: Vec<&Value> = all.data.as_array().unwrap().iter().map(|r| &r["name"]).collect();
    assert_eq!(names, vec![&json!("Gamma"), &json!("Alpha"), &json!("Beta")]);
}

#[tokio::test]
async fn after_persist_sees_the_stored_key() {
    let service = service();
    let card = create_scorecard(&service, "Annual").await;

    let request = create(json!({
        "scorecardId": 1,
        "name": "Clarity",
        "versionControl": version(&card.data).to_string()
    }))
    .with_context("seedScores", json!(3));
    let criterion = service.save_entity(CRITERION, &request).await;
    assert_ok(&criterion);
    assert_eq!(criterion.message.as_deref(), Some("Created 3 score(s)"));
    assert_eq!(criterion.data["masterEntityId"], card.data["entityId"]);

    let scores = service.find_all_entities(SCORE, &ServiceRequest::new()).await;
    assert_eq!(scores.total, Some(3));
    for score in scores.data.as_array().unwrap() {
        assert_eq!(score["criterionId"], criterion.data["criterionId"]);
    }
}

#[tokio::test]
async fn blobs_travel_with_the_request() {
    let service = service();
    let request: ServiceRequest = serde_json::from_value(json!({
        "data": {"name": "Annual"},
        "blobs": {"logo": "iVBORw0K"}
    }))
    .unwrap();
    assert_eq!(request.blobs["logo"], vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a]);

    let response = service.save_entity(SCORECARD, &request).await;
    assert_ok(&response);
}

#[tokio::test]
async fn json_envelope_round_trip() {
    let handler = OperationHandler::new(service());

    let saved = handler
        .handle_json(json!({
            "operation": "save",
            "entityType": "Scorecard",
            "request": {"data": {"name": "Annual"}},
            "requestId": "req-1"
        }))
        .await;
    assert_eq!(saved["success"], json!(true));
    assert_eq!(saved["resultType"], json!("OK"));
    assert_eq!(saved["errors"], Value::Null);
    assert_eq!(saved["data"]["name"], json!("Annual"));

    let found = handler
        .handle_json(json!({
            "operation": "find",
            "entityType": "Scorecard",
            "request": {"entityId": saved["data"]["entityId"]}
        }))
        .await;
    assert_eq!(found["data"]["versionControl"], saved["data"]["versionControl"]);

    let garbage = handler.handle_json(json!({"entityType": "Scorecard"})).await;
    assert_eq!(garbage["resultType"], json!("SYSTEM_ERROR"));
    assert_eq!(garbage["resultCode"], json!(INVALID_REQUEST));
}
