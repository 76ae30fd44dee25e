//! Paged queries with filters, sorters and master id expansion.

use crate::common::{
    CRITERION, SCORE, TestService, assert_ok, create, create_scorecard, entity_id, registry,
    service, version,
};
use crud_ledger::operation_handler::{OperationHandler, OperationRequest};
use crud_ledger::service::{PageInfo, QUERY_REJECTED, ResultType, ServiceRequest};
use serde_json::{Value, json};
use std::collections::HashMap;

/// Two scorecards; the first owns five weighted criteria, the second one.
async fn seeded() -> TestService {
    let service = service();
    let mut tokens = HashMap::new();
    for name in ["Annual", "Quarterly"] {
        let card = create_scorecard(&service, name).await;
        tokens.insert(entity_id(&card.data), version(&card.data));
    }

    let rows = [
        ("1", "Alpha", 3),
        ("1", "Bravo", 5),
        ("1", "Charlie", 1),
        ("1", "alphabet", 4),
        ("1", "Delta", 2),
        ("2", "Echo", 9),
    ];
    for (owner, name, weight) in rows {
        let token = tokens[owner];
        let response = service
            .save_entity(
                CRITERION,
                &create(json!({
                    "scorecardId": owner.parse::<i64>().unwrap(),
                    "name": name,
                    "weight": weight,
                    "versionControl": token.to_string()
                })),
            )
            .await;
        assert_ok(&response);
        tokens.insert(owner.to_string(), version(&response.data));
    }
    service
}

fn names(response: &crud_ledger::ServiceResponse) -> Vec<String> {
    response
        .data
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["name"].as_str().unwrap().to_string())
        .collect()
}

fn paged(paging: PageInfo) -> ServiceRequest {
    ServiceRequest::new().with_paging(paging)
}

#[tokio::test]
async fn sorts_then_pages_with_a_total() {
    let service = seeded().await;
    let request = paged(PageInfo::new(1, 2).sort("weight", "DESC"));

    let page = service.find_page_of_entities(CRITERION, &request).await;
    assert_ok(&page);
    assert_eq!(page.total, Some(6));
    assert_eq!(names(&page), vec!["Bravo", "alphabet"]);
}

#[tokio::test]
async fn page_numbers_are_one_based() {
    let service = seeded().await;
    let paging = PageInfo {
        page: Some(3),
        limit: Some(2),
        ..PageInfo::default()
    }
    .sort("name", "ASC");

    let page = service.find_page_of_entities(CRITERION, &paged(paging)).await;
    assert_eq!(names(&page), vec!["Echo", "alphabet"]);
}

#[tokio::test]
async fn pages_past_the_end_are_empty() {
    let service = seeded().await;
    let paging = PageInfo {
        page: Some(usize::MAX / 2),
        limit: Some(4),
        ..PageInfo::default()
    };

    let page = service.find_page_of_entities(CRITERION, &paged(paging)).await;
    assert_ok(&page);
    assert_eq!(page.total, Some(6));
    assert_eq!(page.data, json!([]));
}

#[tokio::test]
async fn like_filters_ignore_case() {
    let service = seeded().await;
    let request = paged(PageInfo::new(0, 10).filter("name", "alpha%").sort("name", "DESC"));

    let page = service.find_page_of_entities(CRITERION, &request).await;
    assert_eq!(page.total, Some(2));
    assert_eq!(names(&page), vec!["alphabet", "Alpha"]);
}

#[tokio::test]
async fn repeated_filters_become_a_set() {
    let service = seeded().await;
    let request = paged(
        PageInfo::new(0, 10)
            .filter("weight", 1)
            .filter("weight", 9)
            .filter("weight", Value::Null),
    );

    let page = service.find_page_of_entities(CRITERION, &request).await;
    assert_eq!(names(&page), vec!["Charlie", "Echo"]);
}

#[tokio::test]
async fn master_entity_id_selects_one_cluster() {
    let service = seeded().await;
    let request = paged(
        PageInfo::new(0, 10)
            .filter("masterEntityId", "2")
            .filter("name", ""),
    );

    let page = service.find_page_of_entities(CRITERION, &request).await;
    assert_eq!(page.total, Some(1));
    assert_eq!(names(&page), vec!["Echo"]);
    assert_eq!(page.data[0]["masterEntityId"], json!("2"));
}

#[tokio::test]
async fn scores_ignore_master_entity_id_filters() {
    let service = service();
    let card = create_scorecard(&service, "Annual").await;
    let request = create(json!({
        "scorecardId": 1,
        "name": "Clarity",
        "versionControl": version(&card.data).to_string()
    }))
    .with_context("seedScores", json!(2));
    assert_ok(&service.save_entity(CRITERION, &request).await);

    // Scores hold the criterion key, not the scorecard key their master id names.
    assert!(registry().get(SCORE).unwrap().master_key_mapping().is_none());
    let page = service
        .find_page_of_entities(SCORE, &paged(PageInfo::new(0, 10).filter("masterEntityId", "1")))
        .await;
    assert_ok(&page);
    assert_eq!(page.total, Some(2));
}

#[tokio::test]
async fn unknown_fields_are_rejected() {
    let service = seeded().await;

    for paging in [
        PageInfo::new(0, 10).filter("colour", "red"),
        PageInfo::new(0, 10).sort("colour", "ASC"),
        PageInfo::new(0, 10).filter("weight", "heavy"),
    ] {
        let response = service.find_page_of_entities(CRITERION, &paged(paging)).await;
        assert_eq!(response.result_type, ResultType::SystemError);
        assert_eq!(response.result_code.as_deref(), Some(QUERY_REJECTED));
        assert_eq!(response.data, Value::Null);
    }
}

#[tokio::test]
async fn handler_reads_paging_from_json() {
    let handler = OperationHandler::new(seeded().await);
    let request: OperationRequest = serde_json::from_value(json!({
        "operation": "findPage",
        "entityType": "Criterion",
        "request": {
            "paging": {
                "start": 0,
                "limit": 3,
                "sorters": [{"property": "weight"}],
                "filters": [{"property": "scorecardId", "value": 1}]
            }
        }
    }))
    .unwrap();

    let page = handler.handle_operation(request).await;
    assert_eq!(page.total, Some(5));
    assert_eq!(names(&page), vec!["Charlie", "Delta", "Alpha"]);
}
