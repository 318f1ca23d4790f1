//! The async service: per-dataset serialization and commit semantics.

use std::sync::Arc;

use facet::config::Settings;
use facet::service::{DatasetService, ServiceError};
use facet::testing::{DatasetBuilder, InMemoryConnectors};
use facet::validator::{Action, ValidationFatal, ValidatorMode, ValidatorOptions};
use facet::Dataset;
use serde_json::json;

fn actions(value: serde_json::Value) -> Vec<Action> {
    serde_json::from_value(value).unwrap()
}

fn service() -> DatasetService {
    let settings = Settings::from_toml("[service]\nmax_blocking = 2\n").unwrap();
    let service =
        DatasetService::from_settings(&settings, InMemoryConnectors::orders().into_connectors());
    service.insert(DatasetBuilder::orders().build());
    let mut other = DatasetBuilder::orders().build();
    other.id = "other".to_string();
    service.insert(other);
    service
}

fn add_field(id: &str, title: &str) -> Vec<Action> {
    actions(json!([
        {"action": "add_field", "field": {"id": id, "title": title, "formula": "[Amount] * 2"}},
    ]))
}

#[tokio::test]
async fn test_batches_on_one_dataset_all_land() {
    let service = Arc::new(service());
    let mut handles = Vec::new();
    for n in 0..8 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            service
                .apply("ds", add_field(&format!("f{}", n), &format!("Field {}", n)))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let ds = service.get("ds").unwrap();
    assert_eq!(ds.result_schema.len(), 12);
    assert!(ds.error_registry.is_empty());
}

#[tokio::test]
async fn test_apply_many_keeps_order_and_isolates_failures() {
    let service = service();
    let results = service
        .apply_many(vec![
            ("ds".to_string(), add_field("x", "X")),
            (
                "other".to_string(),
                actions(json!([{"action": "delete_field", "id": "missing"}])),
            ),
            ("nope".to_string(), Vec::new()),
        ])
        .await;

    assert_eq!(results.len(), 3);
    assert!(results[0].is_ok());
    assert!(results[1].is_ok());
    assert!(matches!(results[2], Err(ServiceError::DatasetNotFound(_))));
    assert!(service.get("ds").unwrap().field("x").is_some());
}

#[tokio::test]
async fn test_per_call_options() {
    let service = service();
    let strict = ValidatorOptions::default().with_strict(true);
    let result = service
        .run(
            "ds",
            actions(json!([{"action": "delete_field", "id": "missing"}])),
            strict,
        )
        .await;
    assert!(matches!(
        result,
        Err(ServiceError::Fatal(ValidationFatal::FieldNotFound(_)))
    ));

    let data_api = ValidatorOptions::default().with_mode(ValidatorMode::DataApi);
    let result = service
        .run(
            "ds",
            actions(json!([{"action": "delete_source", "id": "s1"}])),
            data_api,
        )
        .await;
    assert!(matches!(
        result,
        Err(ServiceError::Fatal(ValidationFatal::NotAllowedInMode { .. }))
    ));
    assert_eq!(service.get("ds").unwrap().sources.len(), 1);
}

#[tokio::test]
async fn test_outcome_matches_stored_snapshot() {
    let service = service();
    let outcome = service
        .apply(
            "ds",
            actions(json!([
                {"action": "update_field", "field": {"id": "status", "title": "Amount"}},
            ])),
        )
        .await
        .unwrap();

    assert_eq!(outcome.errors.len(), 2);
    let stored: Dataset = service.get("ds").unwrap();
    assert_eq!(stored, outcome.dataset);
    assert_eq!(stored.error_registry, outcome.errors);

    let removed = service.remove("ds").unwrap();
    assert_eq!(removed, stored);
    assert!(service.get("ds").is_none());
}
