//! Moving a dataset to another connection.

mod common;

use common::{actions, apply};
use facet::connectors::Connection;
use facet::formula::FormulaCompiler;
use facet::model::{codes, SchemaColumn, UserDataType};
use facet::testing::{DatasetBuilder, InMemoryConnectors};
use facet::validator::{DatasetValidator, ValidatorOptions};
use serde_json::json;

fn with_items() -> facet::Dataset {
    DatasetBuilder::orders()
        .source(
            "s2",
            "items",
            "c1",
            "PG_TABLE",
            "items",
            vec![SchemaColumn::new("sku", "text", UserDataType::String)],
        )
        .build()
}

fn connectors() -> InMemoryConnectors {
    InMemoryConnectors::orders()
        .with_table(
            "items",
            vec![SchemaColumn::new("sku", "text", UserDataType::String)],
        )
        .with_connection(Connection::new("c2", "clickhouse", "CH_TABLE"))
}

#[test]
fn test_all_sources_move_together() {
    let conn = connectors();
    let mut ds = with_items();
    apply(
        &mut ds,
        &conn,
        json!([{"action": "replace_connection", "connection": {"id": "c1", "new_id": "c2"}}]),
    )
    .unwrap();

    for id in ["s1", "s2"] {
        let source = ds.source(id).unwrap();
        assert_eq!(source.conn_id(), Some("c2"));
        assert_eq!(source.origin.conn_type.as_deref(), Some("clickhouse"));
        assert!(source.valid);
    }
    assert_eq!(ds.result_schema.len(), 4);
    assert!(ds.error_registry.is_empty());
}

#[test]
fn test_fallback_keeps_fields_until_fixed() {
    let conn = connectors().impossible_migration("clickhouse");
    let mut ds = DatasetBuilder::orders().build();
    apply(
        &mut ds,
        &conn,
        json!([{"action": "replace_connection", "connection": {"id": "c1", "new_id": "c2"}}]),
    )
    .unwrap();

    let source = ds.source("s1").unwrap();
    assert_eq!(source.origin.source_type, "CH_TABLE");
    assert!(ds.error_registry.has_error("s1", codes::DB_SOURCE_DOES_NOT_EXIST));
    assert_eq!(ds.result_schema.len(), 4);

    // Pointing the fallback source at a table brings it back.
    apply(
        &mut ds,
        &conn,
        json!([{"action": "update_source", "source": {"id": "s1", "parameters": {"table_name": "orders"}}}]),
    )
    .unwrap();
    assert!(ds.source("s1").unwrap().valid);
    assert!(ds.error_registry.is_empty());
}

#[test]
fn test_replacement_clears_missing_connection() {
    let conn = connectors();
    let mut ds = DatasetBuilder::orders().build();
    conn.remove_connection("c1");

    let mut compiler = FormulaCompiler::new();
    let connectors = conn.into_connectors();
    let mut validator =
        DatasetValidator::new(&mut ds, &mut compiler, &connectors, ValidatorOptions::default());
    validator.collect_nonexistent_connection_errors();
    assert!(validator
        .dataset()
        .error_registry
        .has_error("s1", codes::CONNECTION_NOT_FOUND));

    validator
        .apply_batch(actions(json!([
            {"action": "replace_connection", "connection": {"id": "c1", "new_id": "c2"}},
        ])))
        .unwrap();
    let outcome = validator.outcome();
    assert!(outcome.errors.is_empty());
    assert!(outcome.dataset.source("s1").unwrap().valid);
}

#[test]
fn test_unknown_target_connection_is_fatal() {
    let conn = connectors();
    let mut ds = DatasetBuilder::orders().build();
    let result = apply(
        &mut ds,
        &conn,
        json!([{"action": "replace_connection", "connection": {"id": "c1", "new_id": "c9"}}]),
    );
    assert!(result.is_err());
    assert_eq!(ds.source("s1").unwrap().conn_id(), Some("c1"));
}
