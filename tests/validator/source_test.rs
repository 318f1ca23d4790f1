//! Source lifecycle: probing, deduplication, refresh and cascading delete.

mod common;

use common::{apply, titles};
use facet::model::{codes, ComponentError, ComponentType, Dataset, SchemaColumn, UserDataType};
use facet::testing::{orders_columns, DatasetBuilder, InMemoryConnectors};
use serde_json::json;

fn items_columns() -> Vec<SchemaColumn> {
    vec![
        SchemaColumn::new("item_id", "int4", UserDataType::Integer).with_title("Item"),
        SchemaColumn::new("sku", "text", UserDataType::String),
    ]
}

#[test]
fn test_source_and_avatar_in_one_batch() {
    let conn = InMemoryConnectors::orders();
    let mut ds = Dataset::new("ds");
    apply(
        &mut ds,
        &conn,
        json!([
            {"action": "add_source", "source": {"id": "s1", "title": "Orders", "connection_id": "c1",
                "parameters": {"table_name": "orders"}}},
            {"action": "add_avatar", "avatar": {"id": "a1", "source_id": "s1"}},
        ]),
    )
    .unwrap();

    let source = ds.source("s1").unwrap();
    assert_eq!(source.origin.source_type, "PG_TABLE");
    assert_eq!(ds.avatar("a1").unwrap().title, "Orders");
    assert_eq!(titles(&ds), ["id", "amount", "created", "status"]);
    assert!(ds.result_schema.iter().all(|f| f.avatar_id() == Some("a1")));
    assert!(ds.error_registry.is_empty());
}

#[test]
fn test_duplicate_source_remapped_within_batch() {
    let conn = InMemoryConnectors::orders();
    let mut ds = DatasetBuilder::orders().build();
    apply(
        &mut ds,
        &conn,
        json!([
            {"action": "add_source", "source": {"id": "s_dup", "title": "Again", "connection_id": "c1",
                "source_type": "PG_TABLE", "parameters": {"table_name": "orders"}}},
            {"action": "add_avatar", "avatar": {"id": "a2", "source_id": "s_dup", "title": "orders copy"},
                "disable_fields_update": true},
        ]),
    )
    .unwrap();

    assert_eq!(ds.sources.len(), 1);
    assert_eq!(ds.avatar("a2").unwrap().source_id, "s1");
    assert_eq!(ds.result_schema.len(), 4);
}

#[test]
fn test_source_titles_must_be_unique() {
    let conn = InMemoryConnectors::orders().with_table("items", items_columns());
    let mut ds = DatasetBuilder::orders().build();
    apply(
        &mut ds,
        &conn,
        json!([
            {"action": "add_source", "source": {"id": "s2", "title": "orders", "connection_id": "c1",
                "parameters": {"table_name": "items"}}},
        ]),
    )
    .unwrap();
    assert!(ds.error_registry.has_error("s1", codes::SOURCE_TITLE_CONFLICT));
    assert!(ds.error_registry.has_error("s2", codes::SOURCE_TITLE_CONFLICT));

    apply(
        &mut ds,
        &conn,
        json!([{"action": "update_source", "source": {"id": "s2", "title": "items"}}]),
    )
    .unwrap();
    assert!(ds.error_registry.is_empty());
    assert!(ds.source("s1").unwrap().valid);
}

#[test]
fn test_missing_table_recovers_on_refresh() {
    let conn = InMemoryConnectors::orders();
    let mut ds = Dataset::new("ds");
    apply(
        &mut ds,
        &conn,
        json!([
            {"action": "add_source", "source": {"id": "s1", "title": "Late", "connection_id": "c1",
                "parameters": {"table_name": "late"}}},
        ]),
    )
    .unwrap();
    assert!(ds
        .error_registry
        .has_error("s1", codes::DB_SOURCE_DOES_NOT_EXIST));
    assert!(!ds.source("s1").unwrap().valid);

    conn.set_table("late", items_columns());
    apply(&mut ds, &conn, json!([{"action": "refresh_source", "id": "s1"}])).unwrap();

    let source = ds.source("s1").unwrap();
    assert!(source.valid);
    assert_eq!(source.raw_schema().map(|s| s.len()), Some(2));
}

#[test]
fn test_parameter_change_reprobes_and_rebinds() {
    let mut columns = orders_columns();
    columns[1] = SchemaColumn::new("total", "numeric", UserDataType::Float).with_title("amount");
    let conn = InMemoryConnectors::orders().with_table("orders_v2", columns);
    let mut ds = DatasetBuilder::orders().build();

    apply(
        &mut ds,
        &conn,
        json!([
            {"action": "update_source", "source": {"id": "s1", "parameters": {"table_name": "orders_v2"}}},
        ]),
    )
    .unwrap();

    let amount = ds.field("amount").unwrap();
    assert_eq!(amount.source(), Some("total"));
    assert_eq!(amount.title, "Amount");
    assert_eq!(ds.result_schema.len(), 4);
    assert!(ds.error_registry.is_empty());
}

#[test]
fn test_title_only_update_does_not_probe() {
    let conn = InMemoryConnectors::orders();
    let mut ds = DatasetBuilder::orders().build();
    conn.remove_table("orders");

    apply(
        &mut ds,
        &conn,
        json!([{"action": "update_source", "source": {"id": "s1", "title": "Orders 2024"}}]),
    )
    .unwrap();

    assert_eq!(ds.source("s1").unwrap().title, "Orders 2024");
    assert!(ds.error_registry.is_empty());
}

#[test]
fn test_stale_source_not_found_cleared_by_add() {
    let conn = InMemoryConnectors::orders().with_table("items", items_columns());
    let mut ds = DatasetBuilder::orders().build();
    ds.error_registry.add_error(
        "amount",
        ComponentType::Field,
        ComponentError::new(codes::DB_SOURCE_NOT_FOUND, "source went away"),
    );

    apply(
        &mut ds,
        &conn,
        json!([
            {"action": "add_source", "source": {"id": "s2", "title": "items", "connection_id": "c1",
                "parameters": {"table_name": "items"}}},
        ]),
    )
    .unwrap();

    assert!(ds.error_registry.is_empty());
    assert!(ds.field("amount").unwrap().valid);
}

#[test]
fn test_delete_source_takes_formula_dependents() {
    let conn = InMemoryConnectors::orders();
    let mut ds = DatasetBuilder::orders().build();
    apply(
        &mut ds,
        &conn,
        json!([
            {"action": "add_field", "field": {"id": "double", "title": "Double", "formula": "[Amount] * 2"}},
            {"action": "add_field", "field": {"id": "one", "title": "One", "formula": "1"}},
        ]),
    )
    .unwrap();

    apply(&mut ds, &conn, json!([{"action": "delete_source", "id": "s1"}])).unwrap();

    assert!(ds.sources.is_empty());
    assert!(ds.avatars.is_empty());
    assert_eq!(titles(&ds), ["One"]);
    assert!(ds.error_registry.is_empty());
}
