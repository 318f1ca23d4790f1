//! Obligatory filters following the fields they are bound to.

mod common;

use common::{apply, error_listing};
use facet::model::{codes, WhereClauseOperation};
use facet::testing::{DatasetBuilder, InMemoryConnectors};
use facet::validator::ValidationFatal;
use serde_json::json;

#[test]
fn test_formula_type_change_reaches_filter() {
    let conn = InMemoryConnectors::orders();
    let mut ds = DatasetBuilder::orders().build();
    apply(
        &mut ds,
        &conn,
        json!([
            {"action": "add_field", "field": {"id": "big", "title": "Big", "formula": "[Amount] * 100"}},
            {"action": "add_obligatory_filter", "obligatory_filter": {"id": "of1", "field_id": "big",
                "default_filters": [{"operation": "gte", "values": ["10"]}]}},
        ]),
    )
    .unwrap();
    assert!(ds.error_registry.is_empty());

    apply(
        &mut ds,
        &conn,
        json!([{"action": "update_field", "field": {"id": "big", "formula": "[Amount] > 100"}}]),
    )
    .unwrap();
    insta::assert_snapshot!(error_listing(&ds), @"of1 ERR.DS_API.OBLIGATORY_FILTER.UNSUPPORTED_OPERATION");
    let error = &ds.error_registry.errors_for("of1")[0];
    assert_eq!(error.details.get("operation"), Some(&json!("gte")));
    assert!(!ds.obligatory_filter("of1").unwrap().valid);

    apply(
        &mut ds,
        &conn,
        json!([{"action": "update_obligatory_filter", "obligatory_filter": {"id": "of1",
            "default_filters": [{"operation": "eq", "values": ["true"]}]}}]),
    )
    .unwrap();
    assert!(ds.error_registry.is_empty());
    assert!(ds.obligatory_filter("of1").unwrap().valid);
}

#[test]
fn test_incompatible_clause_rejects_batch() {
    let conn = InMemoryConnectors::orders();
    let mut ds = DatasetBuilder::orders().build();
    let result = apply(
        &mut ds,
        &conn,
        json!([
            {"action": "add_obligatory_filter", "obligatory_filter": {"id": "of1", "field_id": "created",
                "default_filters": [{"operation": "icontains", "values": ["2020"]}]}},
        ]),
    );
    assert!(matches!(
        result,
        Err(ValidationFatal::IncompatibleFilter {
            operation: WhereClauseOperation::Icontains,
            ..
        })
    ));
}

#[test]
fn test_filtered_field_cannot_be_deleted() {
    let conn = InMemoryConnectors::orders();
    let mut ds = DatasetBuilder::orders().build();
    apply(
        &mut ds,
        &conn,
        json!([
            {"action": "add_obligatory_filter", "obligatory_filter": {"id": "of1", "field_id": "status",
                "default_filters": [{"operation": "in", "values": ["open", "paid"]}]}},
        ]),
    )
    .unwrap();

    let result = apply(&mut ds, &conn, json!([{"action": "delete_field", "id": "status"}]));
    assert!(matches!(result, Err(ValidationFatal::InvalidAction(_))));

    apply(
        &mut ds,
        &conn,
        json!([
            {"action": "delete_obligatory_filter", "id": "of1"},
            {"action": "delete_field", "id": "status"},
        ]),
    )
    .unwrap();
    assert!(ds.field("status").is_none());
    assert!(ds.obligatory_filters.is_empty());
}

#[test]
fn test_filter_follows_field_id_change() {
    let conn = InMemoryConnectors::orders();
    let mut ds = DatasetBuilder::orders().build();
    apply(
        &mut ds,
        &conn,
        json!([
            {"action": "add_obligatory_filter", "obligatory_filter": {"id": "of1", "field_id": "status",
                "default_filters": [{"operation": "eq", "values": ["open"]}]}},
            {"action": "update_field", "field": {"id": "status"}, "new_id": "order_status"},
        ]),
    )
    .unwrap();

    assert_eq!(ds.obligatory_filter("of1").unwrap().field_id, "order_status");
    assert!(ds.field("status").is_none());
    assert!(ds.error_registry.is_empty());
}

#[test]
fn test_source_delete_drops_filters() {
    let conn = InMemoryConnectors::orders();
    let mut ds = DatasetBuilder::orders().build();
    apply(
        &mut ds,
        &conn,
        json!([
            {"action": "add_obligatory_filter", "obligatory_filter": {"id": "of1", "field_id": "created",
                "default_filters": [{"operation": "between", "values": ["2020-01-01", "2020-12-31"]}]}},
            {"action": "delete_source", "id": "s1"},
        ]),
    )
    .unwrap();

    assert!(ds.obligatory_filters.is_empty());
    assert!(ds.result_schema.is_empty());
    assert!(ds.error_registry.is_empty());
}
