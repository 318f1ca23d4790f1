//! Field lifecycle through whole batches.

mod common;

use common::{apply, apply_with, error_listing, titles};
use facet::model::{codes, AggregationFunction, FieldType, UserDataType};
use facet::testing::{DatasetBuilder, InMemoryConnectors};
use facet::validator::{ValidationFatal, ValidatorMode, ValidatorOptions};
use serde_json::json;

#[test]
fn test_title_validation_is_idempotent() {
    let conn = InMemoryConnectors::orders();
    let mut ds = DatasetBuilder::orders().build();
    let batch = json!([
        {"action": "update_field", "field": {"id": "status", "title": "Amount"}},
    ]);

    apply(&mut ds, &conn, batch.clone()).unwrap();
    let first = ds.error_registry.clone();
    apply(&mut ds, &conn, batch).unwrap();

    assert_eq!(ds.error_registry, first);
    insta::assert_snapshot!(error_listing(&ds), @r"
    amount ERR.DS_API.FIELD.TITLE.CONFLICT
    status ERR.DS_API.FIELD.TITLE.CONFLICT
    ");
    assert!(!ds.field("amount").unwrap().valid);

    apply(
        &mut ds,
        &conn,
        json!([{"action": "update_field", "field": {"id": "status", "title": "Status"}}]),
    )
    .unwrap();
    assert!(ds.error_registry.is_empty());
    assert!(ds.result_schema.iter().all(|f| f.valid));
}

#[test]
fn test_rename_keeps_guid_formula() {
    let conn = InMemoryConnectors::orders();
    let mut ds = DatasetBuilder::orders().build();
    apply(
        &mut ds,
        &conn,
        json!([
            {"action": "add_field", "field": {"id": "next_id", "title": "Next", "formula": "[Id]+1"}},
            {"action": "update_field", "field": {"id": "id", "title": "Order Id"}},
        ]),
    )
    .unwrap();

    let next = ds.field("next_id").unwrap();
    assert_eq!(next.formula(), Some("[Order Id]+1"));
    assert_eq!(next.guid_formula(), Some("[id]+1"));
    assert!(next.valid);
}

#[test]
fn test_rename_reaches_second_hop() {
    let conn = InMemoryConnectors::orders();
    let mut ds = DatasetBuilder::orders().build();
    apply(
        &mut ds,
        &conn,
        json!([
            {"action": "add_field", "field": {"id": "double", "title": "Double", "formula": "[Amount] * 2"}},
            {"action": "add_field", "field": {"id": "quad", "title": "Quad", "formula": "[Double] * 2"}},
            {"action": "update_field", "field": {"id": "double", "title": "Twice"}},
            {"action": "update_field", "field": {"id": "amount", "cast": "integer"}},
        ]),
    )
    .unwrap();

    assert_eq!(ds.field("quad").unwrap().formula(), Some("[Twice] * 2"));
    assert_eq!(ds.field("double").unwrap().data_type, Some(UserDataType::Integer));
    assert_eq!(ds.field("quad").unwrap().data_type, Some(UserDataType::Integer));
}

#[test]
fn test_cycles_rejected_without_self_edges() {
    let conn = InMemoryConnectors::orders();
    let mut ds = DatasetBuilder::orders().build();
    apply(
        &mut ds,
        &conn,
        json!([
            {"action": "add_field", "field": {"id": "loop", "title": "Loop", "formula": "[Loop] + 1"}},
            {"action": "add_field", "field": {"id": "a", "title": "A", "formula": "[Amount] + 1"}},
            {"action": "add_field", "field": {"id": "b", "title": "B", "formula": "[A] + 1"}},
            {"action": "update_field", "field": {"id": "a", "formula": "[B] + 1"}},
        ]),
    )
    .unwrap();

    assert!(ds.error_registry.has_error("loop", codes::FORMULA_RECURSION));
    assert!(ds.lineage.direct_references("loop").is_empty());
    assert!(ds.error_registry.has_error("a", codes::FORMULA_RECURSION));
    assert!(ds.error_registry.has_error("b", codes::FORMULA_RECURSION));
    assert!(ds.lineage.detect_cycles().is_empty());
    assert!(!ds.field("a").unwrap().valid);
    assert!(!ds.field("b").unwrap().valid);

    // Breaking the loop clears both members.
    apply(
        &mut ds,
        &conn,
        json!([{"action": "update_field", "field": {"id": "a", "formula": "[Amount] + 1"}}]),
    )
    .unwrap();
    assert!(ds.field("a").unwrap().valid);
    assert!(ds.field("b").unwrap().valid);
    assert!(!ds.error_registry.has_error("b", codes::FORMULA_RECURSION));
    assert_eq!(
        ds.lineage.direct_references("b").iter().collect::<Vec<_>>(),
        ["a"]
    );
}

#[test]
fn test_cast_follows_inferred_type_unless_pinned() {
    let conn = InMemoryConnectors::orders();
    let mut ds = DatasetBuilder::orders().build();
    apply(
        &mut ds,
        &conn,
        json!([
            {"action": "add_field", "field": {"id": "f", "title": "F", "formula": "#2020-01-01#"}},
            {"action": "add_field", "field": {"id": "follower", "title": "Follower", "formula": "[F]"}},
            {"action": "add_field", "field": {"id": "pinned", "title": "Pinned", "formula": "[F]", "cast": "string"}},
        ]),
    )
    .unwrap();
    assert_eq!(ds.field("f").unwrap().cast, Some(UserDataType::Date));
    assert_eq!(ds.field("follower").unwrap().cast, Some(UserDataType::Date));

    apply(
        &mut ds,
        &conn,
        json!([{"action": "update_field", "field": {"id": "f", "formula": "INT(1.5)"}}]),
    )
    .unwrap();

    let f = ds.field("f").unwrap();
    assert_eq!(f.initial_data_type, Some(UserDataType::Integer));
    assert_eq!(f.cast, Some(UserDataType::Integer));
    assert_eq!(ds.field("follower").unwrap().cast, Some(UserDataType::Integer));
    assert_eq!(ds.field("pinned").unwrap().cast, Some(UserDataType::String));
}

#[test]
fn test_cast_follows_across_two_hops() {
    let conn = InMemoryConnectors::orders();
    let mut ds = DatasetBuilder::orders().build();
    apply(
        &mut ds,
        &conn,
        json!([
            {"action": "add_field", "field": {"id": "f", "title": "F", "formula": "#2020-01-01#"}},
            {"action": "add_field", "field": {"id": "g", "title": "G", "formula": "[F]"}},
            {"action": "add_field", "field": {"id": "h", "title": "H", "formula": "[G]"}},
        ]),
    )
    .unwrap();
    assert_eq!(ds.field("h").unwrap().cast, Some(UserDataType::Date));

    apply(
        &mut ds,
        &conn,
        json!([{"action": "update_field", "field": {"id": "f", "formula": "INT(1.5)"}}]),
    )
    .unwrap();

    for id in ["f", "g", "h"] {
        let field = ds.field(id).unwrap();
        assert_eq!(field.initial_data_type, Some(UserDataType::Integer), "{}", id);
        assert_eq!(field.cast, Some(UserDataType::Integer), "{}", id);
        assert_eq!(field.data_type, Some(UserDataType::Integer), "{}", id);
    }
    assert!(ds.error_registry.is_empty());
}

#[test]
fn test_parameter_defaults_visible_to_batch() {
    let conn = InMemoryConnectors::orders();
    let mut ds = DatasetBuilder::orders().build();
    apply(
        &mut ds,
        &conn,
        json!([
            {"action": "add_field", "field": {"id": "net", "title": "Net", "formula": "[Amount] * [Rate]"}},
            {"action": "add_field", "field": {"id": "rate", "title": "Rate", "default_value": 0.8}},
        ]),
    )
    .unwrap();

    assert_eq!(titles(&ds)[4..], ["Rate", "Net"]);
    assert!(ds.field("net").unwrap().valid);
    assert_eq!(ds.field("net").unwrap().data_type, Some(UserDataType::Float));
}

#[test]
fn test_order_index_and_clone() {
    let conn = InMemoryConnectors::orders();
    let mut ds = DatasetBuilder::orders().build();
    apply(
        &mut ds,
        &conn,
        json!([
            {"action": "add_field", "order_index": 0, "field": {"id": "one", "title": "One", "formula": "1"}},
            {"action": "clone_field", "from_id": "amount", "field": {"id": "amount_avg", "title": "Avg amount", "aggregation": "avg"}},
        ]),
    )
    .unwrap();

    assert_eq!(ds.result_schema[0].id, "one");
    let avg = ds.field("amount_avg").unwrap();
    assert_eq!(avg.aggregation, AggregationFunction::Avg);
    assert_eq!(avg.field_type, FieldType::Measure);
    assert_eq!(avg.source(), Some("amount"));
}

#[test]
fn test_fatal_aborts_batch() {
    let conn = InMemoryConnectors::orders();
    let mut ds = DatasetBuilder::orders().build();
    let result = apply(
        &mut ds,
        &conn,
        json!([
            {"action": "add_field", "field": {"id": "x", "title": "X", "formula": "1"}},
            {"action": "add_field", "field": {"id": "s1", "title": "Y", "formula": "2"}},
        ]),
    );
    assert!(matches!(result, Err(ValidationFatal::IdCollision { .. })));
}

#[test]
fn test_data_api_allows_field_edits_only() {
    let conn = InMemoryConnectors::orders();
    let mut ds = DatasetBuilder::orders().build();
    let options = ValidatorOptions::default().with_mode(ValidatorMode::DataApi);
    apply_with(
        &mut ds,
        &conn,
        options.clone(),
        json!([{"action": "add_field", "field": {"id": "x", "title": "X", "formula": "[Amount] + 1"}}]),
    )
    .unwrap();
    assert!(ds.field("x").unwrap().valid);

    let result = apply_with(
        &mut ds,
        &conn,
        options,
        json!([{"action": "refresh_source", "id": "s1"}]),
    );
    assert!(matches!(result, Err(ValidationFatal::NotAllowedInMode { .. })));
}

#[test]
fn test_soft_limit_warning_cleared() {
    let conn = InMemoryConnectors::orders();
    let mut ds = DatasetBuilder::orders().build();
    let options = ValidatorOptions::default().with_field_limits(4, 10);
    apply_with(
        &mut ds,
        &conn,
        options.clone(),
        json!([{"action": "add_field", "field": {"id": "x", "title": "X", "formula": "1"}}]),
    )
    .unwrap();
    assert!(ds
        .error_registry
        .has_error("__result_schema__", codes::TOO_MANY_FIELDS));
    assert!(ds.result_schema.iter().all(|f| f.valid));

    apply_with(
        &mut ds,
        &conn,
        options,
        json!([{"action": "delete_field", "id": "x"}]),
    )
    .unwrap();
    assert!(ds.error_registry.is_empty());
}
