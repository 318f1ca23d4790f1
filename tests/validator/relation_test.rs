//! Relations between avatars: generated conditions and join-type support.

mod common;

use common::{apply, error_listing};
use facet::model::{codes, BinaryCondition, ConditionPart, JoinType, SchemaColumn, UserDataType};
use facet::testing::{DatasetBuilder, InMemoryConnectors};
use facet::validator::ValidationFatal;
use facet::Dataset;
use serde_json::json;

fn customers() -> Vec<SchemaColumn> {
    vec![
        SchemaColumn::new("id", "int4", UserDataType::Integer).with_title("customer id"),
        SchemaColumn::new("name", "text", UserDataType::String).with_title("customer name"),
    ]
}

fn connectors() -> InMemoryConnectors {
    InMemoryConnectors::orders()
        .with_table("customers", customers())
        .with_join_types("PG_TABLE", &[JoinType::Inner, JoinType::Left])
}

/// Orders plus a joined customers avatar, all added through actions.
fn joined(conn: &InMemoryConnectors) -> Dataset {
    let mut ds = DatasetBuilder::orders().build();
    apply(
        &mut ds,
        conn,
        json!([
            {"action": "add_source", "source": {"id": "s2", "title": "customers", "connection_id": "c1",
                "parameters": {"table_name": "customers"}}},
            {"action": "add_avatar", "avatar": {"id": "a2", "source_id": "s2"}},
            {"action": "add_relation", "relation": {"id": "r1", "left_avatar_id": "a1", "right_avatar_id": "a2"}},
        ]),
    )
    .unwrap();
    ds
}

#[test]
fn test_generated_condition_on_shared_column() {
    let conn = connectors();
    let ds = joined(&conn);

    let relation = ds.relation("r1").unwrap();
    assert_eq!(
        relation.conditions,
        vec![BinaryCondition::eq(
            ConditionPart::direct("id"),
            ConditionPart::direct("id")
        )]
    );
    assert_eq!(relation.join_type, JoinType::Inner);
    assert!(relation.valid);
    assert_eq!(ds.result_schema.len(), 6);
    assert!(ds.error_registry.is_empty());
}

#[test]
fn test_first_left_column_with_any_match_wins() {
    let conn = connectors().with_table(
        "ledger",
        vec![
            SchemaColumn::new("AMOUNT", "numeric", UserDataType::Float),
            SchemaColumn::new("status", "text", UserDataType::String),
        ],
    );
    let mut ds = DatasetBuilder::orders().build();
    apply(
        &mut ds,
        &conn,
        json!([
            {"action": "add_source", "source": {"id": "s2", "title": "ledger", "connection_id": "c1",
                "parameters": {"table_name": "ledger"}}},
            {"action": "add_avatar", "avatar": {"id": "a2", "source_id": "s2"}, "disable_fields_update": true},
            {"action": "add_relation", "relation": {"id": "r1", "left_avatar_id": "a1", "right_avatar_id": "a2"}},
        ]),
    )
    .unwrap();

    // "amount" sorts before "status", so its case-insensitive partner is
    // taken over the exact "status" pair.
    assert_eq!(
        ds.relation("r1").unwrap().conditions,
        vec![BinaryCondition::eq(
            ConditionPart::direct("amount"),
            ConditionPart::direct("AMOUNT")
        )]
    );
}

#[test]
fn test_unsupported_join_type_until_changed() {
    let conn = connectors();
    let mut ds = joined(&conn);

    apply(
        &mut ds,
        &conn,
        json!([{"action": "update_relation", "relation": {"id": "r1", "join_type": "full"}}]),
    )
    .unwrap();
    insta::assert_snapshot!(error_listing(&ds), @"r1 ERR.DS_API.AVATAR_RELATION.JOIN_TYPE");
    let error = &ds.error_registry.errors_for("r1")[0];
    assert_eq!(error.details.get("join_type"), Some(&json!("full")));
    assert!(!ds.relation("r1").unwrap().valid);

    apply(
        &mut ds,
        &conn,
        json!([{"action": "update_relation", "relation": {"id": "r1", "join_type": "left"}}]),
    )
    .unwrap();
    assert!(ds.error_registry.is_empty());
    assert!(ds.relation("r1").unwrap().valid);
}

#[test]
fn test_condition_on_missing_column() {
    let conn = connectors();
    let mut ds = joined(&conn);

    apply(
        &mut ds,
        &conn,
        json!([
            {"action": "update_relation", "relation": {"id": "r1", "conditions": [
                {"operator": "eq",
                 "left": {"calc_mode": "direct", "source": "customer_ref"},
                 "right": {"calc_mode": "direct", "source": "id"}}
            ]}},
        ]),
    )
    .unwrap();
    assert!(ds.error_registry.has_error("r1", codes::RELATION_CONDITION));

    // An empty list asks for a generated condition again.
    apply(
        &mut ds,
        &conn,
        json!([{"action": "update_relation", "relation": {"id": "r1", "conditions": []}}]),
    )
    .unwrap();
    assert!(ds.error_registry.is_empty());
    assert_eq!(ds.relation("r1").unwrap().conditions.len(), 1);
}

#[test]
fn test_relation_endpoints_are_fixed() {
    let conn = connectors();
    let mut ds = joined(&conn);
    let result = apply(
        &mut ds,
        &conn,
        json!([{"action": "update_relation", "relation": {"id": "r1", "right_avatar_id": "a1"}}]),
    );
    assert!(matches!(result, Err(ValidationFatal::InvalidAction(_))));
}

#[test]
fn test_deleting_joined_avatar() {
    let conn = connectors();
    let mut ds = joined(&conn);

    apply(&mut ds, &conn, json!([{"action": "delete_avatar", "id": "a2"}])).unwrap();

    assert!(ds.relations.is_empty());
    assert!(ds.avatar("a2").is_none());
    assert_eq!(ds.result_schema.len(), 4);
    assert!(ds.error_registry.is_empty());
}

#[test]
fn test_deleting_root_with_relation_is_fatal() {
    let conn = connectors();
    let mut ds = joined(&conn);
    let result = apply(&mut ds, &conn, json!([{"action": "delete_avatar", "id": "a1"}]));
    assert!(result.is_err());
    assert!(ds.avatar("a1").is_some());
}
