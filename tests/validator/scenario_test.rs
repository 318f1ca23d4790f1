//! A dataset built from nothing and torn down again.

mod common;

use common::{apply, error_listing, titles};
use facet::model::{codes, SchemaColumn, UserDataType};
use facet::testing::InMemoryConnectors;
use facet::Dataset;
use serde_json::json;

fn people() -> InMemoryConnectors {
    InMemoryConnectors::orders().with_table(
        "people",
        vec![
            SchemaColumn::new("id", "int4", UserDataType::Integer),
            SchemaColumn::new("name", "text", UserDataType::String),
        ],
    )
}

#[test]
fn test_build_and_tear_down() {
    let conn = people();
    let mut ds = Dataset::new("ds");

    apply(
        &mut ds,
        &conn,
        json!([
            {"action": "add_source", "source": {"id": "s", "title": "People", "connection_id": "c1",
                "parameters": {"table_name": "people"}}},
            {"action": "add_avatar", "avatar": {"id": "a", "source_id": "s"}},
            {"action": "add_field", "field": {"id": "f1", "title": "Person", "source": "id"}},
            {"action": "add_field", "field": {"id": "f2", "title": "Next person", "formula": "[Person] + 1"}},
        ]),
    )
    .unwrap();

    assert_eq!(titles(&ds), ["id", "name", "Person", "Next person"]);
    assert_eq!(ds.field("f1").unwrap().avatar_id(), Some("a"));
    assert_eq!(ds.field("f2").unwrap().data_type, Some(UserDataType::Integer));
    assert_eq!(ds.field("f2").unwrap().guid_formula(), Some("[f1] + 1"));
    assert!(ds.error_registry.is_empty());

    apply(&mut ds, &conn, json!([{"action": "delete_source", "id": "s"}])).unwrap();

    assert!(ds.sources.is_empty());
    assert!(ds.avatars.is_empty());
    assert!(ds.result_schema.is_empty());
    assert!(ds.lineage.is_empty());
    assert!(ds.error_registry.is_empty());
}

#[test]
fn test_dangling_reference_then_repair() {
    let conn = people();
    let mut ds = Dataset::new("ds");
    apply(
        &mut ds,
        &conn,
        json!([
            {"action": "add_field", "field": {"id": "f2", "title": "Label", "formula": "UPPER([Name])"}},
        ]),
    )
    .unwrap();
    insta::assert_snapshot!(error_listing(&ds), @"f2 ERR.DS_API.FORMULA.UNKNOWN_FIELD");
    assert!(!ds.field("f2").unwrap().valid);

    apply(
        &mut ds,
        &conn,
        json!([
            {"action": "add_source", "source": {"id": "s", "title": "People", "connection_id": "c1",
                "parameters": {"table_name": "people"}}},
            {"action": "add_avatar", "avatar": {"id": "a", "source_id": "s"}, "disable_fields_update": true},
            {"action": "add_field", "field": {"id": "f1", "title": "Name", "source": "name"}},
            {"action": "update_field", "field": {"id": "f2", "formula": "UPPER([Name])"}},
        ]),
    )
    .unwrap();

    let label = ds.field("f2").unwrap();
    assert!(label.valid);
    assert_eq!(label.data_type, Some(UserDataType::String));
    assert!(ds.error_registry.is_empty());
}

#[test]
fn test_snapshot_survives_serde() {
    let conn = people();
    let mut ds = Dataset::new("ds");
    apply(
        &mut ds,
        &conn,
        json!([
            {"action": "add_source", "source": {"id": "s", "title": "People", "connection_id": "c1",
                "parameters": {"table_name": "people"}}},
            {"action": "add_avatar", "avatar": {"id": "a", "source_id": "s"}},
            {"action": "add_field", "field": {"id": "dup", "title": "name", "formula": "1"}},
        ]),
    )
    .unwrap();
    assert_eq!(ds.error_registry.len(), 2);

    let stored = serde_json::to_string(&ds).unwrap();
    let mut restored: Dataset = serde_json::from_str(&stored).unwrap();
    assert_eq!(restored, ds);

    // A no-op batch on the restored copy leaves everything as it was.
    apply(&mut restored, &conn, json!([])).unwrap();
    assert_eq!(restored.error_registry, ds.error_registry);
    assert!(restored
        .error_registry
        .has_error("dup", codes::FIELD_TITLE_CONFLICT));
}
