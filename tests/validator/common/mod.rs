//! Shared helpers for validator integration tests.
#![allow(dead_code)]

use facet::formula::FormulaCompiler;
use facet::model::Dataset;
use facet::testing::InMemoryConnectors;
use facet::validator::{
    Action, DatasetValidator, ValidationResult, ValidatorOptions,
};
use serde_json::Value;

pub fn actions(value: Value) -> Vec<Action> {
    serde_json::from_value(value).expect("actions deserialize")
}

/// Run one batch with default options.
pub fn apply(ds: &mut Dataset, conn: &InMemoryConnectors, batch: Value) -> ValidationResult<()> {
    apply_with(ds, conn, ValidatorOptions::default(), batch)
}

pub fn apply_with(
    ds: &mut Dataset,
    conn: &InMemoryConnectors,
    options: ValidatorOptions,
    batch: Value,
) -> ValidationResult<()> {
    let mut compiler = FormulaCompiler::new();
    let connectors = conn.into_connectors();
    let mut validator = DatasetValidator::new(ds, &mut compiler, &connectors, options);
    validator.apply_batch(actions(batch))
}

/// One `component CODE` line per registered error, in registry order.
pub fn error_listing(ds: &Dataset) -> String {
    ds.error_registry
        .iter()
        .map(|(id, _, error)| format!("{} {}", id, error.code_str()))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn titles(ds: &Dataset) -> Vec<String> {
    ds.result_schema.iter().map(|f| f.title.clone()).collect()
}
