//! Semantic analysis over the dataset graph.

pub mod field_lineage;

pub use field_lineage::FieldLineage;
