//! Obligatory filters.

use serde::{Deserialize, Serialize};

use super::types::{ManagedBy, WhereClauseOperation};

/// A where-clause applied to every query over the bound field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultWhereClause {
    pub operation: WhereClauseOperation,
    #[serde(default)]
    pub values: Vec<String>,
}

impl DefaultWhereClause {
    pub fn new(operation: WhereClauseOperation, values: Vec<String>) -> Self {
        Self { operation, values }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObligatoryFilter {
    pub id: String,
    pub field_id: String,
    pub default_filters: Vec<DefaultWhereClause>,
    #[serde(default)]
    pub managed_by: ManagedBy,
    #[serde(default = "default_true")]
    pub valid: bool,
}

fn default_true() -> bool {
    true
}

impl ObligatoryFilter {
    pub fn new(
        id: impl Into<String>,
        field_id: impl Into<String>,
        default_filters: Vec<DefaultWhereClause>,
    ) -> Self {
        Self {
            id: id.into(),
            field_id: field_id.into(),
            default_filters,
            managed_by: ManagedBy::User,
            valid: true,
        }
    }

    pub fn operations(&self) -> impl Iterator<Item = WhereClauseOperation> + '_ {
        self.default_filters.iter().map(|clause| clause.operation)
    }
}
