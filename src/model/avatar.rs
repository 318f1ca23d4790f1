//! Join graph: source avatars and the relations between them.

use serde::{Deserialize, Serialize};

use super::types::{BinaryJoinOperator, JoinType, ManagedBy};

/// A named instance of a data source inside the join graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceAvatar {
    pub id: String,
    pub source_id: String,
    pub title: String,
    #[serde(default)]
    pub is_root: bool,
    #[serde(default)]
    pub managed_by: ManagedBy,
    #[serde(default = "default_true")]
    pub valid: bool,
}

fn default_true() -> bool {
    true
}

impl SourceAvatar {
    pub fn new(
        id: impl Into<String>,
        source_id: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source_id: source_id.into(),
            title: title.into(),
            is_root: false,
            managed_by: ManagedBy::User,
            valid: true,
        }
    }
}

/// One side of a join condition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "calc_mode", rename_all = "snake_case")]
pub enum ConditionPart {
    /// A raw column of the side's avatar.
    Direct { source: String },
    /// An expression over the side's columns.
    Formula { formula: String },
    /// A result-schema field.
    ResultField { field_id: String },
}

impl ConditionPart {
    pub fn direct(source: impl Into<String>) -> Self {
        ConditionPart::Direct {
            source: source.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BinaryCondition {
    #[serde(default)]
    pub operator: BinaryJoinOperator,
    pub left: ConditionPart,
    pub right: ConditionPart,
}

impl BinaryCondition {
    pub fn eq(left: ConditionPart, right: ConditionPart) -> Self {
        Self {
            operator: BinaryJoinOperator::Eq,
            left,
            right,
        }
    }
}

/// A directed join edge `left -> right`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvatarRelation {
    pub id: String,
    pub left_avatar_id: String,
    pub right_avatar_id: String,
    #[serde(default)]
    pub conditions: Vec<BinaryCondition>,
    #[serde(default)]
    pub join_type: JoinType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub managed_by: ManagedBy,
    #[serde(default = "default_true")]
    pub valid: bool,
}

impl AvatarRelation {
    pub fn new(
        id: impl Into<String>,
        left_avatar_id: impl Into<String>,
        right_avatar_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            left_avatar_id: left_avatar_id.into(),
            right_avatar_id: right_avatar_id.into(),
            conditions: Vec::new(),
            join_type: JoinType::Inner,
            required: false,
            managed_by: ManagedBy::User,
            valid: true,
        }
    }

    pub fn touches(&self, avatar_id: &str) -> bool {
        self.left_avatar_id == avatar_id || self.right_avatar_id == avatar_id
    }
}
