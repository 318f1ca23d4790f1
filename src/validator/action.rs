//! The action vocabulary.
//!
//! Actions deserialize from JSON tagged by `action`:
//!
//! ```json
//! {"action": "add_field", "field": {"title": "Profit", "formula": "[Sales] - [Cost]"}}
//! {"action": "delete_source", "id": "s1", "managed_by": "user"}
//! ```
//!
//! Payloads are partial: on update only the keys present are applied.

use serde::{Deserialize, Serialize};

use super::error::{ValidationFatal, ValidationResult};
use crate::model::{
    AggregationFunction, BinaryCondition, CalcMode, CalcSpec, DatasetSettingName,
    DefaultWhereClause, Field, JoinType, ManagedBy, SourceParameters, UserDataType,
    ValueConstraint,
};

// ============================================================================
// Payloads
// ============================================================================

/// Field attributes carried by add and update actions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldPayload {
    pub id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub hidden: Option<bool>,
    pub calc_mode: Option<CalcMode>,
    /// Column name of a direct field.
    pub source: Option<String>,
    pub avatar_id: Option<String>,
    pub formula: Option<String>,
    pub guid_formula: Option<String>,
    pub default_value: Option<serde_json::Value>,
    pub value_constraint: Option<ValueConstraint>,
    pub cast: Option<UserDataType>,
    pub aggregation: Option<AggregationFunction>,
}

impl FieldPayload {
    fn effective_calc_mode(&self, current: Option<CalcMode>) -> CalcMode {
        if let Some(mode) = self.calc_mode {
            return mode;
        }
        if self.formula.is_some() || self.guid_formula.is_some() {
            CalcMode::Formula
        } else if self.default_value.is_some() {
            CalcMode::Parameter
        } else if self.source.is_some() {
            CalcMode::Direct
        } else {
            current.unwrap_or(CalcMode::Direct)
        }
    }

    /// Calc spec built from the payload on top of `base`.
    fn calc_spec(&self, base: Option<&CalcSpec>) -> ValidationResult<CalcSpec> {
        let mode = self.effective_calc_mode(base.map(CalcSpec::mode));
        let spec = match mode {
            CalcMode::Direct => {
                let (source, avatar_id) = match base {
                    Some(CalcSpec::Direct { source, avatar_id }) => {
                        (Some(source.clone()), avatar_id.clone())
                    }
                    _ => (None, None),
                };
                let source = self.source.clone().or(source).ok_or_else(|| {
                    ValidationFatal::invalid("direct field requires a source column")
                })?;
                CalcSpec::Direct {
                    source,
                    avatar_id: self.avatar_id.clone().or(avatar_id),
                }
            }
            CalcMode::Formula => {
                let (formula, guid_formula) = match base {
                    Some(CalcSpec::Formula {
                        formula,
                        guid_formula,
                    }) => (formula.clone(), guid_formula.clone()),
                    _ => (String::new(), String::new()),
                };
                // The text supplied now wins; the other one is regenerated.
                match (&self.formula, &self.guid_formula) {
                    (Some(formula), _) => CalcSpec::Formula {
                        formula: formula.clone(),
                        guid_formula: String::new(),
                    },
                    (None, Some(guid_formula)) => CalcSpec::Formula {
                        formula: String::new(),
                        guid_formula: guid_formula.clone(),
                    },
                    (None, None) => CalcSpec::Formula {
                        formula,
                        guid_formula,
                    },
                }
            }
            CalcMode::Parameter => {
                let (default_value, value_constraint) = match base {
                    Some(CalcSpec::Parameter {
                        default_value,
                        value_constraint,
                    }) => (Some(default_value.clone()), value_constraint.clone()),
                    _ => (None, ValueConstraint::default()),
                };
                let default_value = self.default_value.clone().or(default_value).ok_or_else(
                    || ValidationFatal::invalid("parameter field requires a default value"),
                )?;
                CalcSpec::Parameter {
                    default_value,
                    value_constraint: self.value_constraint.clone().unwrap_or(value_constraint),
                }
            }
        };
        Ok(spec)
    }

    /// Build a new field with add defaults.
    pub fn to_new_field(&self, id: &str, managed_by: ManagedBy) -> ValidationResult<Field> {
        let title = self
            .title
            .clone()
            .ok_or_else(|| ValidationFatal::invalid(format!("field '{}' requires a title", id)))?;
        let mut field = Field::new(id, title, self.calc_spec(None)?);
        field.description = self.description.clone().unwrap_or_default();
        field.hidden = self.hidden.unwrap_or(false);
        field.cast = self.cast;
        field.aggregation = self.aggregation.unwrap_or_default();
        field.managed_by = managed_by;
        Ok(field)
    }

    /// Apply the keys present in the payload to a copy of `base`.
    pub fn apply_to(&self, base: &Field) -> ValidationResult<Field> {
        let mut field = base.clone();
        if let Some(title) = &self.title {
            field.title = title.clone();
        }
        if let Some(description) = &self.description {
            field.description = description.clone();
        }
        if let Some(hidden) = self.hidden {
            field.hidden = hidden;
        }
        if let Some(cast) = self.cast {
            field.cast = Some(cast);
        }
        if let Some(aggregation) = self.aggregation {
            field.aggregation = aggregation;
        }
        let touches_calc = self.calc_mode.is_some()
            || self.source.is_some()
            || self.avatar_id.is_some()
            || self.formula.is_some()
            || self.guid_formula.is_some()
            || self.default_value.is_some()
            || self.value_constraint.is_some();
        if touches_calc {
            field.calc_spec = self.calc_spec(Some(&base.calc_spec))?;
        }
        Ok(field)
    }
}

/// Overrides accepted when cloning a field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloneFieldPayload {
    pub id: Option<String>,
    pub title: Option<String>,
    pub cast: Option<UserDataType>,
    pub aggregation: Option<AggregationFunction>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcePayload {
    pub id: Option<String>,
    pub title: Option<String>,
    pub connection_id: Option<String>,
    pub source_type: Option<String>,
    pub parameters: Option<SourceParameters>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AvatarPayload {
    pub id: Option<String>,
    pub source_id: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationPayload {
    pub id: Option<String>,
    pub left_avatar_id: Option<String>,
    pub right_avatar_id: Option<String>,
    pub conditions: Option<Vec<BinaryCondition>>,
    pub join_type: Option<JoinType>,
    pub required: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObligatoryFilterPayload {
    pub id: Option<String>,
    pub field_id: Option<String>,
    pub default_filters: Option<Vec<DefaultWhereClause>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionReplacement {
    /// Connection currently used by the sources.
    pub id: String,
    pub new_id: String,
}

// ============================================================================
// Action
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    AddField {
        field: FieldPayload,
        #[serde(default)]
        order_index: Option<usize>,
        #[serde(default)]
        managed_by: ManagedBy,
    },
    UpdateField {
        field: FieldPayload,
        /// Rename the field's id.
        #[serde(default)]
        new_id: Option<String>,
        #[serde(default)]
        managed_by: ManagedBy,
    },
    DeleteField {
        id: String,
        #[serde(default)]
        managed_by: ManagedBy,
    },
    CloneField {
        from_id: String,
        #[serde(default)]
        field: CloneFieldPayload,
        #[serde(default)]
        order_index: Option<usize>,
        #[serde(default)]
        managed_by: ManagedBy,
    },
    AddSource {
        source: SourcePayload,
        #[serde(default)]
        managed_by: ManagedBy,
    },
    UpdateSource {
        source: SourcePayload,
        #[serde(default)]
        managed_by: ManagedBy,
    },
    DeleteSource {
        id: String,
        #[serde(default)]
        managed_by: ManagedBy,
    },
    RefreshSource {
        id: String,
        #[serde(default)]
        force_update_fields: bool,
        #[serde(default)]
        managed_by: ManagedBy,
    },
    AddAvatar {
        avatar: AvatarPayload,
        #[serde(default)]
        disable_fields_update: bool,
        #[serde(default)]
        managed_by: ManagedBy,
    },
    UpdateAvatar {
        avatar: AvatarPayload,
        #[serde(default)]
        disable_fields_update: bool,
        #[serde(default)]
        managed_by: ManagedBy,
    },
    DeleteAvatar {
        id: String,
        #[serde(default)]
        disable_fields_update: bool,
        #[serde(default)]
        managed_by: ManagedBy,
    },
    AddRelation {
        relation: RelationPayload,
        #[serde(default)]
        managed_by: ManagedBy,
    },
    UpdateRelation {
        relation: RelationPayload,
        #[serde(default)]
        managed_by: ManagedBy,
    },
    DeleteRelation {
        id: String,
        #[serde(default)]
        managed_by: ManagedBy,
    },
    ReplaceConnection {
        connection: ConnectionReplacement,
        #[serde(default)]
        managed_by: ManagedBy,
    },
    AddObligatoryFilter {
        obligatory_filter: ObligatoryFilterPayload,
        #[serde(default)]
        managed_by: ManagedBy,
    },
    UpdateObligatoryFilter {
        obligatory_filter: ObligatoryFilterPayload,
        #[serde(default)]
        managed_by: ManagedBy,
    },
    DeleteObligatoryFilter {
        id: String,
        #[serde(default)]
        managed_by: ManagedBy,
    },
    UpdateSetting {
        name: DatasetSettingName,
        value: bool,
        #[serde(default)]
        managed_by: ManagedBy,
    },
}

impl Action {
    /// Wire name of the action.
    pub fn name(&self) -> &'static str {
        match self {
            Action::AddField { .. } => "add_field",
            Action::UpdateField { .. } => "update_field",
            Action::DeleteField { .. } => "delete_field",
            Action::CloneField { .. } => "clone_field",
            Action::AddSource { .. } => "add_source",
            Action::UpdateSource { .. } => "update_source",
            Action::DeleteSource { .. } => "delete_source",
            Action::RefreshSource { .. } => "refresh_source",
            Action::AddAvatar { .. } => "add_avatar",
            Action::UpdateAvatar { .. } => "update_avatar",
            Action::DeleteAvatar { .. } => "delete_avatar",
            Action::AddRelation { .. } => "add_relation",
            Action::UpdateRelation { .. } => "update_relation",
            Action::DeleteRelation { .. } => "delete_relation",
            Action::ReplaceConnection { .. } => "replace_connection",
            Action::AddObligatoryFilter { .. } => "add_obligatory_filter",
            Action::UpdateObligatoryFilter { .. } => "update_obligatory_filter",
            Action::DeleteObligatoryFilter { .. } => "delete_obligatory_filter",
            Action::UpdateSetting { .. } => "update_setting",
        }
    }

    pub fn managed_by(&self) -> ManagedBy {
        match self {
            Action::AddField { managed_by, .. }
            | Action::UpdateField { managed_by, .. }
            | Action::DeleteField { managed_by, .. }
            | Action::CloneField { managed_by, .. }
            | Action::AddSource { managed_by, .. }
            | Action::UpdateSource { managed_by, .. }
            | Action::DeleteSource { managed_by, .. }
            | Action::RefreshSource { managed_by, .. }
            | Action::AddAvatar { managed_by, .. }
            | Action::UpdateAvatar { managed_by, .. }
            | Action::DeleteAvatar { managed_by, .. }
            | Action::AddRelation { managed_by, .. }
            | Action::UpdateRelation { managed_by, .. }
            | Action::DeleteRelation { managed_by, .. }
            | Action::ReplaceConnection { managed_by, .. }
            | Action::AddObligatoryFilter { managed_by, .. }
            | Action::UpdateObligatoryFilter { managed_by, .. }
            | Action::DeleteObligatoryFilter { managed_by, .. }
            | Action::UpdateSetting { managed_by, .. } => *managed_by,
        }
    }

    pub fn is_field_action(&self) -> bool {
        matches!(
            self,
            Action::AddField { .. }
                | Action::UpdateField { .. }
                | Action::DeleteField { .. }
                | Action::CloneField { .. }
        )
    }

    /// Adds a parameter field; such actions run first in a batch.
    pub fn is_parameter_add(&self) -> bool {
        match self {
            Action::AddField { field, .. } => {
                field.effective_calc_mode(None) == CalcMode::Parameter
            }
            _ => false,
        }
    }
}
