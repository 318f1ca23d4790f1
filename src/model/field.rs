//! Result-schema fields.
//!
//! A field is either a direct column of an avatar, a formula over other
//! fields, or a user-supplied parameter. Formula fields carry two parallel
//! texts: `formula` addresses other fields by `[title]`, `guid_formula` by
//! `[id]`. Both describe the same expression.

use std::collections::{BTreeMap, BTreeSet};

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use super::types::{AggregationFunction, CalcMode, FieldType, ManagedBy, UserDataType};

/// Matches `[key]` references inside formula text.
static FORMULA_KEY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\]]*)\]").unwrap());

/// Constraint on the values a parameter may take.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValueConstraint {
    #[default]
    All,
    Range {
        #[serde(default)]
        min: Option<serde_json::Value>,
        #[serde(default)]
        max: Option<serde_json::Value>,
    },
    Set {
        values: Vec<serde_json::Value>,
    },
}

/// How the field's value is computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CalcSpec {
    Direct {
        source: String,
        #[serde(default)]
        avatar_id: Option<String>,
    },
    Formula {
        #[serde(default)]
        formula: String,
        #[serde(default)]
        guid_formula: String,
    },
    Parameter {
        default_value: serde_json::Value,
        #[serde(default)]
        value_constraint: ValueConstraint,
    },
}

impl CalcSpec {
    pub fn direct(source: impl Into<String>, avatar_id: Option<String>) -> Self {
        CalcSpec::Direct {
            source: source.into(),
            avatar_id,
        }
    }

    pub fn formula(formula: impl Into<String>) -> Self {
        CalcSpec::Formula {
            formula: formula.into(),
            guid_formula: String::new(),
        }
    }

    pub fn mode(&self) -> CalcMode {
        match self {
            CalcSpec::Direct { .. } => CalcMode::Direct,
            CalcSpec::Formula { .. } => CalcMode::Formula,
            CalcSpec::Parameter { .. } => CalcMode::Parameter,
        }
    }
}

/// A result-schema entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub hidden: bool,
    pub calc_spec: CalcSpec,
    /// User-chosen output type.
    #[serde(default)]
    pub cast: Option<UserDataType>,
    /// Type inferred from the source column or expression.
    #[serde(default)]
    pub initial_data_type: Option<UserDataType>,
    /// Type after cast and aggregation.
    #[serde(default)]
    pub data_type: Option<UserDataType>,
    #[serde(default, rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub has_auto_aggregation: bool,
    #[serde(default)]
    pub lock_aggregation: bool,
    #[serde(default)]
    pub aggregation: AggregationFunction,
    #[serde(default)]
    pub managed_by: ManagedBy,
    #[serde(default = "default_true")]
    pub valid: bool,
}

fn default_true() -> bool {
    true
}

impl Field {
    pub fn new(id: impl Into<String>, title: impl Into<String>, calc_spec: CalcSpec) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            hidden: false,
            calc_spec,
            cast: None,
            initial_data_type: None,
            data_type: None,
            field_type: FieldType::Dimension,
            has_auto_aggregation: false,
            lock_aggregation: false,
            aggregation: AggregationFunction::None,
            managed_by: ManagedBy::User,
            valid: true,
        }
    }

    pub fn calc_mode(&self) -> CalcMode {
        self.calc_spec.mode()
    }

    pub fn formula(&self) -> Option<&str> {
        match &self.calc_spec {
            CalcSpec::Formula { formula, .. } => Some(formula),
            _ => None,
        }
    }

    pub fn guid_formula(&self) -> Option<&str> {
        match &self.calc_spec {
            CalcSpec::Formula { guid_formula, .. } => Some(guid_formula),
            _ => None,
        }
    }

    /// Avatar of a direct field.
    pub fn avatar_id(&self) -> Option<&str> {
        match &self.calc_spec {
            CalcSpec::Direct { avatar_id, .. } => avatar_id.as_deref(),
            _ => None,
        }
    }

    /// Column name of a direct field.
    pub fn source(&self) -> Option<&str> {
        match &self.calc_spec {
            CalcSpec::Direct { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Measure semantics, either from the expression or an explicit aggregation.
    pub fn is_aggregated(&self) -> bool {
        self.has_auto_aggregation || self.aggregation != AggregationFunction::None
    }

    /// Whether this field's formula mentions `other` by title or by id.
    pub fn depends_on(&self, other: &Field) -> bool {
        match &self.calc_spec {
            CalcSpec::Formula {
                formula,
                guid_formula,
            } => {
                formula_keys(formula).contains(&other.title)
                    || formula_keys(guid_formula).contains(&other.id)
            }
            _ => false,
        }
    }
}

/// Keys referenced as `[key]` in formula text.
pub fn formula_keys(text: &str) -> BTreeSet<String> {
    FORMULA_KEY_RE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

/// Replace every `[key]` found in `key_map` with `[value]`.
///
/// Unknown keys are left untouched.
pub fn rename_in_formula(text: &str, key_map: &BTreeMap<String, String>) -> String {
    FORMULA_KEY_RE
        .replace_all(text, |caps: &Captures<'_>| {
            let key = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            match key_map.get(key) {
                Some(value) => format!("[{}]", value),
                None => {
                    tracing::debug!(key, "key not in rename map, leaving as is");
                    format!("[{}]", key)
                }
            }
        })
        .into_owned()
}
