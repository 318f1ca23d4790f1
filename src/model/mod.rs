//! Dataset data model.
//!
//! The dataset is an arena of components keyed by id. Cross references
//! (avatar -> source, relation -> avatars, field -> avatar, filter -> field)
//! are plain ids resolved through lookups, never owned pointers.

pub mod avatar;
pub mod errors;
pub mod field;
pub mod filter;
pub mod source;
pub mod types;

pub use avatar::{AvatarRelation, BinaryCondition, ConditionPart, SourceAvatar};
pub use errors::{codes, ComponentError, ComponentErrorPack, ErrorFilter, ErrorRegistry};
pub use field::{formula_keys, rename_in_formula, CalcSpec, Field, ValueConstraint};
pub use filter::{DefaultWhereClause, ObligatoryFilter};
pub use source::{
    ConnectionRef, DataSourceCollection, DataSourceSpec, IndexInfo, SchemaColumn, SchemaInfo,
    SourceParameters,
};
pub use types::{
    filters_by_type, AggregationFunction, BinaryJoinOperator, CalcMode, ComponentErrorLevel,
    ComponentType, DataSourceRole, DatasetSettingName, FieldType, JoinType, ManagedBy,
    TopLevelComponentId, UserDataType, WhereClauseOperation,
};

use serde::{Deserialize, Serialize};

use crate::semantic::FieldLineage;

/// Dataset-level switches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetSettings {
    pub load_preview_by_default: bool,
    pub template_enabled: bool,
    pub data_export_forbidden: bool,
}

impl DatasetSettings {
    pub fn set(&mut self, name: DatasetSettingName, value: bool) {
        match name {
            DatasetSettingName::LoadPreviewByDefault => self.load_preview_by_default = value,
            DatasetSettingName::TemplateEnabled => self.template_enabled = value,
            DatasetSettingName::DataExportForbidden => self.data_export_forbidden = value,
        }
    }

    pub fn get(&self, name: DatasetSettingName) -> bool {
        match name {
            DatasetSettingName::LoadPreviewByDefault => self.load_preview_by_default,
            DatasetSettingName::TemplateEnabled => self.template_enabled,
            DatasetSettingName::DataExportForbidden => self.data_export_forbidden,
        }
    }
}

/// The mutable dataset graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Dataset {
    pub id: String,
    pub sources: Vec<DataSourceCollection>,
    pub avatars: Vec<SourceAvatar>,
    pub relations: Vec<AvatarRelation>,
    /// Ordered result schema.
    pub result_schema: Vec<Field>,
    pub obligatory_filters: Vec<ObligatoryFilter>,
    pub settings: DatasetSettings,
    pub error_registry: ErrorRegistry,
    pub lineage: FieldLineage,
}

impl Dataset {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn source(&self, id: &str) -> Option<&DataSourceCollection> {
        self.sources.iter().find(|s| s.id == id)
    }

    pub fn source_mut(&mut self, id: &str) -> Option<&mut DataSourceCollection> {
        self.sources.iter_mut().find(|s| s.id == id)
    }

    pub fn avatar(&self, id: &str) -> Option<&SourceAvatar> {
        self.avatars.iter().find(|a| a.id == id)
    }

    pub fn avatar_mut(&mut self, id: &str) -> Option<&mut SourceAvatar> {
        self.avatars.iter_mut().find(|a| a.id == id)
    }

    pub fn relation(&self, id: &str) -> Option<&AvatarRelation> {
        self.relations.iter().find(|r| r.id == id)
    }

    pub fn relation_mut(&mut self, id: &str) -> Option<&mut AvatarRelation> {
        self.relations.iter_mut().find(|r| r.id == id)
    }

    pub fn field(&self, id: &str) -> Option<&Field> {
        self.result_schema.iter().find(|f| f.id == id)
    }

    pub fn field_mut(&mut self, id: &str) -> Option<&mut Field> {
        self.result_schema.iter_mut().find(|f| f.id == id)
    }

    pub fn field_by_title(&self, title: &str) -> Option<&Field> {
        self.result_schema.iter().find(|f| f.title == title)
    }

    pub fn field_index(&self, id: &str) -> Option<usize> {
        self.result_schema.iter().position(|f| f.id == id)
    }

    pub fn obligatory_filter(&self, id: &str) -> Option<&ObligatoryFilter> {
        self.obligatory_filters.iter().find(|f| f.id == id)
    }

    pub fn obligatory_filter_mut(&mut self, id: &str) -> Option<&mut ObligatoryFilter> {
        self.obligatory_filters.iter_mut().find(|f| f.id == id)
    }
}
