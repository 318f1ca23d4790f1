//! Component-scoped error registry.
//!
//! Errors are grouped into one pack per component id. A component is valid
//! iff its pack is empty or absent.
//!
//! ```text
//! ErrorRegistry
//!   ├── pack "f1" (field)            [FORMULA.UNKNOWN_FIELD]
//!   ├── pack "s1" (data_source)      [DB.SOURCE_DOES_NOT_EXIST]
//!   └── pack "__result_schema__"     [RESULT_SCHEMA.TOO_MANY_FIELDS (warning)]
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::types::{ComponentErrorLevel, ComponentType};

/// Hierarchical error codes. Prefix matching works on whole segments.
pub mod codes {
    pub type Code = &'static [&'static str];

    pub const FIELD_TITLE_CONFLICT: Code = &["ERR", "DS_API", "FIELD", "TITLE", "CONFLICT"];
    pub const SOURCE_TITLE_CONFLICT: Code = &["ERR", "DS_API", "SOURCE", "TITLE", "CONFLICT"];
    pub const AVATAR_TITLE_CONFLICT: Code = &["ERR", "DS_API", "AVATAR", "TITLE", "CONFLICT"];

    pub const FORMULA: Code = &["ERR", "DS_API", "FORMULA"];
    pub const FORMULA_PARSE: Code = &["ERR", "DS_API", "FORMULA", "PARSE"];
    pub const FORMULA_UNKNOWN_FIELD: Code = &["ERR", "DS_API", "FORMULA", "UNKNOWN_FIELD"];
    pub const FORMULA_UNKNOWN_FUNCTION: Code = &["ERR", "DS_API", "FORMULA", "UNKNOWN_FUNCTION"];
    pub const FORMULA_ARG_COUNT: Code = &["ERR", "DS_API", "FORMULA", "ARG_COUNT"];
    pub const FORMULA_TYPE_MISMATCH: Code = &["ERR", "DS_API", "FORMULA", "TYPE_MISMATCH"];
    pub const FORMULA_RECURSION: Code = &["ERR", "DS_API", "FORMULA", "RECURSION"];

    pub const FIELD_AVATAR_NOT_FOUND: Code = &["ERR", "DS_API", "FIELD", "AVATAR_NOT_FOUND"];
    pub const FIELD_COLUMN_NOT_FOUND: Code = &["ERR", "DS_API", "FIELD", "COLUMN_NOT_FOUND"];

    pub const DB: Code = &["ERR", "DS_API", "DB"];
    pub const DB_SOURCE_NOT_FOUND: Code = &["ERR", "DS_API", "DB", "SOURCE_NOT_FOUND"];
    pub const DB_SOURCE_DOES_NOT_EXIST: Code = &["ERR", "DS_API", "DB", "SOURCE_DOES_NOT_EXIST"];
    pub const DB_SCHEMA_EMPTY: Code = &["ERR", "DS_API", "DB", "SCHEMA_EMPTY"];
    pub const CONNECTION_NOT_FOUND: Code =
        &["ERR", "DS_API", "REFERENCED_ENTRY", "CONNECTION_NOT_FOUND"];

    pub const RELATION_JOIN_TYPE: Code = &["ERR", "DS_API", "AVATAR_RELATION", "JOIN_TYPE"];
    pub const RELATION_CONDITION: Code = &["ERR", "DS_API", "AVATAR_RELATION", "CONDITION"];

    pub const FILTER_UNSUPPORTED_OPERATION: Code =
        &["ERR", "DS_API", "OBLIGATORY_FILTER", "UNSUPPORTED_OPERATION"];

    pub const TOO_MANY_FIELDS: Code = &["ERR", "DS_API", "RESULT_SCHEMA", "TOO_MANY_FIELDS"];

    pub fn to_vec(code: Code) -> Vec<String> {
        code.iter().map(|part| part.to_string()).collect()
    }

    pub fn has_prefix(code: &[String], prefix: Code) -> bool {
        code.len() >= prefix.len() && code.iter().zip(prefix).all(|(a, b)| a == b)
    }

    pub fn matches(code: &[String], exact: Code) -> bool {
        code.len() == exact.len() && has_prefix(code, exact)
    }
}

/// A single validation problem attached to a component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentError {
    pub code: Vec<String>,
    pub message: String,
    #[serde(default)]
    pub details: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub level: ComponentErrorLevel,
}

impl ComponentError {
    pub fn new(code: codes::Code, message: impl Into<String>) -> Self {
        Self {
            code: codes::to_vec(code),
            message: message.into(),
            details: BTreeMap::new(),
            level: ComponentErrorLevel::Error,
        }
    }

    pub fn warning(code: codes::Code, message: impl Into<String>) -> Self {
        Self {
            level: ComponentErrorLevel::Warning,
            ..Self::new(code, message)
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// Code as a dotted string, e.g. `ERR.DS_API.FORMULA.PARSE`.
    pub fn code_str(&self) -> String {
        self.code.join(".")
    }
}

/// All errors of one component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentErrorPack {
    pub id: String,
    #[serde(rename = "type")]
    pub component_type: ComponentType,
    pub errors: Vec<ComponentError>,
}

/// Which errors of a pack to remove.
#[derive(Debug, Clone, Copy)]
pub enum ErrorFilter {
    All,
    Code(codes::Code),
    CodePrefix(codes::Code),
}

impl ErrorFilter {
    fn matches(&self, error: &ComponentError) -> bool {
        match self {
            ErrorFilter::All => true,
            ErrorFilter::Code(code) => codes::matches(&error.code, code),
            ErrorFilter::CodePrefix(prefix) => codes::has_prefix(&error.code, prefix),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorRegistry {
    pub items: Vec<ComponentErrorPack>,
}

impl ErrorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_pack(&self, id: &str) -> Option<&ComponentErrorPack> {
        self.items.iter().find(|pack| pack.id == id)
    }

    pub fn errors_for(&self, id: &str) -> &[ComponentError] {
        self.get_pack(id)
            .map(|pack| pack.errors.as_slice())
            .unwrap_or_default()
    }

    pub fn add_error(&mut self, id: &str, component_type: ComponentType, error: ComponentError) {
        match self.items.iter_mut().find(|pack| pack.id == id) {
            Some(pack) => pack.errors.push(error),
            None => self.items.push(ComponentErrorPack {
                id: id.to_string(),
                component_type,
                errors: vec![error],
            }),
        }
    }

    pub fn has_error(&self, id: &str, code: codes::Code) -> bool {
        self.errors_for(id)
            .iter()
            .any(|error| codes::matches(&error.code, code))
    }

    /// Remove matching errors; an emptied pack is dropped.
    pub fn remove_errors(&mut self, id: &str, filter: ErrorFilter) {
        if let Some(pack) = self.items.iter_mut().find(|pack| pack.id == id) {
            pack.errors.retain(|error| !filter.matches(error));
        }
        self.items.retain(|pack| !pack.errors.is_empty());
    }

    /// Remove matching errors from every pack.
    pub fn remove_errors_everywhere(&mut self, filter: ErrorFilter) {
        for pack in &mut self.items {
            pack.errors.retain(|error| !filter.matches(error));
        }
        self.items.retain(|pack| !pack.errors.is_empty());
    }

    pub fn remove_pack(&mut self, id: &str) {
        self.items.retain(|pack| pack.id != id);
    }

    pub fn rename_pack(&mut self, old_id: &str, new_id: &str) {
        for pack in &mut self.items {
            if pack.id == old_id {
                pack.id = new_id.to_string();
            }
        }
    }

    pub fn is_valid(&self, id: &str) -> bool {
        self.errors_for(id).is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.iter().map(|pack| pack.errors.len()).sum()
    }

    /// Flat `(component_id, component_type, error)` listing.
    pub fn iter(&self) -> impl Iterator<Item = (&str, ComponentType, &ComponentError)> {
        self.items.iter().flat_map(|pack| {
            pack.errors
                .iter()
                .map(move |error| (pack.id.as_str(), pack.component_type, error))
        })
    }
}
