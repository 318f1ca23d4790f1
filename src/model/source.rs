//! Data source definitions.
//!
//! A [`DataSourceCollection`] is the unit users add to a dataset. It holds one
//! [`DataSourceSpec`] per role: the live `origin` and an optional materialized
//! `sample`. The engine reads only the origin's cached `raw_schema`.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::types::{DataSourceRole, ManagedBy, UserDataType};

/// One column of a source's raw schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaColumn {
    /// Physical column name.
    pub name: String,
    /// Display title; stable across physical renames.
    pub title: String,
    pub native_type: String,
    pub user_type: UserDataType,
    #[serde(default = "default_true")]
    pub nullable: bool,
    #[serde(default)]
    pub has_auto_aggregation: bool,
    #[serde(default)]
    pub lock_aggregation: bool,
    #[serde(default)]
    pub description: String,
}

fn default_true() -> bool {
    true
}

impl SchemaColumn {
    pub fn new(
        name: impl Into<String>,
        native_type: impl Into<String>,
        user_type: UserDataType,
    ) -> Self {
        let name = name.into();
        Self {
            title: name.clone(),
            name,
            native_type: native_type.into(),
            user_type,
            nullable: true,
            has_auto_aggregation: false,
            lock_aggregation: false,
            description: String::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_auto_aggregation(mut self, lock: bool) -> Self {
        self.has_auto_aggregation = true;
        self.lock_aggregation = lock;
        self
    }
}

/// Index metadata reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IndexInfo {
    pub columns: Vec<String>,
    #[serde(default)]
    pub kind: Option<String>,
}

/// Result of a schema probe.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaInfo {
    pub schema: Vec<SchemaColumn>,
    #[serde(default)]
    pub indexes: Option<BTreeSet<IndexInfo>>,
}

/// Reference to the connection a source reads from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionRef {
    pub conn_id: String,
}

impl ConnectionRef {
    pub fn new(conn_id: impl Into<String>) -> Self {
        Self {
            conn_id: conn_id.into(),
        }
    }
}

impl std::fmt::Display for ConnectionRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.conn_id)
    }
}

/// Opaque connector parameters (table name, schema name, subquery...).
pub type SourceParameters = BTreeMap<String, serde_json::Value>;

/// A single physical source variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSourceSpec {
    pub source_type: String,
    pub connection_ref: Option<ConnectionRef>,
    /// Connector type of the connection at the time the source was bound.
    #[serde(default)]
    pub conn_type: Option<String>,
    #[serde(default)]
    pub parameters: SourceParameters,
    #[serde(default)]
    pub raw_schema: Option<Vec<SchemaColumn>>,
    #[serde(default)]
    pub index_info: Option<BTreeSet<IndexInfo>>,
    #[serde(default)]
    pub db_version: Option<String>,
}

impl DataSourceSpec {
    pub fn new(source_type: impl Into<String>, connection_ref: Option<ConnectionRef>) -> Self {
        Self {
            source_type: source_type.into(),
            connection_ref,
            conn_type: None,
            parameters: SourceParameters::new(),
            raw_schema: None,
            index_info: None,
            db_version: None,
        }
    }

    pub fn with_parameters(mut self, parameters: SourceParameters) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn conn_id(&self) -> Option<&str> {
        self.connection_ref.as_ref().map(|c| c.conn_id.as_str())
    }

    /// Whether this spec points at the same physical object as the arguments.
    pub fn matches_configuration(
        &self,
        conn_id: &str,
        source_type: &str,
        parameters: &SourceParameters,
    ) -> bool {
        self.conn_id() == Some(conn_id)
            && self.source_type == source_type
            && parameters
                .iter()
                .all(|(key, value)| self.parameters.get(key) == Some(value))
    }
}

/// A named source bound to a connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSourceCollection {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub managed_by: ManagedBy,
    #[serde(default = "default_true")]
    pub valid: bool,
    pub origin: DataSourceSpec,
    #[serde(default)]
    pub sample: Option<DataSourceSpec>,
}

impl DataSourceCollection {
    pub fn new(id: impl Into<String>, title: impl Into<String>, origin: DataSourceSpec) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            managed_by: ManagedBy::User,
            valid: true,
            origin,
            sample: None,
        }
    }

    pub fn get_for_role(&self, role: DataSourceRole) -> Option<&DataSourceSpec> {
        match role {
            DataSourceRole::Origin => Some(&self.origin),
            DataSourceRole::Sample => self.sample.as_ref(),
        }
    }

    pub fn raw_schema(&self) -> Option<&[SchemaColumn]> {
        self.origin.raw_schema.as_deref()
    }

    pub fn conn_id(&self) -> Option<&str> {
        self.origin.conn_id()
    }

    pub fn source_type(&self) -> &str {
        &self.origin.source_type
    }

    /// Column of the origin schema with the given physical name.
    pub fn column(&self, name: &str) -> Option<&SchemaColumn> {
        self.raw_schema()?.iter().find(|col| col.name == name)
    }
}
