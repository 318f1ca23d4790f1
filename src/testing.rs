//! In-memory collaborators and dataset fixtures.
//!
//! [`InMemoryConnectors`] implements every connector seam over shared maps,
//! so a test can change a table between batches and observe the refresh.
//! [`DatasetBuilder`] assembles datasets that already look validated.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use dashmap::{DashMap, DashSet};

use crate::connectors::{
    BackendError, Connection, ConnectionLookupError, ConnectionRegistry, ConnectorMigration,
    Connectors, MigrationDto, MigrationError, PermissionChecker, PermissionDenied, ProbeResult,
    SourceProbe,
};
use crate::model::{
    CalcSpec, ConnectionRef, DataSourceCollection, DataSourceSpec, Dataset, Field, FieldType,
    JoinType, SchemaColumn, SchemaInfo, SourceAvatar, UserDataType,
};

const TABLE_PARAM: &str = "table_name";

fn all_join_types() -> BTreeSet<JoinType> {
    [JoinType::Inner, JoinType::Left, JoinType::Right, JoinType::Full].into()
}

#[derive(Debug, Default)]
struct State {
    tables: DashMap<String, Vec<SchemaColumn>>,
    failing: DashMap<String, BackendError>,
    join_types: DashMap<String, BTreeSet<JoinType>>,
    connections: DashMap<String, Connection>,
    denied: DashSet<String>,
    impossible: DashSet<String>,
}

/// Connector seams backed by shared in-memory state.
///
/// Clones share state. Tables are keyed by the `table_name` parameter.
#[derive(Debug, Clone, Default)]
pub struct InMemoryConnectors {
    state: Arc<State>,
}

impl InMemoryConnectors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connection `c1` (postgresql) with the `orders` table.
    pub fn orders() -> Self {
        Self::new()
            .with_connection(Connection::new("c1", "postgresql", "PG_TABLE"))
            .with_table("orders", orders_columns())
    }

    pub fn with_table(self, name: &str, columns: Vec<SchemaColumn>) -> Self {
        self.set_table(name, columns);
        self
    }

    pub fn set_table(&self, name: &str, columns: Vec<SchemaColumn>) {
        self.state.tables.insert(name.to_string(), columns);
    }

    pub fn remove_table(&self, name: &str) {
        self.state.tables.remove(name);
    }

    pub fn with_join_types(self, source_type: &str, join_types: &[JoinType]) -> Self {
        self.state
            .join_types
            .insert(source_type.to_string(), join_types.iter().copied().collect());
        self
    }

    pub fn with_connection(self, connection: Connection) -> Self {
        self.state
            .connections
            .insert(connection.id.clone(), connection);
        self
    }

    pub fn remove_connection(&self, conn_id: &str) {
        self.state.connections.remove(conn_id);
    }

    /// Deny read access to `conn_id`.
    pub fn deny(self, conn_id: &str) -> Self {
        self.state.denied.insert(conn_id.to_string());
        self
    }

    /// Refuse to import migration payloads for `conn_type`.
    pub fn impossible_migration(self, conn_type: &str) -> Self {
        self.state.impossible.insert(conn_type.to_string());
        self
    }

    /// Make every probe of `table` fail with `error`.
    pub fn backend_error(self, table: &str, error: BackendError) -> Self {
        self.state.failing.insert(table.to_string(), error);
        self
    }

    pub fn into_connectors(&self) -> Connectors {
        let shared = Arc::new(self.clone());
        Connectors::new(shared.clone(), shared.clone(), shared.clone(), shared)
    }

    fn table_of(spec: &DataSourceSpec) -> Option<&str> {
        spec.parameters.get(TABLE_PARAM).and_then(|v| v.as_str())
    }

    fn check_failing(&self, spec: &DataSourceSpec) -> ProbeResult<()> {
        match Self::table_of(spec).and_then(|t| self.state.failing.get(t)) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

impl SourceProbe for InMemoryConnectors {
    fn source_exists(&self, spec: &DataSourceSpec) -> ProbeResult<bool> {
        self.check_failing(spec)?;
        Ok(Self::table_of(spec).is_some_and(|t| self.state.tables.contains_key(t)))
    }

    fn get_db_info(&self, spec: &DataSourceSpec) -> ProbeResult<Option<String>> {
        self.check_failing(spec)?;
        Ok(Some("test-1.0".to_string()))
    }

    fn get_schema_info(&self, spec: &DataSourceSpec) -> ProbeResult<SchemaInfo> {
        self.check_failing(spec)?;
        let table = Self::table_of(spec)
            .ok_or_else(|| BackendError::Misconfigured(format!("missing '{}'", TABLE_PARAM)))?;
        let schema = self
            .state
            .tables
            .get(table)
            .map(|columns| columns.clone())
            .unwrap_or_default();
        Ok(SchemaInfo {
            schema,
            indexes: None,
        })
    }

    fn supported_join_types(&self, source_type: &str) -> BTreeSet<JoinType> {
        self.state
            .join_types
            .get(source_type)
            .map(|types| types.clone())
            .unwrap_or_else(all_join_types)
    }
}

impl ConnectionRegistry for InMemoryConnectors {
    fn get_connection(&self, conn_id: &str) -> Result<Connection, ConnectionLookupError> {
        self.state
            .connections
            .get(conn_id)
            .map(|c| c.clone())
            .ok_or_else(|| ConnectionLookupError::NotFound(conn_id.to_string()))
    }
}

impl PermissionChecker for InMemoryConnectors {
    fn check_read_permission(&self, conn_ids: &[String]) -> Result<(), PermissionDenied> {
        match conn_ids.iter().find(|id| self.state.denied.contains(*id)) {
            Some(conn_id) => Err(PermissionDenied {
                conn_id: conn_id.clone(),
            }),
            None => Ok(()),
        }
    }
}

impl ConnectorMigration for InMemoryConnectors {
    fn export_migration_dtos(&self, _conn_type: &str, spec: &DataSourceSpec) -> Vec<MigrationDto> {
        let mut values: BTreeMap<String, String> = spec
            .parameters
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
            .collect();
        values.insert("source_type".to_string(), spec.source_type.clone());
        vec![MigrationDto {
            kind: "table".to_string(),
            values,
        }]
    }

    fn import_migration_dtos(
        &self,
        conn_type: &str,
        dtos: &[MigrationDto],
        connection_ref: &ConnectionRef,
    ) -> Result<DataSourceSpec, MigrationError> {
        if self.state.impossible.contains(conn_type) {
            return Err(MigrationError::MigrationImpossible(format!(
                "no import for '{}'",
                conn_type
            )));
        }
        let dto = dtos
            .iter()
            .find(|dto| dto.kind == "table")
            .ok_or_else(|| MigrationError::MigrationImpossible("no table payload".into()))?;
        let mut values = dto.values.clone();
        let source_type = values
            .remove("source_type")
            .ok_or_else(|| MigrationError::MigrationImpossible("no source type".into()))?;
        let parameters = values
            .into_iter()
            .map(|(k, v)| (k, serde_json::Value::String(v)))
            .collect();
        Ok(DataSourceSpec::new(source_type, Some(connection_ref.clone())).with_parameters(parameters))
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// Columns of the `orders` table.
pub fn orders_columns() -> Vec<SchemaColumn> {
    vec![
        SchemaColumn::new("id", "int4", UserDataType::Integer),
        SchemaColumn::new("amount", "numeric", UserDataType::Float),
        SchemaColumn::new("created", "date", UserDataType::Date),
        SchemaColumn::new("status", "text", UserDataType::String),
    ]
}

/// Builds datasets whose direct fields carry the attributes a validator
/// would have derived.
#[derive(Debug)]
pub struct DatasetBuilder {
    ds: Dataset,
}

impl DatasetBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            ds: Dataset::new(id),
        }
    }

    /// Source `s1` on connection `c1`, avatar `a1`, and one field per column
    /// titled `Id`, `Amount`, `Created`, `Status`.
    pub fn orders() -> Self {
        Self::new("ds")
            .source("s1", "orders", "c1", "PG_TABLE", "orders", orders_columns())
            .avatar("a1", "s1", "orders")
            .direct_field("id", "Id", "a1", "id")
            .direct_field("amount", "Amount", "a1", "amount")
            .direct_field("created", "Created", "a1", "created")
            .direct_field("status", "Status", "a1", "status")
    }

    pub fn source(
        mut self,
        id: &str,
        title: &str,
        conn_id: &str,
        source_type: &str,
        table: &str,
        columns: Vec<SchemaColumn>,
    ) -> Self {
        let mut spec = DataSourceSpec::new(source_type, Some(ConnectionRef::new(conn_id)))
            .with_parameters([(TABLE_PARAM.to_string(), serde_json::json!(table))].into());
        spec.conn_type = Some("postgresql".to_string());
        spec.raw_schema = Some(columns);
        self.ds.sources.push(DataSourceCollection::new(id, title, spec));
        self
    }

    pub fn avatar(mut self, id: &str, source_id: &str, title: &str) -> Self {
        let mut avatar = SourceAvatar::new(id, source_id, title);
        avatar.is_root = self.ds.avatars.is_empty();
        self.ds.avatars.push(avatar);
        self
    }

    /// A direct field typed from its column.
    pub fn direct_field(mut self, id: &str, title: &str, avatar_id: &str, column: &str) -> Self {
        let mut field = Field::new(
            id,
            title,
            CalcSpec::direct(column, Some(avatar_id.to_string())),
        );
        let found = self
            .ds
            .avatar(avatar_id)
            .and_then(|a| self.ds.source(&a.source_id))
            .and_then(|s| s.column(column))
            .cloned();
        if let Some(col) = found {
            field.initial_data_type = Some(col.user_type);
            field.cast = Some(col.user_type);
            field.data_type = Some(col.user_type);
            field.has_auto_aggregation = col.has_auto_aggregation;
            field.lock_aggregation = col.lock_aggregation;
            if col.has_auto_aggregation {
                field.field_type = FieldType::Measure;
            }
        }
        self.ds.result_schema.push(field);
        self
    }

    pub fn build(self) -> Dataset {
        self.ds
    }
}
