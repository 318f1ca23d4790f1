//! Seams to the systems the validator does not own.
//!
//! Physical connectors, the connection store, ACLs, and connector-specific
//! migrations are reached only through these traits. All methods are
//! synchronous; hosts running on an async runtime adapt their clients with
//! [`blocking::BlockingProbe`] and run batches on a blocking pool.

pub mod blocking;
pub mod error;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use error::{BackendError, ConnectionLookupError, MigrationError, PermissionDenied, ProbeResult};

use crate::model::{ConnectionRef, DataSourceSpec, JoinType, SchemaInfo};

/// A connection as seen by the validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub id: String,
    /// Connector type, e.g. `postgres`.
    pub conn_type: String,
    /// Source type used when a source must be rebuilt from scratch.
    pub default_source_type: String,
}

impl Connection {
    pub fn new(
        id: impl Into<String>,
        conn_type: impl Into<String>,
        default_source_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            conn_type: conn_type.into(),
            default_source_type: default_source_type.into(),
        }
    }
}

/// Connector-neutral description of one piece of a source configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationDto {
    pub kind: String,
    #[serde(default)]
    pub values: BTreeMap<String, String>,
}

/// Introspection of a physical source.
pub trait SourceProbe: Send + Sync {
    fn source_exists(&self, spec: &DataSourceSpec) -> ProbeResult<bool>;

    /// Backend version string, if the backend reports one.
    fn get_db_info(&self, spec: &DataSourceSpec) -> ProbeResult<Option<String>>;

    fn get_schema_info(&self, spec: &DataSourceSpec) -> ProbeResult<SchemaInfo>;

    /// Join types the connector behind `source_type` can execute.
    fn supported_join_types(&self, source_type: &str) -> BTreeSet<JoinType>;
}

pub trait ConnectionRegistry: Send + Sync {
    fn get_connection(&self, conn_id: &str) -> Result<Connection, ConnectionLookupError>;
}

pub trait PermissionChecker: Send + Sync {
    fn check_read_permission(&self, conn_ids: &[String]) -> Result<(), PermissionDenied>;
}

pub trait ConnectorMigration: Send + Sync {
    fn export_migration_dtos(&self, conn_type: &str, spec: &DataSourceSpec) -> Vec<MigrationDto>;

    fn import_migration_dtos(
        &self,
        conn_type: &str,
        dtos: &[MigrationDto],
        connection_ref: &ConnectionRef,
    ) -> Result<DataSourceSpec, MigrationError>;
}

/// The collaborator set a validator runs against.
#[derive(Clone)]
pub struct Connectors {
    pub probe: Arc<dyn SourceProbe>,
    pub connections: Arc<dyn ConnectionRegistry>,
    pub permissions: Arc<dyn PermissionChecker>,
    pub migration: Arc<dyn ConnectorMigration>,
}

impl Connectors {
    pub fn new(
        probe: Arc<dyn SourceProbe>,
        connections: Arc<dyn ConnectionRegistry>,
        permissions: Arc<dyn PermissionChecker>,
        migration: Arc<dyn ConnectorMigration>,
    ) -> Self {
        Self {
            probe,
            connections,
            permissions,
            migration,
        }
    }
}

impl std::fmt::Debug for Connectors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connectors").finish_non_exhaustive()
    }
}
