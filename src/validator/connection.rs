//! Connection replacement and connection health.

use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use super::error::ValidationResult;
use super::DatasetValidator;
use crate::connectors::{ConnectionLookupError, MigrationError};
use crate::model::{codes, ComponentError, ComponentType, ConnectionRef, DataSourceSpec, ErrorFilter};

impl<'a> DatasetValidator<'a> {
    /// Move every source on `old_conn_id` to `new_conn_id`.
    ///
    /// Each source is carried over through the connectors' migration
    /// payloads. A source the new connector cannot express falls back to the
    /// connection's default source type with no parameters. The capability
    /// check ignores all migrated sources, since they move together.
    pub(super) fn replace_connection(
        &mut self,
        old_conn_id: &str,
        new_conn_id: &str,
    ) -> ValidationResult<()> {
        let connection = self.lookup_connection(new_conn_id)?;
        self.connectors
            .permissions
            .check_read_permission(&[new_conn_id.to_string()])?;

        let affected: Vec<(String, DataSourceSpec)> = self
            .ds
            .sources
            .iter()
            .filter(|s| s.conn_id() == Some(old_conn_id))
            .map(|s| (s.id.clone(), s.origin.clone()))
            .collect();
        if affected.is_empty() {
            debug!(conn = %old_conn_id, "no source uses the connection");
            return Ok(());
        }
        info!(from = %old_conn_id, to = %new_conn_id, sources = affected.len(), "replacing connection");

        let ignore: BTreeSet<String> = affected.iter().map(|(id, _)| id.clone()).collect();
        let new_ref = ConnectionRef::new(new_conn_id);
        for (source_id, old_spec) in affected {
            let old_conn_type = old_spec.conn_type.clone().unwrap_or_default();
            let dtos = self
                .connectors
                .migration
                .export_migration_dtos(&old_conn_type, &old_spec);
            let imported = self.connectors.migration.import_migration_dtos(
                &connection.conn_type,
                &dtos,
                &new_ref,
            );
            let mut spec = match imported {
                Ok(spec) => spec,
                Err(MigrationError::MigrationImpossible(reason)) => {
                    warn!(source = %source_id, %reason, "falling back to default source type");
                    DataSourceSpec::new(connection.default_source_type.clone(), Some(new_ref.clone()))
                }
            };
            spec.connection_ref = Some(new_ref.clone());
            spec.conn_type = Some(connection.conn_type.clone());
            spec.raw_schema = old_spec.raw_schema.clone();

            self.apply_source_update(&source_id, None, Some(spec), &ignore)?;
        }
        Ok(())
    }

    /// Flag sources whose connection is gone.
    ///
    /// Only a definite "not found" is reported; a registry that is merely
    /// unavailable leaves the sources untouched.
    pub fn collect_nonexistent_connection_errors(&mut self) {
        let sources: Vec<(String, Option<String>)> = self
            .ds
            .sources
            .iter()
            .map(|s| (s.id.clone(), s.conn_id().map(str::to_string)))
            .collect();

        for (source_id, conn_id) in sources {
            self.ds
                .error_registry
                .remove_errors(&source_id, ErrorFilter::Code(codes::CONNECTION_NOT_FOUND));
            let missing = match &conn_id {
                None => true,
                Some(conn_id) => matches!(
                    self.connectors.connections.get_connection(conn_id),
                    Err(ConnectionLookupError::NotFound(_))
                ),
            };
            if missing {
                self.register_error(
                    ComponentType::DataSource,
                    &source_id,
                    ComponentError::new(
                        codes::CONNECTION_NOT_FOUND,
                        format!(
                            "connection '{}' of source '{}' does not exist",
                            conn_id.unwrap_or_default(),
                            source_id
                        ),
                    ),
                );
            }
            self.mark_affected(ComponentType::DataSource, &source_id);
        }
        self.flush_affected();
    }
}
