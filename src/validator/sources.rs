//! Data source actions, probing and schema reconciliation.
//!
//! ```text
//! add_source ──► connection + ACL ──► dedup? ──► capability check ──► insert
//!                                                                      │
//! refresh_source ─────────────────────────────────────────────► refresh_data_source
//!                                                                      │
//!                                   probe (exists, schema, version) ◄──┘
//!                                      │
//!                                      └── schema changed? ──► reconcile direct fields
//! ```

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use super::action::SourcePayload;
use super::error::{ValidationFatal, ValidationResult};
use super::{new_component_id, DatasetValidator};
use crate::capabilities::DatasetCapabilities;
use crate::components::{ComponentRef, DatasetEditor, StoreError};
use crate::connectors::{Connection, ProbeResult, SourceProbe};
use crate::model::{
    codes, CalcSpec, ComponentError, ComponentType, ConnectionRef, DataSourceCollection,
    DataSourceSpec, ErrorFilter, Field, ManagedBy, SchemaColumn, SchemaInfo, UserDataType,
};

/// Probe a source: `None` when it does not exist.
fn probe_source(
    probe: &dyn SourceProbe,
    spec: &DataSourceSpec,
) -> ProbeResult<Option<(SchemaInfo, Option<String>)>> {
    if !probe.source_exists(spec)? {
        return Ok(None);
    }
    let info = probe.get_schema_info(spec)?;
    let version = probe.get_db_info(spec)?;
    Ok(Some((info, version)))
}

impl<'a> DatasetValidator<'a> {
    pub(super) fn lookup_connection(&self, conn_id: &str) -> ValidationResult<Connection> {
        self.connectors
            .connections
            .get_connection(conn_id)
            .map_err(|e| ValidationFatal::UnknownConnection {
                conn_id: conn_id.to_string(),
                reason: e.to_string(),
            })
    }

    fn ensure_can_be_added(
        &self,
        conn_id: Option<&str>,
        source_type: &str,
        ignore: &BTreeSet<String>,
    ) -> ValidationResult<()> {
        let caps = DatasetCapabilities::new(self.ds, self.connectors.probe.as_ref());
        if caps.source_can_be_added(conn_id, source_type, ignore) {
            Ok(())
        } else {
            Err(ValidationFatal::SourceCannotBeAdded {
                conn_id: conn_id.unwrap_or_default().to_string(),
                source_type: source_type.to_string(),
            })
        }
    }

    // ========================================================================
    // Actions
    // ========================================================================

    pub(super) fn add_source(
        &mut self,
        payload: SourcePayload,
        managed_by: ManagedBy,
    ) -> ValidationResult<()> {
        let conn_id = payload
            .connection_id
            .clone()
            .ok_or_else(|| ValidationFatal::invalid("add_source requires a connection id"))?;
        let connection = self.lookup_connection(&conn_id)?;

        let mut conn_ids: Vec<String> = self
            .ds
            .sources
            .iter()
            .filter_map(|s| s.conn_id().map(str::to_string))
            .collect();
        conn_ids.push(conn_id.clone());
        conn_ids.sort();
        conn_ids.dedup();
        self.connectors
            .permissions
            .check_read_permission(&conn_ids)?;

        let source_type = payload
            .source_type
            .clone()
            .unwrap_or_else(|| connection.default_source_type.clone());
        let parameters = payload.parameters.clone().unwrap_or_default();

        if let Some(existing) = self
            .ds
            .find_data_source_configuration(&conn_id, &source_type, &parameters)
        {
            let existing = existing.to_string();
            debug!(source = %existing, "identical source already present");
            if let Some(requested) = payload.id.filter(|requested| *requested != existing) {
                self.remapped_source_ids.insert(requested, existing);
            }
            return Ok(());
        }

        let id = payload.id.clone().unwrap_or_else(new_component_id);
        self.validate_new_id(&id)?;
        self.ensure_can_be_added(Some(&conn_id), &source_type, &BTreeSet::new())?;

        // Fields left without a source may resolve again.
        let stale: Vec<String> = self
            .ds
            .error_registry
            .iter()
            .filter(|(_, _, error)| codes::matches(&error.code, codes::DB_SOURCE_NOT_FOUND))
            .map(|(component_id, _, _)| component_id.to_string())
            .collect();
        self.ds
            .error_registry
            .remove_errors_everywhere(ErrorFilter::Code(codes::DB_SOURCE_NOT_FOUND));
        for field_id in stale {
            self.mark_affected(ComponentType::Field, &field_id);
        }

        let mut spec = DataSourceSpec::new(source_type, Some(ConnectionRef::new(&conn_id)))
            .with_parameters(parameters);
        spec.conn_type = Some(connection.conn_type);
        let title = payload.title.unwrap_or_else(|| id.clone());
        let mut source = DataSourceCollection::new(&id, title.clone(), spec);
        source.managed_by = managed_by;
        DatasetEditor::new(self.ds).add_data_source_collection(source)?;

        self.refresh_data_source(&id, None, false)?;
        self.validate_title(ComponentType::DataSource, &id, None, Some(&title));
        self.mark_affected(ComponentType::DataSource, &id);
        Ok(())
    }

    pub(super) fn update_source(
        &mut self,
        payload: SourcePayload,
        managed_by: ManagedBy,
        ignore: &BTreeSet<String>,
    ) -> ValidationResult<()> {
        let requested = payload
            .id
            .clone()
            .ok_or_else(|| ValidationFatal::invalid("update_source requires a source id"))?;
        let id = self.resolve_source_id(&requested);
        let Some(source) = self.ds.source(&id) else {
            return self.skip_or_fail(ValidationFatal::SourceNotFound(id));
        };
        let current = source.origin.clone();
        self.ds.validate_can_be_managed(
            &ComponentRef::new(ComponentType::DataSource, &id),
            managed_by,
        )?;

        let touches_config = payload.connection_id.is_some()
            || payload.source_type.is_some()
            || payload.parameters.is_some();
        let new_spec = if touches_config {
            let mut spec = current.clone();
            if let Some(conn_id) = &payload.connection_id {
                if Some(conn_id.as_str()) != current.conn_id() {
                    let connection = self.lookup_connection(conn_id)?;
                    self.connectors
                        .permissions
                        .check_read_permission(&[conn_id.clone()])?;
                    spec.connection_ref = Some(ConnectionRef::new(conn_id));
                    spec.conn_type = Some(connection.conn_type);
                }
            }
            if let Some(source_type) = payload.source_type {
                spec.source_type = source_type;
            }
            if let Some(parameters) = payload.parameters {
                spec.parameters = parameters;
            }
            Some(spec)
        } else {
            None
        };

        self.apply_source_update(&id, payload.title, new_spec, ignore)
    }

    /// Store a title and/or configuration change, re-probing when the
    /// configuration actually changed. Sources in `ignore` do not count
    /// toward the capability check.
    pub(super) fn apply_source_update(
        &mut self,
        id: &str,
        title: Option<String>,
        new_spec: Option<DataSourceSpec>,
        ignore: &BTreeSet<String>,
    ) -> ValidationResult<()> {
        let Some(source) = self.ds.source(id) else {
            return Err(StoreError::not_found(ComponentType::DataSource, id).into());
        };
        let old_title = source.title.clone();
        let old_schema = source.raw_schema().map(<[SchemaColumn]>::to_vec);
        let reprobe = new_spec.as_ref().is_some_and(|spec| {
            spec.source_type != source.origin.source_type
                || spec.connection_ref != source.origin.connection_ref
                || spec.parameters != source.origin.parameters
        });

        if let Some(spec) = new_spec.as_ref().filter(|_| reprobe) {
            let mut ignore = ignore.clone();
            ignore.insert(id.to_string());
            self.ensure_can_be_added(spec.conn_id(), &spec.source_type, &ignore)?;
        }

        DatasetEditor::new(self.ds).update_data_source(id, title.clone(), new_spec)?;
        if let Some(title) = title.filter(|title| *title != old_title) {
            self.validate_title(ComponentType::DataSource, id, Some(&old_title), Some(&title));
        }
        self.mark_affected(ComponentType::DataSource, id);

        if reprobe {
            self.ds
                .error_registry
                .remove_errors(id, ErrorFilter::Code(codes::CONNECTION_NOT_FOUND));
            self.refresh_data_source(id, old_schema, false)?;
        }
        Ok(())
    }

    pub(super) fn delete_source(
        &mut self,
        requested: &str,
        managed_by: ManagedBy,
    ) -> ValidationResult<()> {
        let id = self.resolve_source_id(requested);
        let Some(source) = self.ds.source(&id) else {
            return self.skip_or_fail(ValidationFatal::SourceNotFound(id));
        };
        let source_title = source.title.clone();
        self.ds.validate_can_be_managed(
            &ComponentRef::new(ComponentType::DataSource, &id),
            managed_by,
        )?;

        let avatar_ids: BTreeSet<String> = self
            .ds
            .avatars_for_source(&id)
            .iter()
            .map(|a| a.id.clone())
            .collect();
        let direct: BTreeSet<String> = self
            .ds
            .direct_fields_for_avatars(&avatar_ids)
            .iter()
            .map(|f| f.id.clone())
            .collect();
        let mut doomed = direct.clone();
        for field_id in &direct {
            doomed.extend(self.ds.lineage.all_downstream(field_id));
        }
        debug!(source = %id, avatars = avatar_ids.len(), fields = doomed.len(), "deleting source");

        let relation_ids: Vec<String> = self
            .ds
            .relations
            .iter()
            .filter(|r| avatar_ids.iter().any(|a| r.touches(a)))
            .map(|r| r.id.clone())
            .collect();
        for relation_id in relation_ids {
            DatasetEditor::new(self.ds).remove_avatar_relation(&relation_id)?;
            self.ds.error_registry.remove_pack(&relation_id);
        }

        self.remove_filters_for_fields(&doomed)?;

        let doomed_fields: Vec<Field> = self
            .ds
            .result_schema
            .iter()
            .filter(|f| doomed.contains(&f.id))
            .cloned()
            .collect();
        self.check_field_count(-(doomed_fields.len() as isize))?;
        for field in &doomed_fields {
            self.update_field(Some(field.clone()), None, None, false, true)?;
        }
        for field in &doomed_fields {
            self.propagate_to_dependents(field, None)?;
        }

        for avatar_id in &avatar_ids {
            let title = self.ds.avatar(avatar_id).map(|a| a.title.clone());
            DatasetEditor::new(self.ds).remove_avatar(avatar_id)?;
            self.formula.unregister_avatar(avatar_id);
            self.ds.error_registry.remove_pack(avatar_id);
            self.validate_title(ComponentType::SourceAvatar, avatar_id, title.as_deref(), None);
        }

        DatasetEditor::new(self.ds).remove_data_source_collection(&id)?;
        self.ds.error_registry.remove_pack(&id);
        self.validate_title(ComponentType::DataSource, &id, Some(&source_title), None);
        Ok(())
    }

    pub(super) fn refresh_source(
        &mut self,
        requested: &str,
        force_update_fields: bool,
        managed_by: ManagedBy,
    ) -> ValidationResult<()> {
        let id = self.resolve_source_id(requested);
        let Some(source) = self.ds.source(&id) else {
            return self.skip_or_fail(ValidationFatal::SourceNotFound(id));
        };
        let old_schema = source.raw_schema().map(<[SchemaColumn]>::to_vec);
        self.ds.validate_can_be_managed(
            &ComponentRef::new(ComponentType::DataSource, &id),
            managed_by,
        )?;
        self.refresh_data_source(&id, old_schema, force_update_fields)
    }

    /// Drop the obligatory filters bound to any of `field_ids`.
    pub(super) fn remove_filters_for_fields(
        &mut self,
        field_ids: &BTreeSet<String>,
    ) -> ValidationResult<()> {
        let filter_ids: Vec<String> = self
            .ds
            .obligatory_filters
            .iter()
            .filter(|f| field_ids.contains(&f.field_id))
            .map(|f| f.id.clone())
            .collect();
        for filter_id in filter_ids {
            DatasetEditor::new(self.ds).remove_obligatory_filter(&filter_id)?;
            self.ds.error_registry.remove_pack(&filter_id);
        }
        Ok(())
    }

    // ========================================================================
    // Probing
    // ========================================================================

    /// Probe a source and store what it reports.
    ///
    /// Probe failures become errors on the source. Direct fields are
    /// reconciled when the schema differs from `old_schema`, when an avatar's
    /// direct-field count no longer matches the column count, or on `force`.
    pub(super) fn refresh_data_source(
        &mut self,
        id: &str,
        old_schema: Option<Vec<SchemaColumn>>,
        force: bool,
    ) -> ValidationResult<()> {
        let Some(source) = self.ds.source(id) else {
            return Err(StoreError::not_found(ComponentType::DataSource, id).into());
        };
        let spec = source.origin.clone();
        let avatar_ids: BTreeSet<String> = self
            .ds
            .avatars_for_source(id)
            .iter()
            .map(|a| a.id.clone())
            .collect();

        self.ds
            .error_registry
            .remove_errors(id, ErrorFilter::CodePrefix(codes::DB));
        self.mark_affected(ComponentType::DataSource, id);

        let (info, version) = match probe_source(self.connectors.probe.as_ref(), &spec) {
            Ok(Some(found)) => found,
            Ok(None) => {
                self.register_error(
                    ComponentType::DataSource,
                    id,
                    ComponentError::new(
                        codes::DB_SOURCE_DOES_NOT_EXIST,
                        format!("source '{}' does not exist", id),
                    ),
                );
                return Ok(());
            }
            Err(e) => {
                warn!(source = %id, error = %e, "probe failed");
                let mut error = ComponentError::new(codes::DB, e.to_string());
                error.code.push(e.code_suffix().to_string());
                self.register_error(ComponentType::DataSource, id, error);
                return Ok(());
            }
        };

        if info.schema.is_empty() {
            self.register_error(
                ComponentType::DataSource,
                id,
                ComponentError::new(codes::DB_SCHEMA_EMPTY, format!("source '{}' has no columns", id)),
            );
            return Ok(());
        }

        let new_schema = info.schema.clone();
        DatasetEditor::new(self.ds).update_raw_schema(id, info.schema, info.indexes, version)?;

        let old_schema = old_schema.unwrap_or_default();
        let count_mismatch = avatar_ids.iter().any(|avatar_id| {
            let single = BTreeSet::from([avatar_id.clone()]);
            self.ds.direct_fields_for_avatars(&single).len() != new_schema.len()
        });
        if old_schema != new_schema || count_mismatch || force {
            debug!(source = %id, count_mismatch, force, "reconciling direct fields");
            self.update_direct_fields_for_updated_raw_schema(
                &avatar_ids,
                &old_schema,
                &new_schema,
                false,
            )?;
        }
        Ok(())
    }

    // ========================================================================
    // Reconciliation
    // ========================================================================

    /// Bring the direct fields of `avatar_ids` in line with a new schema.
    ///
    /// Columns are matched by title, so a physical rename keeps the field.
    /// Fields whose column vanished are deleted only with `do_delete`.
    /// Columns without a field get a fresh one.
    pub(super) fn update_direct_fields_for_updated_raw_schema(
        &mut self,
        avatar_ids: &BTreeSet<String>,
        old_schema: &[SchemaColumn],
        new_schema: &[SchemaColumn],
        do_delete: bool,
    ) -> ValidationResult<()> {
        let old_by_name: BTreeMap<&str, &SchemaColumn> =
            old_schema.iter().map(|c| (c.name.as_str(), c)).collect();
        let mut new_by_title: BTreeMap<&str, &SchemaColumn> = BTreeMap::new();
        for column in new_schema {
            new_by_title.entry(column.title.as_str()).or_insert(column);
        }
        let new_by_name: BTreeMap<&str, &SchemaColumn> =
            new_schema.iter().map(|c| (c.name.as_str(), c)).collect();

        let mut updates: Vec<(Field, Option<Field>)> = Vec::new();
        for field in self.ds.direct_fields_for_avatars(avatar_ids) {
            let column = field.source().unwrap_or_default();
            let target = old_by_name
                .get(column)
                .and_then(|old| new_by_title.get(old.title.as_str()))
                .or_else(|| new_by_name.get(column));
            match target {
                Some(target) if target.name != column => {
                    let mut renamed = field.clone();
                    if let CalcSpec::Direct { source, .. } = &mut renamed.calc_spec {
                        *source = target.name.clone();
                    }
                    updates.push((field.clone(), Some(renamed)));
                }
                None if do_delete => updates.push((field.clone(), None)),
                _ => updates.push((field.clone(), Some(field.clone()))),
            }
        }

        let deleted = updates.iter().filter(|(_, new)| new.is_none()).count();
        if deleted > 0 {
            self.check_field_count(-(deleted as isize))?;
        }

        for (old, _) in &updates {
            self.formula.uncache_field(&old.id);
        }
        for (old, new) in &updates {
            self.update_field(Some(old.clone()), new.clone(), None, false, false)?;
        }

        let mut propagated = BTreeSet::new();
        for (old, new) in &updates {
            if !propagated.insert(old.id.clone()) {
                continue;
            }
            let stored = new.as_ref().and_then(|new| self.ds.field(&new.id)).cloned();
            if stored.as_ref() != Some(old) {
                self.propagate_to_dependents(old, stored.as_ref())?;
            }
        }

        for avatar_id in avatar_ids {
            self.add_fields_for_new_columns(avatar_id)?;
        }
        Ok(())
    }

    /// Create direct fields for the avatar's columns that have none.
    fn add_fields_for_new_columns(&mut self, avatar_id: &str) -> ValidationResult<()> {
        let Some(schema) = self
            .ds
            .raw_schema_for_avatar(avatar_id)
            .map(<[SchemaColumn]>::to_vec)
        else {
            return Ok(());
        };
        let single = BTreeSet::from([avatar_id.to_string()]);
        let bound: BTreeSet<String> = self
            .ds
            .direct_fields_for_avatars(&single)
            .iter()
            .filter_map(|f| f.source().map(str::to_string))
            .collect();

        for column in schema.iter().filter(|c| !bound.contains(&c.name)) {
            let title = self.unique_field_title(&column.title);
            let mut field = Field::new(
                new_component_id(),
                title,
                CalcSpec::direct(column.name.clone(), Some(avatar_id.to_string())),
            );
            field.description = column.description.clone();
            field.hidden = column.user_type == UserDataType::Unsupported;

            self.check_field_count(1)?;
            self.update_field(None, Some(field), None, true, false)?;
        }
        Ok(())
    }

    /// `base`, or `"base (n)"` with the smallest free `n`.
    fn unique_field_title(&self, base: &str) -> String {
        if self.ds.field_by_title(base).is_none() {
            return base.to_string();
        }
        (1..)
            .map(|n| format!("{} ({})", base, n))
            .find(|candidate| self.ds.field_by_title(candidate).is_none())
            .unwrap_or_else(|| base.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::{BackendError, Connectors};
    use crate::formula::FormulaCompiler;
    use crate::model::Dataset;
    use crate::testing::{orders_columns, DatasetBuilder, InMemoryConnectors};
    use crate::validator::ValidatorOptions;
    use serde_json::json;

    fn run(
        ds: &mut Dataset,
        connectors: &InMemoryConnectors,
        f: impl FnOnce(&mut DatasetValidator<'_>),
    ) {
        let mut compiler = FormulaCompiler::new();
        let connectors: Connectors = connectors.into_connectors();
        let mut validator =
            DatasetValidator::new(ds, &mut compiler, &connectors, ValidatorOptions::default());
        f(&mut validator);
        validator.flush_affected();
    }

    fn source_payload(id: &str, table: &str) -> SourcePayload {
        SourcePayload {
            id: Some(id.into()),
            title: Some(table.into()),
            connection_id: Some("c1".into()),
            source_type: Some("PG_TABLE".into()),
            parameters: Some([("table_name".to_string(), json!(table))].into()),
        }
    }

    #[test]
    fn test_add_source_stores_probe_results() {
        let connectors = InMemoryConnectors::orders();
        let mut ds = Dataset::new("ds");
        run(&mut ds, &connectors, |v| {
            v.add_source(source_payload("s1", "orders"), ManagedBy::User)
                .unwrap();
        });

        let source = ds.source("s1").unwrap();
        assert_eq!(source.raw_schema().map(|s| s.len()), Some(4));
        assert_eq!(source.origin.conn_type.as_deref(), Some("postgresql"));
        assert!(source.valid);
    }

    #[test]
    fn test_add_source_dedup_remaps_id() {
        let connectors = InMemoryConnectors::orders();
        let mut ds = DatasetBuilder::orders().build();
        run(&mut ds, &connectors, |v| {
            v.add_source(source_payload("s_copy", "orders"), ManagedBy::User)
                .unwrap();
            assert_eq!(v.resolve_source_id("s_copy"), "s1");
        });
        assert_eq!(ds.sources.len(), 1);
    }

    #[test]
    fn test_unknown_connection_is_fatal() {
        let connectors = InMemoryConnectors::orders();
        let mut ds = Dataset::new("ds");
        run(&mut ds, &connectors, |v| {
            let mut payload = source_payload("s1", "orders");
            payload.connection_id = Some("nope".into());
            let result = v.add_source(payload, ManagedBy::User);
            assert!(matches!(result, Err(ValidationFatal::UnknownConnection { .. })));
        });
    }

    #[test]
    fn test_missing_table_registers_error() {
        let connectors = InMemoryConnectors::orders();
        let mut ds = Dataset::new("ds");
        run(&mut ds, &connectors, |v| {
            v.add_source(source_payload("s1", "ghost"), ManagedBy::User)
                .unwrap();
        });
        assert!(ds
            .error_registry
            .has_error("s1", codes::DB_SOURCE_DOES_NOT_EXIST));
        assert!(!ds.source("s1").unwrap().valid);
    }

    #[test]
    fn test_backend_error_code_suffix() {
        let connectors = InMemoryConnectors::orders()
            .backend_error("orders", BackendError::database("42P01", "relation missing"));
        let mut ds = Dataset::new("ds");
        run(&mut ds, &connectors, |v| {
            v.add_source(source_payload("s1", "orders"), ManagedBy::User)
                .unwrap();
        });
        let errors = ds.error_registry.errors_for("s1");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code_str(), "ERR.DS_API.DB.42P01");
    }

    #[test]
    fn test_refresh_keeps_field_identity_on_column_rename() {
        let connectors = InMemoryConnectors::orders();
        let mut ds = DatasetBuilder::orders().build();
        let mut renamed = orders_columns();
        renamed[1] = SchemaColumn::new("amount_total", "numeric", UserDataType::Float)
            .with_title("amount");
        connectors.set_table("orders", renamed);

        run(&mut ds, &connectors, |v| {
            v.refresh_source("s1", false, ManagedBy::User).unwrap();
        });

        assert_eq!(ds.result_schema.len(), 4);
        let field = ds.field("amount").unwrap();
        assert_eq!(field.source(), Some("amount_total"));
        assert_eq!(field.title, "Amount");
        assert!(field.valid);
    }

    #[test]
    fn test_refresh_adds_new_columns_with_unique_titles() {
        let connectors = InMemoryConnectors::orders();
        let mut ds = DatasetBuilder::orders().build();
        let mut columns = orders_columns();
        columns.push(SchemaColumn::new("amount_raw", "numeric", UserDataType::Float).with_title("Amount"));
        columns.push(SchemaColumn::new("blob", "bytea", UserDataType::Unsupported));
        connectors.set_table("orders", columns);

        run(&mut ds, &connectors, |v| {
            v.refresh_source("s1", false, ManagedBy::User).unwrap();
        });

        assert_eq!(ds.result_schema.len(), 6);
        let added = ds.result_schema[4].clone();
        assert_eq!(added.title, "Amount (1)");
        assert!(!added.hidden);
        assert!(ds.result_schema[5].hidden);
    }

    #[test]
    fn test_vanished_column_kept_with_error() {
        let connectors = InMemoryConnectors::orders();
        let mut ds = DatasetBuilder::orders().build();
        let columns: Vec<SchemaColumn> = orders_columns()
            .into_iter()
            .filter(|c| c.name != "status")
            .collect();
        connectors.set_table("orders", columns);

        run(&mut ds, &connectors, |v| {
            v.refresh_source("s1", false, ManagedBy::User).unwrap();
        });

        assert!(ds.field("status").is_some());
        assert!(ds
            .error_registry
            .has_error("status", codes::FIELD_COLUMN_NOT_FOUND));
    }

    #[test]
    fn test_delete_source_cascades() {
        let connectors = InMemoryConnectors::orders();
        let mut ds = DatasetBuilder::orders().build();
        run(&mut ds, &connectors, |v| {
            v.delete_source("s1", ManagedBy::User).unwrap();
        });
        assert!(ds.sources.is_empty());
        assert!(ds.avatars.is_empty());
        assert!(ds.result_schema.is_empty());
        assert!(ds.error_registry.is_empty());
    }
}
