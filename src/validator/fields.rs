//! Field recomputation and the field actions.
//!
//! Every field change goes through [`DatasetValidator::update_field`], which
//! re-derives the field and then walks its dependents depth-first:
//!
//! ```text
//! update_field(old, new)
//!   └── recompute (store, derive, errors, title, lineage)
//!         └── changed? ──► push dependents (title/id renamed in their formulas)
//!                            └── recompute ...
//! ```
//!
//! A field already on the current path is not visited again, so reference
//! loops terminate; the loop itself is reported as a recursion error.

use std::collections::{BTreeMap, BTreeSet};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::action::{CloneFieldPayload, FieldPayload};
use super::error::{ValidationFatal, ValidationResult};
use super::{new_component_id, DatasetValidator, ValidatorMode};
use crate::components::{ComponentRef, DatasetEditor};
use crate::model::{
    codes, filters_by_type, AggregationFunction, CalcSpec, ComponentError, ComponentType,
    ErrorFilter, Field, ManagedBy, TopLevelComponentId, UserDataType,
};

static FIELD_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_\-]{1,36}$").unwrap());

/// One pending recomputation.
struct WorkItem {
    old: Option<Field>,
    new: Option<Field>,
    order_index: Option<usize>,
    explicit: bool,
    /// Fields recomputed on the way here.
    path: BTreeSet<String>,
}

impl<'a> DatasetValidator<'a> {
    // ========================================================================
    // Recompute engine
    // ========================================================================

    /// Add (`old` is `None`), delete (`new` is `None`) or update a field.
    ///
    /// With `recursive`, every field whose formula mentions the changed one
    /// is recomputed as well. `explicit` marks a change the caller asked for,
    /// as opposed to one made to keep dependents consistent.
    pub(super) fn update_field(
        &mut self,
        old: Option<Field>,
        new: Option<Field>,
        order_index: Option<usize>,
        recursive: bool,
        explicit: bool,
    ) -> ValidationResult<()> {
        let item = WorkItem {
            old,
            new,
            order_index,
            explicit,
            path: BTreeSet::new(),
        };
        self.run_worklist(vec![item], recursive)
    }

    /// Recompute the fields that reference a field already recomputed.
    ///
    /// `new` is `None` when the field was deleted.
    pub(super) fn propagate_to_dependents(
        &mut self,
        old: &Field,
        new: Option<&Field>,
    ) -> ValidationResult<()> {
        let path = BTreeSet::from([old.id.clone()]);
        let items = self.dependent_work(Some(old), new, &path);
        self.run_worklist(items, true)
    }

    fn run_worklist(&mut self, items: Vec<WorkItem>, recursive: bool) -> ValidationResult<()> {
        let mut stack: Vec<WorkItem> = items.into_iter().rev().collect();
        while let Some(item) = stack.pop() {
            let Some(id) = item.new.as_ref().or(item.old.as_ref()).map(|f| f.id.clone()) else {
                continue;
            };
            let result = self.recompute_field(&item)?;

            let changed = match (&item.old, &result) {
                (Some(old), Some(new)) => old != new,
                _ => true,
            };
            if !recursive || !changed {
                continue;
            }

            let mut path = item.path.clone();
            path.insert(id);
            let dependents = self.dependent_work(item.old.as_ref(), result.as_ref(), &path);
            stack.extend(dependents.into_iter().rev());
        }
        Ok(())
    }

    /// Work items for the fields that reference `old` or `new`.
    fn dependent_work(
        &self,
        old: Option<&Field>,
        new: Option<&Field>,
        path: &BTreeSet<String>,
    ) -> Vec<WorkItem> {
        let mut seen = BTreeSet::new();
        let mut dependents: Vec<Field> = Vec::new();
        for field in [old, new].into_iter().flatten() {
            for dependent in self.ds.dependent_fields(field) {
                if !path.contains(&dependent.id) && seen.insert(dependent.id.clone()) {
                    dependents.push(dependent.clone());
                }
            }
        }

        let title_map: BTreeMap<String, String> = match (old, new) {
            (Some(old), Some(new)) if old.title != new.title => {
                [(old.title.clone(), new.title.clone())].into()
            }
            _ => BTreeMap::new(),
        };
        let id_map: BTreeMap<String, String> = match (old, new) {
            (Some(old), Some(new)) if old.id != new.id => [(old.id.clone(), new.id.clone())].into(),
            _ => BTreeMap::new(),
        };

        dependents
            .into_iter()
            .map(|dependent| {
                let mut updated = dependent.clone();
                if let CalcSpec::Formula {
                    formula,
                    guid_formula,
                } = &mut updated.calc_spec
                {
                    if !title_map.is_empty() {
                        *formula = self
                            .formula
                            .rename_in_formula(formula.as_str(), &title_map);
                    }
                    if !id_map.is_empty() {
                        *guid_formula = self
                            .formula
                            .rename_in_formula(guid_formula.as_str(), &id_map);
                    }
                }
                WorkItem {
                    old: Some(dependent),
                    new: Some(updated),
                    order_index: None,
                    explicit: false,
                    path: path.clone(),
                }
            })
            .collect()
    }

    /// Apply one change and re-derive everything attached to the field.
    ///
    /// Returns the field as stored afterwards, `None` once deleted.
    fn recompute_field(&mut self, item: &WorkItem) -> ValidationResult<Option<Field>> {
        let id = match (&item.old, &item.new) {
            (_, Some(new)) => new.id.clone(),
            (Some(old), None) => old.id.clone(),
            (None, None) => return Ok(None),
        };
        debug!(field = %id, explicit = item.explicit, "recomputing field");

        self.ds.error_registry.remove_pack(&id);
        self.formula.uncache_field(&id);

        let result = match (&item.old, &item.new) {
            (Some(old), None) => {
                self.formula.unregister_field(old);
                DatasetEditor::new(self.ds).remove_field(&old.id)?;
                None
            }
            (None, Some(new)) => {
                // Stored first so that self-references resolve.
                DatasetEditor::new(self.ds).add_field(new.clone(), item.order_index)?;
                self.formula.register_field(new);
                let updated = self.autoupdate_field(new.clone(), item.explicit);
                DatasetEditor::new(self.ds).replace_field(updated.clone())?;
                Some(updated)
            }
            (Some(old), Some(new)) => {
                if old.id != new.id {
                    self.formula.unregister_field(old);
                    let index = self.ds.field_index(&old.id);
                    let mut editor = DatasetEditor::new(self.ds);
                    editor.remove_field(&old.id)?;
                    editor.add_field(new.clone(), index)?;
                    editor.retarget_obligatory_filters(&old.id, &new.id);
                    self.ds.error_registry.remove_pack(&old.id);
                    self.ds.lineage.rename_field(&old.id, &new.id);
                    self.formula.register_field(new);
                } else {
                    DatasetEditor::new(self.ds).replace_field(new.clone())?;
                    self.formula.update_field(new);
                }
                let updated = self.autoupdate_field(new.clone(), item.explicit);
                if &updated != new {
                    DatasetEditor::new(self.ds).replace_field(updated.clone())?;
                }
                Some(updated)
            }
            (None, None) => None,
        };

        if let (Some(old), Some(new)) = (&item.old, &result) {
            if old.cast != new.cast {
                self.revalidate_filter_for_field(new);
            }
        }

        if let Some(field) = &result {
            let errors = self.formula.get_field_errors(self.ds, field);
            for error in errors {
                self.register_error(ComponentType::Field, &id, error.to_component_error());
            }
            self.mark_affected(ComponentType::Field, &id);
        }

        self.validate_title(
            ComponentType::Field,
            &id,
            item.old.as_ref().map(|f| f.title.as_str()),
            result.as_ref().map(|f| f.title.as_str()),
        );

        match &result {
            None => self.ds.lineage.clear_direct_references(&id),
            Some(field) => {
                let refs = self.formula.get_referenced_fields(self.ds, field);
                if self.ds.lineage.would_create_cycle(&field.id, &refs)
                    || self.ds.formula_text_reaches(&refs, &field.id)
                {
                    self.register_error(
                        ComponentType::Field,
                        &id,
                        ComponentError::new(
                            codes::FORMULA_RECURSION,
                            format!("field '{}' references itself", field.title),
                        ),
                    );
                    self.ds.lineage.clear_direct_references(&id);
                } else {
                    self.ds.lineage.set_direct_references(&id, refs);
                }
            }
        }

        Ok(result)
    }

    /// Fill in the parts of a field that follow from its other attributes.
    pub(super) fn automanage_field(&self, field: &mut Field) {
        match &mut field.calc_spec {
            CalcSpec::Direct { avatar_id, .. } => {
                if avatar_id.is_none() {
                    *avatar_id = self.ds.root_avatar().map(|a| a.id.clone());
                }
            }
            CalcSpec::Formula {
                formula,
                guid_formula,
            } => {
                if !formula.trim().is_empty() {
                    *guid_formula = self
                        .formula
                        .rename_in_formula(formula.as_str(), &self.ds.titles_to_ids());
                } else {
                    *formula = self
                        .formula
                        .rename_in_formula(guid_formula.as_str(), &self.ds.ids_to_titles());
                }
            }
            CalcSpec::Parameter { .. } => {}
        }

        if let CalcSpec::Direct {
            source,
            avatar_id: Some(avatar_id),
        } = &field.calc_spec
        {
            let (auto, lock) = self
                .ds
                .raw_schema_for_avatar(avatar_id)
                .and_then(|schema| schema.iter().find(|c| &c.name == source))
                .map_or((false, false), |c| {
                    (c.has_auto_aggregation, c.lock_aggregation)
                });
            field.has_auto_aggregation = auto;
            field.lock_aggregation = lock;
        }
    }

    /// Automanage, then derive types and aggregation.
    fn autoupdate_field(&mut self, mut field: Field, explicit: bool) -> Field {
        self.automanage_field(&mut field);

        let previous_initial = field.initial_data_type;
        let mut derived = self.formula.derive(self.ds, &field);
        match previous_initial {
            None => {
                if field.cast.is_none() {
                    field.cast = Some(derived.initial_data_type);
                }
            }
            // A cast that only mirrored the old type follows the new one.
            Some(previous)
                if previous != derived.initial_data_type && field.cast == Some(previous) =>
            {
                field.cast = Some(derived.initial_data_type);
                derived = self.formula.derive(self.ds, &field);
            }
            Some(_) => {}
        }

        field.initial_data_type = Some(derived.initial_data_type);
        field.data_type = Some(derived.data_type);
        field.has_auto_aggregation = derived.has_auto_aggregation;
        field.field_type = derived.field_type;

        if explicit && field.has_auto_aggregation && field.aggregation != AggregationFunction::None
        {
            debug!(field = %field.id, "dropping aggregation of auto-aggregated field");
            field.aggregation = AggregationFunction::None;
            field.data_type = Some(field.cast.unwrap_or(derived.initial_data_type));
        }
        field
    }

    /// Recheck the obligatory filter on `field` against its current type.
    fn revalidate_filter_for_field(&mut self, field: &Field) {
        let Some(filter) = self.ds.obligatory_filter_for_field(&field.id) else {
            return;
        };
        let filter_id = filter.id.clone();
        let data_type = field
            .cast
            .or(field.data_type)
            .unwrap_or(UserDataType::Unsupported);
        let allowed = filters_by_type(data_type);
        let unsupported: Vec<_> = filter
            .operations()
            .filter(|op| !allowed.contains(op))
            .collect();

        self.ds.error_registry.remove_errors(
            &filter_id,
            ErrorFilter::Code(codes::FILTER_UNSUPPORTED_OPERATION),
        );
        for operation in unsupported {
            self.register_error(
                ComponentType::ObligatoryFilter,
                &filter_id,
                ComponentError::new(
                    codes::FILTER_UNSUPPORTED_OPERATION,
                    format!(
                        "operation {} is not supported for type {}",
                        operation, data_type
                    ),
                )
                .with_detail("operation", operation.to_string()),
            );
        }
        self.mark_affected(ComponentType::ObligatoryFilter, &filter_id);
    }

    /// Re-derive fields that have never been typed, references first.
    pub(super) fn update_unpatched_fields(&mut self) -> ValidationResult<()> {
        let unpatched: BTreeSet<String> = self
            .ds
            .result_schema
            .iter()
            .filter(|f| f.initial_data_type.is_none())
            .map(|f| f.id.clone())
            .collect();
        if unpatched.is_empty() {
            return Ok(());
        }
        debug!(count = unpatched.len(), "updating unpatched fields");

        let mut order: Vec<String> = self
            .ds
            .lineage
            .evaluation_order()
            .unwrap_or_default()
            .into_iter()
            .filter(|id| unpatched.contains(id))
            .collect();
        let ordered: BTreeSet<String> = order.iter().cloned().collect();
        // Fields outside the graph reference nothing, so they can go first.
        let rest: Vec<String> = self
            .ds
            .result_schema
            .iter()
            .filter(|f| unpatched.contains(&f.id) && !ordered.contains(&f.id))
            .map(|f| f.id.clone())
            .collect();
        order.splice(0..0, rest);

        for id in order {
            let field = self.ds.field(&id).cloned();
            self.update_field(field.clone(), field, None, false, false)?;
        }
        Ok(())
    }

    // ========================================================================
    // Actions
    // ========================================================================

    pub(super) fn add_field(
        &mut self,
        payload: FieldPayload,
        order_index: Option<usize>,
        managed_by: ManagedBy,
    ) -> ValidationResult<()> {
        let id = payload.id.clone().unwrap_or_else(new_component_id);
        if self.ds.field(&id).is_some() {
            return self.skip_or_fail(ValidationFatal::IdCollision {
                id,
                kind: ComponentType::Field,
            });
        }
        self.validate_new_id(&id)?;
        self.check_field_count(1)?;

        let field = payload.to_new_field(&id, managed_by)?;
        self.update_field(None, Some(field), order_index, true, true)
    }

    pub(super) fn update_field_action(
        &mut self,
        payload: FieldPayload,
        new_id: Option<String>,
        managed_by: ManagedBy,
    ) -> ValidationResult<()> {
        let id = payload
            .id
            .clone()
            .ok_or_else(|| ValidationFatal::invalid("update_field requires a field id"))?;
        let Some(old) = self.ds.field(&id).cloned() else {
            return self.skip_or_fail(ValidationFatal::FieldNotFound(id));
        };
        self.ds
            .validate_can_be_managed(&ComponentRef::field(&id), managed_by)?;

        let mut new = payload.apply_to(&old)?;
        if let Some(new_id) = new_id.filter(|new_id| *new_id != id) {
            if !FIELD_ID_RE.is_match(&new_id) {
                return Err(ValidationFatal::invalid(format!(
                    "'{}' is not a valid field id",
                    new_id
                )));
            }
            self.validate_new_id(&new_id)?;
            new.id = new_id;
        }

        if new == old {
            debug!(field = %id, "field unchanged");
            return Ok(());
        }
        self.update_field(Some(old), Some(new), None, true, true)
    }

    pub(super) fn delete_field(&mut self, id: &str, managed_by: ManagedBy) -> ValidationResult<()> {
        let Some(old) = self.ds.field(id).cloned() else {
            return self.skip_or_fail(ValidationFatal::FieldNotFound(id.to_string()));
        };
        self.ds
            .validate_can_be_managed(&ComponentRef::field(id), managed_by)?;
        if let Some(filter) = self.ds.obligatory_filter_for_field(id) {
            return Err(ValidationFatal::invalid(format!(
                "field '{}' is used by obligatory filter '{}'",
                id, filter.id
            )));
        }
        self.check_field_count(-1)?;
        self.update_field(Some(old), None, None, true, true)
    }

    pub(super) fn clone_field(
        &mut self,
        from_id: &str,
        payload: CloneFieldPayload,
        order_index: Option<usize>,
        managed_by: ManagedBy,
    ) -> ValidationResult<()> {
        if managed_by != ManagedBy::User {
            return Err(ValidationFatal::invalid("only user fields can be cloned"));
        }
        let Some(original) = self.ds.field(from_id).cloned() else {
            return self.skip_or_fail(ValidationFatal::FieldNotFound(from_id.to_string()));
        };

        let id = payload.id.unwrap_or_else(new_component_id);
        if self.ds.field(&id).is_some() {
            return self.skip_or_fail(ValidationFatal::IdCollision {
                id,
                kind: ComponentType::Field,
            });
        }
        self.validate_new_id(&id)?;
        let title = payload
            .title
            .ok_or_else(|| ValidationFatal::invalid("cloned field requires a title"))?;
        self.check_field_count(1)?;

        let mut field = original;
        field.id = id;
        field.title = title;
        field.managed_by = ManagedBy::User;
        field.valid = true;
        if let Some(cast) = payload.cast {
            field.cast = Some(cast);
        }
        if let Some(aggregation) = payload.aggregation {
            field.aggregation = aggregation;
        }
        self.update_field(None, Some(field), order_index, true, true)
    }

    /// Enforce the field-count limits for a change of `diff` fields.
    ///
    /// Past the soft limit the result schema carries a warning; growing past
    /// the hard limit is fatal.
    pub(super) fn check_field_count(&mut self, diff: isize) -> ValidationResult<()> {
        if self.options.mode == ValidatorMode::DataApi {
            return Ok(());
        }
        let count = self.ds.result_schema.len().saturating_add_signed(diff);
        if diff > 0 && count > self.options.field_count_hard {
            return Err(ValidationFatal::TooManyFields {
                count,
                limit: self.options.field_count_hard,
            });
        }

        let schema_id = TopLevelComponentId::ResultSchema.as_str();
        self.ds
            .error_registry
            .remove_errors(schema_id, ErrorFilter::Code(codes::TOO_MANY_FIELDS));
        if count > self.options.field_count_soft {
            self.ds.error_registry.add_error(
                schema_id,
                ComponentType::ResultSchema,
                ComponentError::warning(
                    codes::TOO_MANY_FIELDS,
                    format!(
                        "dataset has {} fields, more than the recommended {}",
                        count, self.options.field_count_soft
                    ),
                )
                .with_detail("limit", self.options.field_count_soft),
            );
        }
        Ok(())
    }
}
