//! The action engine.
//!
//! A [`DatasetValidator`] borrows one dataset for the duration of a batch and
//! applies actions to it in order:
//!
//! ```text
//! actions ──► [parameter-first sort] ──► [apply each] ──► [flush valid flags] ──► [orphan sweep]
//!                                             │
//!                                             ├── components::DatasetEditor   (structure)
//!                                             ├── formula::FormulaService     (types, errors, refs)
//!                                             ├── semantic::FieldLineage      (dependency graph)
//!                                             └── connectors::*               (probes, ACL, migration)
//! ```
//!
//! Problems local to a component land in the dataset's error registry and
//! the batch continues. A [`ValidationFatal`] aborts the batch; the caller
//! must then discard the dataset, as it may be partially modified.

pub mod action;
mod avatars;
mod checks;
mod connection;
pub mod error;
mod fields;
mod filters;
mod sources;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub use action::{
    Action, AvatarPayload, CloneFieldPayload, ConnectionReplacement, FieldPayload,
    ObligatoryFilterPayload, RelationPayload, SourcePayload,
};
pub use error::{ValidationFatal, ValidationResult};

use crate::components::ComponentRef;
use crate::config::Settings;
use crate::connectors::Connectors;
use crate::formula::{FormulaError, FormulaService};
use crate::model::{ComponentError, ComponentType, Dataset, ErrorRegistry, Field, ManagedBy};

/// Which API surface drives the validator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidatorMode {
    /// Full dataset editing.
    #[default]
    ControlApi,
    /// Ad-hoc field edits made while querying; structure is read-only.
    DataApi,
}

impl std::fmt::Display for ValidatorMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidatorMode::ControlApi => write!(f, "control_api"),
            ValidatorMode::DataApi => write!(f, "data_api"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorOptions {
    pub mode: ValidatorMode,
    /// Missing or duplicate targets become fatal instead of being skipped.
    pub strict: bool,
    /// Actor on whose behalf the batch runs.
    pub by: ManagedBy,
    pub field_count_soft: usize,
    pub field_count_hard: usize,
}

impl Default for ValidatorOptions {
    fn default() -> Self {
        Self {
            mode: ValidatorMode::ControlApi,
            strict: false,
            by: ManagedBy::User,
            field_count_soft: 1200,
            field_count_hard: 1500,
        }
    }
}

impl ValidatorOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            strict: settings.validator.strict,
            field_count_soft: settings.limits.field_count_soft,
            field_count_hard: settings.limits.field_count_hard,
            ..Default::default()
        }
    }

    pub fn with_mode(mut self, mode: ValidatorMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_caller(mut self, by: ManagedBy) -> Self {
        self.by = by;
        self
    }

    pub fn with_field_limits(mut self, soft: usize, hard: usize) -> Self {
        self.field_count_soft = soft;
        self.field_count_hard = hard;
        self
    }
}

/// The dataset after a batch, with every outstanding problem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub dataset: Dataset,
    pub errors: ErrorRegistry,
}

/// Applies actions to one dataset.
pub struct DatasetValidator<'a> {
    ds: &'a mut Dataset,
    formula: &'a mut dyn FormulaService,
    connectors: &'a Connectors,
    options: ValidatorOptions,
    /// Components whose `valid` flag must be recomputed at batch end.
    affected: BTreeSet<ComponentRef>,
    /// Submitted source id -> existing source with the same configuration.
    remapped_source_ids: BTreeMap<String, String>,
}

impl<'a> DatasetValidator<'a> {
    pub fn new(
        ds: &'a mut Dataset,
        formula: &'a mut dyn FormulaService,
        connectors: &'a Connectors,
        options: ValidatorOptions,
    ) -> Self {
        Self {
            ds,
            formula,
            connectors,
            options,
            affected: BTreeSet::new(),
            remapped_source_ids: BTreeMap::new(),
        }
    }

    pub fn dataset(&self) -> &Dataset {
        self.ds
    }

    pub fn options(&self) -> &ValidatorOptions {
        &self.options
    }

    pub fn outcome(&self) -> BatchOutcome {
        BatchOutcome {
            dataset: self.ds.clone(),
            errors: self.ds.error_registry.clone(),
        }
    }

    // ========================================================================
    // Batch
    // ========================================================================

    /// Apply a batch of actions.
    pub fn apply_batch(&mut self, mut actions: Vec<Action>) -> ValidationResult<()> {
        // Stable: parameter adds move to the front, everything else keeps its order.
        actions.sort_by_key(|action| !action.is_parameter_add());

        info!(dataset = %self.ds.id, actions = actions.len(), mode = %self.options.mode, "applying batch");

        if self.options.mode == ValidatorMode::ControlApi {
            self.update_unpatched_fields()?;
        }

        for action in actions {
            self.apply_action(action)?;
        }

        self.flush_affected();
        self.sweep_orphan_errors();

        info!(
            dataset = %self.ds.id,
            fields = self.ds.result_schema.len(),
            errors = self.ds.error_registry.len(),
            "batch applied"
        );
        Ok(())
    }

    /// Apply a single action without the batch bookkeeping.
    pub fn apply_action(&mut self, action: Action) -> ValidationResult<()> {
        debug!(action = action.name(), "applying action");

        let managed_by = action.managed_by();
        if managed_by != self.options.by {
            return Err(ValidationFatal::NotManageable {
                action: managed_by,
                by: self.options.by,
            });
        }
        if self.options.mode == ValidatorMode::DataApi && !action.is_field_action() {
            return Err(ValidationFatal::NotAllowedInMode {
                action: action.name(),
                mode: self.options.mode,
            });
        }

        match action {
            Action::AddField {
                field,
                order_index,
                managed_by,
            } => self.add_field(field, order_index, managed_by),
            Action::UpdateField {
                field,
                new_id,
                managed_by,
            } => self.update_field_action(field, new_id, managed_by),
            Action::DeleteField { id, managed_by } => self.delete_field(&id, managed_by),
            Action::CloneField {
                from_id,
                field,
                order_index,
                managed_by,
            } => self.clone_field(&from_id, field, order_index, managed_by),
            Action::AddSource { source, managed_by } => self.add_source(source, managed_by),
            Action::UpdateSource { source, managed_by } => {
                self.update_source(source, managed_by, &BTreeSet::new())
            }
            Action::DeleteSource { id, managed_by } => self.delete_source(&id, managed_by),
            Action::RefreshSource {
                id,
                force_update_fields,
                managed_by,
            } => self.refresh_source(&id, force_update_fields, managed_by),
            Action::AddAvatar {
                avatar,
                disable_fields_update,
                managed_by,
            } => self.add_avatar(avatar, disable_fields_update, managed_by),
            Action::UpdateAvatar {
                avatar,
                disable_fields_update,
                managed_by,
            } => self.update_avatar(avatar, disable_fields_update, managed_by),
            Action::DeleteAvatar {
                id,
                disable_fields_update,
                managed_by,
            } => self.delete_avatar(&id, disable_fields_update, managed_by),
            Action::AddRelation {
                relation,
                managed_by,
            } => self.add_relation(relation, managed_by),
            Action::UpdateRelation {
                relation,
                managed_by,
            } => self.update_relation(relation, managed_by),
            Action::DeleteRelation { id, managed_by } => self.delete_relation(&id, managed_by),
            Action::ReplaceConnection { connection, .. } => {
                self.replace_connection(&connection.id, &connection.new_id)
            }
            Action::AddObligatoryFilter {
                obligatory_filter,
                managed_by,
            } => self.add_obligatory_filter(obligatory_filter, managed_by),
            Action::UpdateObligatoryFilter {
                obligatory_filter,
                managed_by,
            } => self.update_obligatory_filter(obligatory_filter, managed_by),
            Action::DeleteObligatoryFilter { id, managed_by } => {
                self.delete_obligatory_filter(&id, managed_by)
            }
            Action::UpdateSetting { name, value, .. } => {
                debug!(setting = ?name, value, "updating setting");
                self.ds.settings.set(name, value);
                Ok(())
            }
        }
    }

    /// Dry run: the formula errors `field` would have in this dataset.
    pub fn validate_formula(&mut self, field: &Field) -> Vec<FormulaError> {
        let mut candidate = field.clone();
        self.automanage_field(&mut candidate);
        self.formula.get_field_errors(self.ds, &candidate)
    }

    // ========================================================================
    // Bookkeeping
    // ========================================================================

    fn mark_affected(&mut self, component_type: ComponentType, id: &str) {
        self.affected.insert(ComponentRef::new(component_type, id));
    }

    fn register_error(&mut self, component_type: ComponentType, id: &str, error: ComponentError) {
        debug!(component = %component_type, id, code = %error.code_str(), "registering error");
        self.ds.error_registry.add_error(id, component_type, error);
        self.mark_affected(component_type, id);
    }

    /// Recompute `valid` for every touched component.
    fn flush_affected(&mut self) {
        for component in std::mem::take(&mut self.affected) {
            self.ds.update_validity(&component);
        }
    }

    fn resolve_source_id(&self, id: &str) -> String {
        self.remapped_source_ids
            .get(id)
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }

    /// Outcome for an action whose target is missing or already exists.
    fn skip_or_fail(&self, fatal: ValidationFatal) -> ValidationResult<()> {
        if self.options.strict {
            return Err(fatal);
        }
        warn!(reason = %fatal, "skipping action");
        Ok(())
    }
}

fn new_component_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
