//! Obligatory filter actions.

use super::action::ObligatoryFilterPayload;
use super::error::{ValidationFatal, ValidationResult};
use super::{new_component_id, DatasetValidator};
use crate::components::{ComponentRef, DatasetEditor, StoreError};
use crate::model::{
    codes, filters_by_type, ComponentType, DefaultWhereClause, ErrorFilter, Field, ManagedBy,
    ObligatoryFilter, UserDataType,
};

/// Reject clauses the field's type cannot be filtered with.
fn check_filter_operations(field: &Field, clauses: &[DefaultWhereClause]) -> ValidationResult<()> {
    let data_type = field
        .cast
        .or(field.data_type)
        .unwrap_or(UserDataType::Unsupported);
    let allowed = filters_by_type(data_type);
    match clauses.iter().find(|c| !allowed.contains(&c.operation)) {
        Some(clause) => Err(ValidationFatal::IncompatibleFilter {
            field_id: field.id.clone(),
            operation: clause.operation,
            data_type,
        }),
        None => Ok(()),
    }
}

impl<'a> DatasetValidator<'a> {
    pub(super) fn add_obligatory_filter(
        &mut self,
        payload: ObligatoryFilterPayload,
        managed_by: ManagedBy,
    ) -> ValidationResult<()> {
        let field_id = payload
            .field_id
            .ok_or_else(|| ValidationFatal::invalid("obligatory filter requires a field id"))?;
        let field = self
            .ds
            .field(&field_id)
            .ok_or_else(|| ValidationFatal::FieldNotFound(field_id.clone()))?;
        let clauses = payload.default_filters.unwrap_or_default();
        check_filter_operations(field, &clauses)?;

        let id = payload.id.unwrap_or_else(new_component_id);
        self.validate_new_id(&id)?;

        let mut filter = ObligatoryFilter::new(&id, field_id, clauses);
        filter.managed_by = managed_by;
        DatasetEditor::new(self.ds).add_obligatory_filter(filter)?;
        self.mark_affected(ComponentType::ObligatoryFilter, &id);
        Ok(())
    }

    pub(super) fn update_obligatory_filter(
        &mut self,
        payload: ObligatoryFilterPayload,
        managed_by: ManagedBy,
    ) -> ValidationResult<()> {
        let id = payload
            .id
            .ok_or_else(|| ValidationFatal::invalid("update_obligatory_filter requires an id"))?;
        let Some(filter) = self.ds.obligatory_filter(&id) else {
            return self
                .skip_or_fail(StoreError::not_found(ComponentType::ObligatoryFilter, &id).into());
        };
        let field_id = filter.field_id.clone();
        let clauses = payload
            .default_filters
            .unwrap_or_else(|| filter.default_filters.clone());
        self.ds.validate_can_be_managed(
            &ComponentRef::new(ComponentType::ObligatoryFilter, &id),
            managed_by,
        )?;

        let field = self
            .ds
            .field(&field_id)
            .ok_or(ValidationFatal::FieldNotFound(field_id))?;
        check_filter_operations(field, &clauses)?;

        DatasetEditor::new(self.ds).update_obligatory_filter(&id, clauses)?;
        self.ds.error_registry.remove_errors(
            &id,
            ErrorFilter::Code(codes::FILTER_UNSUPPORTED_OPERATION),
        );
        self.mark_affected(ComponentType::ObligatoryFilter, &id);
        Ok(())
    }

    pub(super) fn delete_obligatory_filter(
        &mut self,
        id: &str,
        managed_by: ManagedBy,
    ) -> ValidationResult<()> {
        if self.ds.obligatory_filter(id).is_none() {
            return self
                .skip_or_fail(StoreError::not_found(ComponentType::ObligatoryFilter, id).into());
        }
        self.ds.validate_can_be_managed(
            &ComponentRef::new(ComponentType::ObligatoryFilter, id),
            managed_by,
        )?;
        DatasetEditor::new(self.ds).remove_obligatory_filter(id)?;
        self.ds.error_registry.remove_pack(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::Connectors;
    use crate::formula::FormulaCompiler;
    use crate::model::{Dataset, WhereClauseOperation};
    use crate::testing::{DatasetBuilder, InMemoryConnectors};
    use crate::validator::{FieldPayload, ValidatorOptions};

    fn run(ds: &mut Dataset, f: impl FnOnce(&mut DatasetValidator<'_>)) {
        let mut compiler = FormulaCompiler::new();
        let connectors: Connectors = InMemoryConnectors::orders().into_connectors();
        let mut validator =
            DatasetValidator::new(ds, &mut compiler, &connectors, ValidatorOptions::default());
        f(&mut validator);
        validator.flush_affected();
    }

    fn filter(id: &str, field_id: &str, op: WhereClauseOperation) -> ObligatoryFilterPayload {
        ObligatoryFilterPayload {
            id: Some(id.into()),
            field_id: Some(field_id.into()),
            default_filters: Some(vec![DefaultWhereClause::new(op, vec!["10".into()])]),
        }
    }

    #[test]
    fn test_incompatible_operation_is_fatal() {
        let mut ds = DatasetBuilder::orders().build();
        run(&mut ds, |v| {
            let result = v.add_obligatory_filter(
                filter("f1", "amount", WhereClauseOperation::Startswith),
                ManagedBy::User,
            );
            assert_eq!(
                result,
                Err(ValidationFatal::IncompatibleFilter {
                    field_id: "amount".into(),
                    operation: WhereClauseOperation::Startswith,
                    data_type: UserDataType::Float,
                })
            );
        });
        assert!(ds.obligatory_filters.is_empty());
    }

    #[test]
    fn test_one_filter_per_field() {
        let mut ds = DatasetBuilder::orders().build();
        run(&mut ds, |v| {
            v.add_obligatory_filter(filter("f1", "amount", WhereClauseOperation::Gt), ManagedBy::User)
                .unwrap();
            let result = v.add_obligatory_filter(
                filter("f2", "amount", WhereClauseOperation::Lt),
                ManagedBy::User,
            );
            assert!(matches!(
                result,
                Err(ValidationFatal::Store(StoreError::DuplicateObligatoryFilter { .. }))
            ));
        });
        assert_eq!(ds.obligatory_filters.len(), 1);
    }

    #[test]
    fn test_cast_change_flags_filter() {
        let mut ds = DatasetBuilder::orders().build();
        run(&mut ds, |v| {
            v.add_obligatory_filter(filter("f1", "amount", WhereClauseOperation::Gt), ManagedBy::User)
                .unwrap();
            let payload = FieldPayload {
                id: Some("amount".into()),
                cast: Some(UserDataType::Boolean),
                ..Default::default()
            };
            v.update_field_action(payload, None, ManagedBy::User).unwrap();
        });
        assert!(ds
            .error_registry
            .has_error("f1", codes::FILTER_UNSUPPORTED_OPERATION));
        assert!(!ds.obligatory_filter("f1").unwrap().valid);

        // Rewriting the clauses to something the new type allows clears it.
        run(&mut ds, |v| {
            let payload = filter("f1", "amount", WhereClauseOperation::Eq);
            v.update_obligatory_filter(payload, ManagedBy::User).unwrap();
        });
        assert!(ds.error_registry.get_pack("f1").is_none());
        assert!(ds.obligatory_filter("f1").unwrap().valid);
    }

    #[test]
    fn test_delete_filter() {
        let mut ds = DatasetBuilder::orders().build();
        run(&mut ds, |v| {
            v.add_obligatory_filter(filter("f1", "status", WhereClauseOperation::Eq), ManagedBy::User)
                .unwrap();
            v.delete_obligatory_filter("f1", ManagedBy::User).unwrap();
            assert!(v.delete_obligatory_filter("f1", ManagedBy::User).is_ok());
        });
        assert!(ds.obligatory_filters.is_empty());
    }
}
