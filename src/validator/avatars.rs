//! Avatar and relation actions.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use super::action::{AvatarPayload, RelationPayload};
use super::error::{ValidationFatal, ValidationResult};
use super::{new_component_id, DatasetValidator};
use crate::capabilities::DatasetCapabilities;
use crate::components::{ComponentRef, DatasetEditor, StoreError};
use crate::model::{
    codes, AvatarRelation, BinaryCondition, ComponentError, ComponentType, ConditionPart, Field,
    ManagedBy, SchemaColumn, SourceAvatar,
};

impl<'a> DatasetValidator<'a> {
    fn direct_fields_of(&self, avatar_id: &str) -> Vec<Field> {
        let single = BTreeSet::from([avatar_id.to_string()]);
        self.ds
            .direct_fields_for_avatars(&single)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Recompute an avatar's direct fields in place, without reconciling.
    fn recompute_direct_fields(&mut self, avatar_id: &str) -> ValidationResult<()> {
        for field in self.direct_fields_of(avatar_id) {
            self.update_field(Some(field.clone()), Some(field), None, true, false)?;
        }
        Ok(())
    }

    // ========================================================================
    // Avatars
    // ========================================================================

    pub(super) fn add_avatar(
        &mut self,
        payload: AvatarPayload,
        disable_fields_update: bool,
        managed_by: ManagedBy,
    ) -> ValidationResult<()> {
        let requested = payload
            .source_id
            .ok_or_else(|| ValidationFatal::invalid("add_avatar requires a source id"))?;
        let source_id = self.resolve_source_id(&requested);
        let Some(source) = self.ds.source(&source_id) else {
            return self.skip_or_fail(ValidationFatal::SourceNotFound(source_id));
        };
        let source_title = source.title.clone();

        let id = payload.id.unwrap_or_else(new_component_id);
        self.validate_new_id(&id)?;
        let title = payload.title.unwrap_or(source_title);

        let mut avatar = SourceAvatar::new(&id, &source_id, title.clone());
        avatar.managed_by = managed_by;
        DatasetEditor::new(self.ds).add_avatar(avatar.clone())?;
        self.formula.register_avatar(&avatar);
        self.validate_title(ComponentType::SourceAvatar, &id, None, Some(&title));
        self.mark_affected(ComponentType::SourceAvatar, &id);

        if !disable_fields_update {
            let new_schema = self
                .ds
                .raw_schema_for_avatar(&id)
                .map(<[SchemaColumn]>::to_vec)
                .unwrap_or_default();
            self.update_direct_fields_for_updated_raw_schema(
                &BTreeSet::from([id]),
                &[],
                &new_schema,
                false,
            )?;
        }
        Ok(())
    }

    pub(super) fn update_avatar(
        &mut self,
        payload: AvatarPayload,
        disable_fields_update: bool,
        managed_by: ManagedBy,
    ) -> ValidationResult<()> {
        let id = payload
            .id
            .ok_or_else(|| ValidationFatal::invalid("update_avatar requires an id"))?;
        let Some(avatar) = self.ds.avatar(&id) else {
            return self.skip_or_fail(StoreError::not_found(ComponentType::SourceAvatar, &id).into());
        };
        let old_title = avatar.title.clone();
        let old_source = avatar.source_id.clone();
        self.ds.validate_can_be_managed(
            &ComponentRef::new(ComponentType::SourceAvatar, &id),
            managed_by,
        )?;

        let new_source = payload
            .source_id
            .map(|s| self.resolve_source_id(&s))
            .filter(|s| *s != old_source);
        let old_schema = self
            .ds
            .raw_schema_for_avatar(&id)
            .map(<[SchemaColumn]>::to_vec)
            .unwrap_or_default();

        DatasetEditor::new(self.ds).update_avatar(&id, payload.title.clone(), new_source.clone())?;
        if let Some(title) = payload.title.filter(|t| *t != old_title) {
            self.validate_title(ComponentType::SourceAvatar, &id, Some(&old_title), Some(&title));
        }
        self.mark_affected(ComponentType::SourceAvatar, &id);

        if new_source.is_none() {
            return Ok(());
        }
        debug!(avatar = %id, from = %old_source, "avatar moved to another source");
        if disable_fields_update {
            self.recompute_direct_fields(&id)?;
        } else {
            let new_schema = self
                .ds
                .raw_schema_for_avatar(&id)
                .map(<[SchemaColumn]>::to_vec)
                .unwrap_or_default();
            self.update_direct_fields_for_updated_raw_schema(
                &BTreeSet::from([id.clone()]),
                &old_schema,
                &new_schema,
                false,
            )?;
        }

        let relation_ids: Vec<String> = self
            .ds
            .relations_touching(&id)
            .iter()
            .map(|r| r.id.clone())
            .collect();
        for relation_id in relation_ids {
            self.validate_relation(&relation_id)?;
        }
        Ok(())
    }

    /// Delete an avatar with the relations joining it in and, unless
    /// disabled, its direct fields. An avatar other avatars are joined to
    /// must have those relations removed first.
    pub(super) fn delete_avatar(
        &mut self,
        id: &str,
        disable_fields_update: bool,
        managed_by: ManagedBy,
    ) -> ValidationResult<()> {
        let Some(avatar) = self.ds.avatar(id) else {
            return self.skip_or_fail(StoreError::not_found(ComponentType::SourceAvatar, id).into());
        };
        let title = avatar.title.clone();
        self.ds.validate_can_be_managed(
            &ComponentRef::new(ComponentType::SourceAvatar, id),
            managed_by,
        )?;

        let outgoing: Vec<String> = self
            .ds
            .relations_from(id)
            .iter()
            .map(|r| r.id.clone())
            .collect();
        if !outgoing.is_empty() {
            return Err(StoreError::AvatarHasRelations {
                avatar_id: id.to_string(),
                relation_ids: outgoing,
            }
            .into());
        }

        let incoming: Vec<String> = self
            .ds
            .relations_to(id)
            .iter()
            .map(|r| r.id.clone())
            .collect();
        for relation_id in incoming {
            DatasetEditor::new(self.ds).remove_avatar_relation(&relation_id)?;
            self.ds.error_registry.remove_pack(&relation_id);
        }

        if !disable_fields_update {
            let field_ids: BTreeSet<String> =
                self.direct_fields_of(id).into_iter().map(|f| f.id).collect();
            self.remove_filters_for_fields(&field_ids)?;
        }

        let old_schema = self
            .ds
            .raw_schema_for_avatar(id)
            .map(<[SchemaColumn]>::to_vec)
            .unwrap_or_default();
        DatasetEditor::new(self.ds).remove_avatar(id)?;

        // The avatar is gone, so its fields no longer resolve.
        if disable_fields_update {
            self.recompute_direct_fields(id)?;
        } else {
            self.update_direct_fields_for_updated_raw_schema(
                &BTreeSet::from([id.to_string()]),
                &old_schema,
                &[],
                true,
            )?;
        }

        self.formula.unregister_avatar(id);
        self.ds.error_registry.remove_pack(id);
        self.validate_title(ComponentType::SourceAvatar, id, Some(&title), None);
        Ok(())
    }

    // ========================================================================
    // Relations
    // ========================================================================

    pub(super) fn add_relation(
        &mut self,
        payload: RelationPayload,
        managed_by: ManagedBy,
    ) -> ValidationResult<()> {
        let (Some(left), Some(right)) = (payload.left_avatar_id, payload.right_avatar_id) else {
            return Err(ValidationFatal::invalid(
                "add_relation requires both avatar ids",
            ));
        };
        let id = payload.id.unwrap_or_else(new_component_id);
        self.validate_new_id(&id)?;

        let conditions = match payload.conditions.filter(|c| !c.is_empty()) {
            Some(conditions) => conditions,
            None => self.auto_condition(&left, &right).into_iter().collect(),
        };

        let mut relation = AvatarRelation::new(&id, left, right);
        relation.conditions = conditions;
        relation.join_type = payload.join_type.unwrap_or_default();
        relation.required = payload.required.unwrap_or(false);
        relation.managed_by = managed_by;
        DatasetEditor::new(self.ds).add_avatar_relation(relation)?;

        self.validate_relation(&id)
    }

    pub(super) fn update_relation(
        &mut self,
        payload: RelationPayload,
        managed_by: ManagedBy,
    ) -> ValidationResult<()> {
        let id = payload
            .id
            .ok_or_else(|| ValidationFatal::invalid("update_relation requires an id"))?;
        let Some(relation) = self.ds.relation(&id) else {
            return self
                .skip_or_fail(StoreError::not_found(ComponentType::AvatarRelation, &id).into());
        };
        let (left, right) = (
            relation.left_avatar_id.clone(),
            relation.right_avatar_id.clone(),
        );
        self.ds.validate_can_be_managed(
            &ComponentRef::new(ComponentType::AvatarRelation, &id),
            managed_by,
        )?;

        let moves = payload.left_avatar_id.as_ref().is_some_and(|l| *l != left)
            || payload.right_avatar_id.as_ref().is_some_and(|r| *r != right);
        if moves {
            return Err(ValidationFatal::invalid(format!(
                "relation '{}' cannot change its avatars",
                id
            )));
        }

        let conditions = match payload.conditions {
            Some(conditions) if conditions.is_empty() => {
                Some(self.auto_condition(&left, &right).into_iter().collect())
            }
            other => other,
        };
        DatasetEditor::new(self.ds).update_avatar_relation(
            &id,
            conditions,
            payload.join_type,
            payload.required,
        )?;
        self.validate_relation(&id)
    }

    pub(super) fn delete_relation(&mut self, id: &str, managed_by: ManagedBy) -> ValidationResult<()> {
        if self.ds.relation(id).is_none() {
            return self.skip_or_fail(StoreError::not_found(ComponentType::AvatarRelation, id).into());
        }
        self.ds.validate_can_be_managed(
            &ComponentRef::new(ComponentType::AvatarRelation, id),
            managed_by,
        )?;
        DatasetEditor::new(self.ds).remove_avatar_relation(id)?;
        self.ds.error_registry.remove_pack(id);
        Ok(())
    }

    /// One equi-condition on a column name both avatars share.
    ///
    /// Left columns are tried in name order and the first one with a partner
    /// wins. For each column an exact match beats a case-insensitive one.
    fn auto_condition(&self, left: &str, right: &str) -> Option<BinaryCondition> {
        let left_schema = self.ds.raw_schema_for_avatar(left);
        let right_schema = self.ds.raw_schema_for_avatar(right);
        let (left_schema, right_schema) = match (left_schema, right_schema) {
            (Some(l), Some(r)) => (l, r),
            (l, r) => {
                let side = match (l.is_none(), r.is_none()) {
                    (true, true) => "both",
                    (true, false) => "left",
                    _ => "right",
                };
                warn!(left, right, side, "no schema, relation left without condition");
                return None;
            }
        };

        let mut left_names: Vec<&str> = left_schema.iter().map(|c| c.name.as_str()).collect();
        left_names.sort_unstable();

        let matched = left_names.iter().find_map(|name| {
            right_schema
                .iter()
                .find(|c| c.name == *name)
                .or_else(|| right_schema.iter().find(|c| c.name.eq_ignore_ascii_case(name)))
                .map(|c| (name.to_string(), c.name.clone()))
        });

        let (l, r) = matched?;
        debug!(left, right, column = %l, "generated join condition");
        Some(BinaryCondition::eq(
            ConditionPart::direct(l),
            ConditionPart::direct(r),
        ))
    }

    /// Recompute a relation's errors: condition compilation and join-type
    /// support.
    pub(super) fn validate_relation(&mut self, id: &str) -> ValidationResult<()> {
        let Some(relation) = self.ds.relation(id).cloned() else {
            return Err(StoreError::not_found(ComponentType::AvatarRelation, id).into());
        };
        self.ds.error_registry.remove_pack(id);

        for error in self.formula.compile_relation_formula(self.ds, &relation) {
            self.register_error(ComponentType::AvatarRelation, id, error.to_component_error());
        }

        let supported = DatasetCapabilities::new(self.ds, self.connectors.probe.as_ref())
            .relation_join_supported(
                &relation.left_avatar_id,
                &relation.right_avatar_id,
                relation.join_type,
            );
        if !supported {
            self.register_error(
                ComponentType::AvatarRelation,
                id,
                ComponentError::new(
                    codes::RELATION_JOIN_TYPE,
                    format!("join type {} is not supported by the sources", relation.join_type),
                )
                .with_detail("join_type", relation.join_type.to_string()),
            );
        }
        self.mark_affected(ComponentType::AvatarRelation, id);
        Ok(())
    }
}
