//! Structural mutations of the dataset graph.
//!
//! The editor enforces graph-shape rules (unique ids, a single root avatar,
//! at most one left relation per avatar, one obligatory filter per field)
//! and nothing else. Derived state such as field types and validation errors
//! is the validator's business.

use std::collections::BTreeSet;

use super::error::{StoreError, StoreResult};
use crate::model::{
    AvatarRelation, BinaryCondition, ComponentType, DataSourceCollection, DataSourceSpec, Dataset,
    DefaultWhereClause, Field, IndexInfo, JoinType, ObligatoryFilter, SchemaColumn, SourceAvatar,
};

pub struct DatasetEditor<'a> {
    ds: &'a mut Dataset,
}

impl<'a> DatasetEditor<'a> {
    pub fn new(ds: &'a mut Dataset) -> Self {
        Self { ds }
    }

    // =========================================================================
    // Data sources
    // =========================================================================

    pub fn add_data_source_collection(&mut self, source: DataSourceCollection) -> StoreResult<()> {
        if self.ds.source(&source.id).is_some() {
            return Err(StoreError::duplicate(ComponentType::DataSource, &source.id));
        }
        self.ds.sources.push(source);
        Ok(())
    }

    pub fn update_data_source(
        &mut self,
        id: &str,
        title: Option<String>,
        origin: Option<DataSourceSpec>,
    ) -> StoreResult<()> {
        let source = self
            .ds
            .source_mut(id)
            .ok_or_else(|| StoreError::not_found(ComponentType::DataSource, id))?;
        if let Some(title) = title {
            source.title = title;
        }
        if let Some(mut origin) = origin {
            // probe results survive a configuration edit until the next refresh
            if origin.raw_schema.is_none() {
                origin.raw_schema = source.origin.raw_schema.take();
            }
            source.origin = origin;
        }
        Ok(())
    }

    pub fn update_raw_schema(
        &mut self,
        id: &str,
        raw_schema: Vec<SchemaColumn>,
        index_info: Option<BTreeSet<IndexInfo>>,
        db_version: Option<String>,
    ) -> StoreResult<()> {
        let source = self
            .ds
            .source_mut(id)
            .ok_or_else(|| StoreError::not_found(ComponentType::DataSource, id))?;
        source.origin.raw_schema = Some(raw_schema);
        source.origin.index_info = index_info;
        if db_version.is_some() {
            source.origin.db_version = db_version;
        }
        Ok(())
    }

    pub fn remove_data_source_collection(&mut self, id: &str) -> StoreResult<()> {
        if self.ds.source(id).is_none() {
            return Err(StoreError::not_found(ComponentType::DataSource, id));
        }
        let avatar_ids: Vec<String> = self
            .ds
            .avatars_for_source(id)
            .iter()
            .map(|a| a.id.clone())
            .collect();
        if !avatar_ids.is_empty() {
            return Err(StoreError::SourceHasAvatars {
                source_id: id.to_string(),
                avatar_ids,
            });
        }
        self.ds.sources.retain(|s| s.id != id);
        Ok(())
    }

    // =========================================================================
    // Avatars
    // =========================================================================

    /// Add an avatar; the first avatar of the dataset becomes root.
    pub fn add_avatar(&mut self, mut avatar: SourceAvatar) -> StoreResult<()> {
        if self.ds.avatar(&avatar.id).is_some() {
            return Err(StoreError::duplicate(ComponentType::SourceAvatar, &avatar.id));
        }
        if self.ds.source(&avatar.source_id).is_none() {
            return Err(StoreError::not_found(
                ComponentType::DataSource,
                &avatar.source_id,
            ));
        }
        avatar.is_root = self.ds.avatars.is_empty();
        self.ds.avatars.push(avatar);
        Ok(())
    }

    pub fn update_avatar(
        &mut self,
        id: &str,
        title: Option<String>,
        source_id: Option<String>,
    ) -> StoreResult<()> {
        if let Some(source_id) = &source_id {
            if self.ds.source(source_id).is_none() {
                return Err(StoreError::not_found(ComponentType::DataSource, source_id));
            }
        }
        let avatar = self
            .ds
            .avatar_mut(id)
            .ok_or_else(|| StoreError::not_found(ComponentType::SourceAvatar, id))?;
        if let Some(title) = title {
            avatar.title = title;
        }
        if let Some(source_id) = source_id {
            avatar.source_id = source_id;
        }
        Ok(())
    }

    /// Remove an avatar that no relation uses; root moves to the first
    /// remaining avatar that is not joined from the left.
    pub fn remove_avatar(&mut self, id: &str) -> StoreResult<()> {
        let was_root = match self.ds.avatar(id) {
            Some(avatar) => avatar.is_root,
            None => return Err(StoreError::not_found(ComponentType::SourceAvatar, id)),
        };
        let relation_ids: Vec<String> = self
            .ds
            .relations_touching(id)
            .iter()
            .map(|r| r.id.clone())
            .collect();
        if !relation_ids.is_empty() {
            return Err(StoreError::AvatarHasRelations {
                avatar_id: id.to_string(),
                relation_ids,
            });
        }
        self.ds.avatars.retain(|a| a.id != id);

        if was_root {
            let candidate = self
                .ds
                .avatars
                .iter()
                .find(|a| self.ds.relations_to(&a.id).is_empty())
                .map(|a| a.id.clone());
            if let Some(candidate) = candidate {
                self.set_root_avatar(&candidate)?;
            }
        }
        Ok(())
    }

    pub fn set_root_avatar(&mut self, id: &str) -> StoreResult<()> {
        if self.ds.avatar(id).is_none() {
            return Err(StoreError::not_found(ComponentType::SourceAvatar, id));
        }
        for avatar in &mut self.ds.avatars {
            avatar.is_root = avatar.id == id;
        }
        Ok(())
    }

    // =========================================================================
    // Relations
    // =========================================================================

    /// Add a join edge; joining onto the root makes the left side root.
    pub fn add_avatar_relation(&mut self, relation: AvatarRelation) -> StoreResult<()> {
        if self.ds.relation(&relation.id).is_some() {
            return Err(StoreError::duplicate(
                ComponentType::AvatarRelation,
                &relation.id,
            ));
        }
        for avatar_id in [&relation.left_avatar_id, &relation.right_avatar_id] {
            if self.ds.avatar(avatar_id).is_none() {
                return Err(StoreError::not_found(ComponentType::SourceAvatar, avatar_id));
            }
        }
        if relation.left_avatar_id == relation.right_avatar_id {
            return Err(StoreError::SelfJoin {
                avatar_id: relation.left_avatar_id.clone(),
            });
        }
        if !self.ds.relations_to(&relation.right_avatar_id).is_empty() {
            return Err(StoreError::AvatarAlreadyJoined {
                avatar_id: relation.right_avatar_id.clone(),
            });
        }

        let right_is_root = self
            .ds
            .avatar(&relation.right_avatar_id)
            .is_some_and(|a| a.is_root);
        let left_id = relation.left_avatar_id.clone();
        self.ds.relations.push(relation);
        if right_is_root {
            self.set_root_avatar(&left_id)?;
        }
        Ok(())
    }

    pub fn update_avatar_relation(
        &mut self,
        id: &str,
        conditions: Option<Vec<BinaryCondition>>,
        join_type: Option<JoinType>,
        required: Option<bool>,
    ) -> StoreResult<()> {
        let relation = self
            .ds
            .relation_mut(id)
            .ok_or_else(|| StoreError::not_found(ComponentType::AvatarRelation, id))?;
        if let Some(conditions) = conditions {
            relation.conditions = conditions;
        }
        if let Some(join_type) = join_type {
            relation.join_type = join_type;
        }
        if let Some(required) = required {
            relation.required = required;
        }
        Ok(())
    }

    pub fn remove_avatar_relation(&mut self, id: &str) -> StoreResult<()> {
        if self.ds.relation(id).is_none() {
            return Err(StoreError::not_found(ComponentType::AvatarRelation, id));
        }
        self.ds.relations.retain(|r| r.id != id);
        Ok(())
    }

    // =========================================================================
    // Fields
    // =========================================================================

    /// Insert a field at `order_index`, or append when absent or out of range.
    pub fn add_field(&mut self, field: Field, order_index: Option<usize>) -> StoreResult<()> {
        if self.ds.field(&field.id).is_some() {
            return Err(StoreError::duplicate(ComponentType::Field, &field.id));
        }
        let len = self.ds.result_schema.len();
        let index = order_index.map_or(len, |i| i.min(len));
        self.ds.result_schema.insert(index, field);
        Ok(())
    }

    pub fn replace_field(&mut self, field: Field) -> StoreResult<()> {
        let slot = self
            .ds
            .field_mut(&field.id)
            .ok_or_else(|| StoreError::not_found(ComponentType::Field, &field.id))?;
        *slot = field;
        Ok(())
    }

    pub fn remove_field(&mut self, id: &str) -> StoreResult<Field> {
        let index = self
            .ds
            .field_index(id)
            .ok_or_else(|| StoreError::not_found(ComponentType::Field, id))?;
        Ok(self.ds.result_schema.remove(index))
    }

    // =========================================================================
    // Obligatory filters
    // =========================================================================

    pub fn add_obligatory_filter(&mut self, filter: ObligatoryFilter) -> StoreResult<()> {
        if self.ds.obligatory_filter(&filter.id).is_some() {
            return Err(StoreError::duplicate(
                ComponentType::ObligatoryFilter,
                &filter.id,
            ));
        }
        if self.ds.obligatory_filter_for_field(&filter.field_id).is_some() {
            return Err(StoreError::DuplicateObligatoryFilter {
                field_id: filter.field_id.clone(),
            });
        }
        self.ds.obligatory_filters.push(filter);
        Ok(())
    }

    pub fn update_obligatory_filter(
        &mut self,
        id: &str,
        default_filters: Vec<DefaultWhereClause>,
    ) -> StoreResult<()> {
        let filter = self
            .ds
            .obligatory_filter_mut(id)
            .ok_or_else(|| StoreError::not_found(ComponentType::ObligatoryFilter, id))?;
        filter.default_filters = default_filters;
        Ok(())
    }

    pub fn remove_obligatory_filter(&mut self, id: &str) -> StoreResult<()> {
        if self.ds.obligatory_filter(id).is_none() {
            return Err(StoreError::not_found(ComponentType::ObligatoryFilter, id));
        }
        self.ds.obligatory_filters.retain(|f| f.id != id);
        Ok(())
    }

    /// Point filters bound to `old_field_id` at `new_field_id`.
    pub fn retarget_obligatory_filters(&mut self, old_field_id: &str, new_field_id: &str) {
        for filter in &mut self.ds.obligatory_filters {
            if filter.field_id == old_field_id {
                filter.field_id = new_field_id.to_string();
            }
        }
    }
}
