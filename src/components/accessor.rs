//! Read-only queries over the dataset graph.

use std::collections::{BTreeMap, BTreeSet};

use crate::model::{
    AvatarRelation, ComponentType, Dataset, Field, ObligatoryFilter, SchemaColumn, SourceAvatar,
    SourceParameters,
};

impl Dataset {
    pub fn root_avatar(&self) -> Option<&SourceAvatar> {
        self.avatars.iter().find(|a| a.is_root)
    }

    pub fn avatars_for_source(&self, source_id: &str) -> Vec<&SourceAvatar> {
        self.avatars
            .iter()
            .filter(|a| a.source_id == source_id)
            .collect()
    }

    /// Relations where `avatar_id` is the left-hand side.
    pub fn relations_from(&self, avatar_id: &str) -> Vec<&AvatarRelation> {
        self.relations
            .iter()
            .filter(|r| r.left_avatar_id == avatar_id)
            .collect()
    }

    /// Relations where `avatar_id` is the right-hand side.
    pub fn relations_to(&self, avatar_id: &str) -> Vec<&AvatarRelation> {
        self.relations
            .iter()
            .filter(|r| r.right_avatar_id == avatar_id)
            .collect()
    }

    pub fn relations_touching(&self, avatar_id: &str) -> Vec<&AvatarRelation> {
        self.relations
            .iter()
            .filter(|r| r.touches(avatar_id))
            .collect()
    }

    /// Direct fields bound to any of the given avatars, in schema order.
    pub fn direct_fields_for_avatars(&self, avatar_ids: &BTreeSet<String>) -> Vec<&Field> {
        self.result_schema
            .iter()
            .filter(|f| f.avatar_id().is_some_and(|a| avatar_ids.contains(a)))
            .collect()
    }

    pub fn obligatory_filter_for_field(&self, field_id: &str) -> Option<&ObligatoryFilter> {
        self.obligatory_filters
            .iter()
            .find(|f| f.field_id == field_id)
    }

    /// Origin raw schema of the source behind an avatar.
    pub fn raw_schema_for_avatar(&self, avatar_id: &str) -> Option<&[SchemaColumn]> {
        let avatar = self.avatar(avatar_id)?;
        self.source(&avatar.source_id)?.raw_schema()
    }

    /// Existing source reading the same object through the same connection.
    pub fn find_data_source_configuration(
        &self,
        conn_id: &str,
        source_type: &str,
        parameters: &SourceParameters,
    ) -> Option<&str> {
        self.sources
            .iter()
            .find(|s| s.origin.matches_configuration(conn_id, source_type, parameters))
            .map(|s| s.id.as_str())
    }

    /// First user-managed source not in `ignore`.
    pub fn single_data_source_id(&self, ignore: &BTreeSet<String>) -> Option<&str> {
        self.sources
            .iter()
            .find(|s| !ignore.contains(&s.id) && s.managed_by == crate::model::ManagedBy::User)
            .map(|s| s.id.as_str())
    }

    /// Map of field title to field id.
    pub fn titles_to_ids(&self) -> BTreeMap<String, String> {
        self.result_schema
            .iter()
            .map(|f| (f.title.clone(), f.id.clone()))
            .collect()
    }

    /// Map of field id to field title.
    pub fn ids_to_titles(&self) -> BTreeMap<String, String> {
        self.result_schema
            .iter()
            .map(|f| (f.id.clone(), f.title.clone()))
            .collect()
    }

    /// Kind of the component currently holding `id`, if any.
    pub fn kind_of_id(&self, id: &str) -> Option<ComponentType> {
        if self.source(id).is_some() {
            Some(ComponentType::DataSource)
        } else if self.avatar(id).is_some() {
            Some(ComponentType::SourceAvatar)
        } else if self.relation(id).is_some() {
            Some(ComponentType::AvatarRelation)
        } else if self.field(id).is_some() {
            Some(ComponentType::Field)
        } else if self.obligatory_filter(id).is_some() {
            Some(ComponentType::ObligatoryFilter)
        } else {
            None
        }
    }

    /// Fields whose formula mentions `field` by title or id.
    pub fn dependent_fields(&self, field: &Field) -> Vec<&Field> {
        self.result_schema
            .iter()
            .filter(|candidate| candidate.id != field.id && candidate.depends_on(field))
            .collect()
    }

    /// Whether following stored formula text from `refs` leads back to
    /// `field_id`.
    ///
    /// The lineage drops the edges of a field rejected as recursive; the text
    /// keeps them, so every member of a loop is found.
    pub fn formula_text_reaches(&self, refs: &BTreeSet<String>, field_id: &str) -> bool {
        let mut stack: Vec<&str> = refs.iter().map(String::as_str).collect();
        let mut seen = BTreeSet::new();
        while let Some(id) = stack.pop() {
            if id == field_id {
                return true;
            }
            if !seen.insert(id) {
                continue;
            }
            let Some(field) = self.field(id) else {
                continue;
            };
            stack.extend(
                self.result_schema
                    .iter()
                    .filter(|candidate| field.depends_on(candidate))
                    .map(|candidate| candidate.id.as_str()),
            );
        }
        false
    }
}
