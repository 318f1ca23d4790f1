//! Type-erased view over the component kinds.
//!
//! Generic operations (existence, ownership checks, validity updates,
//! iteration by kind) work on a [`ComponentRef`] instead of matching on each
//! collection at every call site.

use serde::{Deserialize, Serialize};

use super::error::{StoreError, StoreResult};
use crate::model::{
    AvatarRelation, ComponentType, DataSourceCollection, Dataset, Field, ManagedBy,
    ObligatoryFilter, SourceAvatar, TopLevelComponentId,
};

/// Address of a component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentRef {
    pub component_type: ComponentType,
    pub id: String,
}

impl ComponentRef {
    pub fn new(component_type: ComponentType, id: impl Into<String>) -> Self {
        Self {
            component_type,
            id: id.into(),
        }
    }

    pub fn field(id: impl Into<String>) -> Self {
        Self::new(ComponentType::Field, id)
    }
}

impl std::fmt::Display for ComponentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.component_type, self.id)
    }
}

/// Borrowed view of any component.
#[derive(Debug, Clone, Copy)]
pub enum Component<'a> {
    DataSource(&'a DataSourceCollection),
    SourceAvatar(&'a SourceAvatar),
    AvatarRelation(&'a AvatarRelation),
    Field(&'a Field),
    ObligatoryFilter(&'a ObligatoryFilter),
}

impl<'a> Component<'a> {
    pub fn id(&self) -> &'a str {
        match self {
            Component::DataSource(c) => &c.id,
            Component::SourceAvatar(c) => &c.id,
            Component::AvatarRelation(c) => &c.id,
            Component::Field(c) => &c.id,
            Component::ObligatoryFilter(c) => &c.id,
        }
    }

    pub fn component_type(&self) -> ComponentType {
        match self {
            Component::DataSource(_) => ComponentType::DataSource,
            Component::SourceAvatar(_) => ComponentType::SourceAvatar,
            Component::AvatarRelation(_) => ComponentType::AvatarRelation,
            Component::Field(_) => ComponentType::Field,
            Component::ObligatoryFilter(_) => ComponentType::ObligatoryFilter,
        }
    }

    /// Title, for the kinds that have a title namespace.
    pub fn title(&self) -> Option<&'a str> {
        match self {
            Component::DataSource(c) => Some(&c.title),
            Component::SourceAvatar(c) => Some(&c.title),
            Component::Field(c) => Some(&c.title),
            Component::AvatarRelation(_) | Component::ObligatoryFilter(_) => None,
        }
    }

    pub fn managed_by(&self) -> ManagedBy {
        match self {
            Component::DataSource(c) => c.managed_by,
            Component::SourceAvatar(c) => c.managed_by,
            Component::AvatarRelation(c) => c.managed_by,
            Component::Field(c) => c.managed_by,
            Component::ObligatoryFilter(c) => c.managed_by,
        }
    }

    pub fn valid(&self) -> bool {
        match self {
            Component::DataSource(c) => c.valid,
            Component::SourceAvatar(c) => c.valid,
            Component::AvatarRelation(c) => c.valid,
            Component::Field(c) => c.valid,
            Component::ObligatoryFilter(c) => c.valid,
        }
    }

    pub fn to_ref(&self) -> ComponentRef {
        ComponentRef::new(self.component_type(), self.id())
    }
}

impl Dataset {
    /// Look up a component by kind and id.
    pub fn get_component(&self, kind: ComponentType, id: &str) -> StoreResult<Component<'_>> {
        let found = match kind {
            ComponentType::DataSource => self.source(id).map(Component::DataSource),
            ComponentType::SourceAvatar => self.avatar(id).map(Component::SourceAvatar),
            ComponentType::AvatarRelation => self.relation(id).map(Component::AvatarRelation),
            ComponentType::Field => self.field(id).map(Component::Field),
            ComponentType::ObligatoryFilter => {
                self.obligatory_filter(id).map(Component::ObligatoryFilter)
            }
            ComponentType::ResultSchema => None,
        };
        found.ok_or_else(|| StoreError::not_found(kind, id))
    }

    /// Whether an error pack addressed at `(kind, id)` still has an owner.
    pub fn component_exists(&self, kind: ComponentType, id: &str) -> bool {
        match kind {
            ComponentType::ResultSchema => id == TopLevelComponentId::ResultSchema.as_str(),
            _ => self.get_component(kind, id).is_ok(),
        }
    }

    /// Iterate all components of one kind.
    pub fn iter_components(
        &self,
        kind: ComponentType,
    ) -> Box<dyn Iterator<Item = Component<'_>> + '_> {
        match kind {
            ComponentType::DataSource => Box::new(self.sources.iter().map(Component::DataSource)),
            ComponentType::SourceAvatar => {
                Box::new(self.avatars.iter().map(Component::SourceAvatar))
            }
            ComponentType::AvatarRelation => {
                Box::new(self.relations.iter().map(Component::AvatarRelation))
            }
            ComponentType::Field => Box::new(self.result_schema.iter().map(Component::Field)),
            ComponentType::ObligatoryFilter => Box::new(
                self.obligatory_filters
                    .iter()
                    .map(Component::ObligatoryFilter),
            ),
            ComponentType::ResultSchema => Box::new(std::iter::empty()),
        }
    }

    /// Reject changes to a component owned by a different actor.
    ///
    /// A component that does not exist yet can be managed by anyone.
    pub fn validate_can_be_managed(&self, component: &ComponentRef, by: ManagedBy) -> StoreResult<()> {
        let Ok(existing) = self.get_component(component.component_type, &component.id) else {
            return Ok(());
        };
        let managed_by = existing.managed_by();
        if managed_by != by {
            return Err(StoreError::NotManageable {
                kind: component.component_type,
                id: component.id.clone(),
                managed_by,
                by,
            });
        }
        Ok(())
    }

    /// Write the `valid` flag of a component; missing components are ignored.
    pub fn set_component_valid(&mut self, component: &ComponentRef, valid: bool) {
        let id = component.id.as_str();
        match component.component_type {
            ComponentType::DataSource => {
                if let Some(c) = self.source_mut(id) {
                    c.valid = valid;
                }
            }
            ComponentType::SourceAvatar => {
                if let Some(c) = self.avatar_mut(id) {
                    c.valid = valid;
                }
            }
            ComponentType::AvatarRelation => {
                if let Some(c) = self.relation_mut(id) {
                    c.valid = valid;
                }
            }
            ComponentType::Field => {
                if let Some(c) = self.field_mut(id) {
                    c.valid = valid;
                }
            }
            ComponentType::ObligatoryFilter => {
                if let Some(c) = self.obligatory_filter_mut(id) {
                    c.valid = valid;
                }
            }
            ComponentType::ResultSchema => {}
        }
    }

    /// Recompute `valid` from the error registry.
    pub fn update_validity(&mut self, component: &ComponentRef) {
        let valid = self.error_registry.is_valid(&component.id);
        self.set_component_valid(component, valid);
    }
}
