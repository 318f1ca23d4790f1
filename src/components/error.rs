//! Structural errors raised by the component store.

use thiserror::Error;

use crate::model::{ComponentType, ManagedBy};

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// A mutation would leave the dataset graph inconsistent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{kind} with id '{id}' already exists")]
    DuplicateId { kind: ComponentType, id: String },

    #[error("{kind} with id '{id}' not found")]
    NotFound { kind: ComponentType, id: String },

    #[error("source '{source_id}' is still used by avatars: {}", .avatar_ids.join(", "))]
    SourceHasAvatars {
        source_id: String,
        avatar_ids: Vec<String>,
    },

    #[error("avatar '{avatar_id}' is still used by relations: {}", .relation_ids.join(", "))]
    AvatarHasRelations {
        avatar_id: String,
        relation_ids: Vec<String>,
    },

    #[error("avatar '{avatar_id}' is already joined from the left")]
    AvatarAlreadyJoined { avatar_id: String },

    #[error("relation cannot join avatar '{avatar_id}' to itself")]
    SelfJoin { avatar_id: String },

    #[error("field '{field_id}' already has an obligatory filter")]
    DuplicateObligatoryFilter { field_id: String },

    #[error("{kind} '{id}' is managed by {managed_by:?} and cannot be changed by {by:?}")]
    NotManageable {
        kind: ComponentType,
        id: String,
        managed_by: ManagedBy,
        by: ManagedBy,
    },
}

impl StoreError {
    pub fn not_found(kind: ComponentType, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn duplicate(kind: ComponentType, id: impl Into<String>) -> Self {
        Self::DuplicateId {
            kind,
            id: id.into(),
        }
    }
}
