//! Fatal validation errors.
//!
//! A fatal error aborts the whole batch. Problems local to one component are
//! never reported here; they go to the dataset's error registry instead.

use thiserror::Error;

use super::ValidatorMode;
use crate::components::StoreError;
use crate::connectors::PermissionDenied;
use crate::model::{ComponentType, ManagedBy, UserDataType, WhereClauseOperation};

/// Result type for action handlers.
pub type ValidationResult<T> = Result<T, ValidationFatal>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationFatal {
    /// The action payload is malformed or contradicts itself.
    #[error("invalid action: {0}")]
    InvalidAction(String),

    #[error("id '{0}' is reserved")]
    ReservedId(String),

    #[error("id '{id}' is already used by {kind} '{id}'")]
    IdCollision { id: String, kind: ComponentType },

    #[error("dataset would have {count} fields, the limit is {limit}")]
    TooManyFields { count: usize, limit: usize },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("action managed by {action:?} cannot be applied by {by:?}")]
    NotManageable { action: ManagedBy, by: ManagedBy },

    #[error(transparent)]
    PermissionDenied(#[from] PermissionDenied),

    #[error("unknown connection '{conn_id}': {reason}")]
    UnknownConnection { conn_id: String, reason: String },

    #[error("operation {operation} is not supported for field '{field_id}' of type {data_type}")]
    IncompatibleFilter {
        field_id: String,
        operation: WhereClauseOperation,
        data_type: UserDataType,
    },

    #[error("field '{0}' not found")]
    FieldNotFound(String),

    #[error("source '{0}' not found")]
    SourceNotFound(String),

    #[error("action '{action}' is not allowed in {mode} mode")]
    NotAllowedInMode {
        action: &'static str,
        mode: ValidatorMode,
    },

    #[error("source of type '{source_type}' on connection '{conn_id}' cannot be added to this dataset")]
    SourceCannotBeAdded { conn_id: String, source_type: String },
}

impl ValidationFatal {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidAction(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_is_transparent() {
        let fatal: ValidationFatal = StoreError::not_found(ComponentType::Field, "f1").into();
        insta::assert_snapshot!(fatal.to_string(), @"field with id 'f1' not found");
    }

    #[test]
    fn test_incompatible_filter_message() {
        let fatal = ValidationFatal::IncompatibleFilter {
            field_id: "f1".into(),
            operation: WhereClauseOperation::Startswith,
            data_type: UserDataType::Integer,
        };
        insta::assert_snapshot!(
            fatal.to_string(),
            @"operation startswith is not supported for field 'f1' of type integer"
        );
    }
}
