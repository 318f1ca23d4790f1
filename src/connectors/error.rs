//! Errors reported by external collaborators.

use thiserror::Error;

/// Result type for source probes.
pub type ProbeResult<T> = Result<T, BackendError>;

/// A source probe could not reach or use the backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Network or driver level failure.
    #[error("backend unreachable: {0}")]
    Unreachable(String),

    /// The source parameters do not describe a usable object.
    #[error("source misconfigured: {0}")]
    Misconfigured(String),

    /// The database rejected the introspection query.
    #[error("database error {code}: {message}")]
    Database { code: String, message: String },
}

impl BackendError {
    pub fn database(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Database {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Last segment of the component error code this failure maps to.
    pub fn code_suffix(&self) -> &str {
        match self {
            BackendError::Unreachable(_) => "UNREACHABLE",
            BackendError::Misconfigured(_) => "MISCONFIGURED",
            BackendError::Database { code, .. } => code,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionLookupError {
    #[error("connection '{0}' not found")]
    NotFound(String),

    #[error("connection registry unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("read access denied for connection '{conn_id}'")]
pub struct PermissionDenied {
    pub conn_id: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MigrationError {
    /// The old source cannot be expressed for the new connector.
    #[error("migration impossible: {0}")]
    MigrationImpossible(String),
}
