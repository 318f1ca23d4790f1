//! # facet
//!
//! An incremental validator for BI dataset configurations.
//!
//! ## Architecture
//!
//! A dataset is a graph of sources, avatars, relations, result-schema fields
//! and obligatory filters. Clients send batches of actions; the validator
//! applies them, keeps every derived attribute consistent and records what
//! is broken in the dataset's error registry:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │            Actions (add/update/delete/refresh ...)       │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [validator]
//! ┌─────────────────────────────────────────────────────────┐
//! │   Action engine ── field recompute ── schema reconcile   │
//! │        │                  │                  │           │
//! │   [components]        [formula]        [connectors]      │
//! │   store + editor      derive/compile   probe, ACL, ...   │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │        Dataset snapshot + ErrorRegistry + valid flags    │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Fatal problems abort the batch with a [`validator::ValidationFatal`].
//! Everything else is attached to the component it concerns and leaves the
//! dataset usable.

pub mod capabilities;
pub mod components;
pub mod config;
pub mod connectors;
pub mod formula;
pub mod logging;
pub mod model;
pub mod semantic;
pub mod service;
pub mod testing;
pub mod validator;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::connectors::{
        Connection, ConnectionRegistry, ConnectorMigration, Connectors, PermissionChecker,
        SourceProbe,
    };
    pub use crate::formula::{FormulaCompiler, FormulaService};
    pub use crate::model::{
        codes, ComponentError, ComponentType, Dataset, ErrorRegistry, Field, ManagedBy,
    };
    pub use crate::service::DatasetService;
    pub use crate::validator::{
        Action, BatchOutcome, DatasetValidator, ValidationFatal, ValidatorMode, ValidatorOptions,
    };
}

pub use model::Dataset;
pub use validator::{Action, BatchOutcome, DatasetValidator, ValidationFatal};
