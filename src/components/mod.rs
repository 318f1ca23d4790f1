//! Component store: read accessors, structural editor, and the type-erased
//! component view.

pub mod abstraction;
pub mod accessor;
pub mod editor;
pub mod error;

pub use abstraction::{Component, ComponentRef};
pub use editor::DatasetEditor;
pub use error::{StoreError, StoreResult};
