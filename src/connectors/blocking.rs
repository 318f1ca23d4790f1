//! Bridge from async connector clients to the synchronous probe seam.
//!
//! The validator calls probes synchronously. Hosts whose connector clients
//! are async implement [`AsyncSourceProbe`] and wrap it in a
//! [`BlockingProbe`], then run batches on tokio's blocking pool (see
//! [`crate::service`]), where blocking on the runtime handle is allowed.
//!
//! # Example
//!
//! ```ignore
//! use facet::connectors::blocking::{AsyncSourceProbe, BlockingProbe};
//!
//! let probe = BlockingProbe::new(Arc::new(MyHttpProbe::new(client)), Handle::current());
//! let connectors = Connectors::new(Arc::new(probe), registry, acl, migration);
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::runtime::Handle;

use super::error::ProbeResult;
use super::SourceProbe;
use crate::model::{DataSourceSpec, JoinType, SchemaInfo};

/// Async flavour of [`SourceProbe`].
#[async_trait]
pub trait AsyncSourceProbe: Send + Sync {
    async fn source_exists(&self, spec: &DataSourceSpec) -> ProbeResult<bool>;

    async fn get_db_info(&self, spec: &DataSourceSpec) -> ProbeResult<Option<String>>;

    async fn get_schema_info(&self, spec: &DataSourceSpec) -> ProbeResult<SchemaInfo>;

    /// Static connector capability; no I/O.
    fn supported_join_types(&self, source_type: &str) -> BTreeSet<JoinType>;
}

/// Runs an [`AsyncSourceProbe`] to completion on a runtime handle.
///
/// Must not be called from inside an async task; use it from
/// `spawn_blocking` or a plain thread.
pub struct BlockingProbe<P: ?Sized> {
    inner: Arc<P>,
    handle: Handle,
}

impl<P: AsyncSourceProbe + ?Sized> BlockingProbe<P> {
    pub fn new(inner: Arc<P>, handle: Handle) -> Self {
        Self { inner, handle }
    }
}

impl<P: AsyncSourceProbe + ?Sized> SourceProbe for BlockingProbe<P> {
    fn source_exists(&self, spec: &DataSourceSpec) -> ProbeResult<bool> {
        self.handle.block_on(self.inner.source_exists(spec))
    }

    fn get_db_info(&self, spec: &DataSourceSpec) -> ProbeResult<Option<String>> {
        self.handle.block_on(self.inner.get_db_info(spec))
    }

    fn get_schema_info(&self, spec: &DataSourceSpec) -> ProbeResult<SchemaInfo> {
        self.handle.block_on(self.inner.get_schema_info(spec))
    }

    fn supported_join_types(&self, source_type: &str) -> BTreeSet<JoinType> {
        self.inner.supported_join_types(source_type)
    }
}
