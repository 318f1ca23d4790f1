//! Async facade over the synchronous validator.
//!
//! ```text
//!   apply(ds_id, actions)
//!        │
//!        ├── lease(ds_id)        one batch per dataset at a time
//!        ├── permit              at most `max_blocking` batches overall
//!        └── spawn_blocking ──► DatasetValidator on a clone
//!                                    │
//!                        Ok ─────────┴───────── Err
//!                    commit clone         drop clone, store untouched
//! ```
//!
//! Probes may block inside a batch, so batches never run on the async
//! workers themselves.

use std::sync::Arc;

use dashmap::DashMap;
use futures::future::join_all;
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::connectors::Connectors;
use crate::formula::FormulaCompiler;
use crate::model::Dataset;
use crate::validator::{
    Action, BatchOutcome, DatasetValidator, ValidationFatal, ValidatorOptions,
};

/// Result type for service calls.
pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("dataset '{0}' not found")]
    DatasetNotFound(String),

    /// The batch was rejected; the stored dataset is unchanged.
    #[error(transparent)]
    Fatal(#[from] ValidationFatal),

    #[error("validation task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("service is shut down")]
    Closed,
}

/// Holds datasets and serializes batches per dataset.
pub struct DatasetService {
    datasets: DashMap<String, Dataset>,
    leases: DashMap<String, Arc<Mutex<()>>>,
    permits: Arc<Semaphore>,
    connectors: Connectors,
    options: ValidatorOptions,
}

impl DatasetService {
    pub fn new(connectors: Connectors, options: ValidatorOptions, max_blocking: usize) -> Self {
        Self {
            datasets: DashMap::new(),
            leases: DashMap::new(),
            permits: Arc::new(Semaphore::new(max_blocking.max(1))),
            connectors,
            options,
        }
    }

    pub fn from_settings(settings: &Settings, connectors: Connectors) -> Self {
        Self::new(
            connectors,
            ValidatorOptions::from_settings(settings),
            settings.service.max_blocking,
        )
    }

    /// Store a dataset, replacing any with the same id.
    pub fn insert(&self, dataset: Dataset) {
        debug!(dataset = %dataset.id, "dataset stored");
        self.datasets.insert(dataset.id.clone(), dataset);
    }

    /// Snapshot of a stored dataset.
    pub fn get(&self, dataset_id: &str) -> Option<Dataset> {
        self.datasets.get(dataset_id).map(|ds| ds.clone())
    }

    pub fn remove(&self, dataset_id: &str) -> Option<Dataset> {
        self.leases.remove(dataset_id);
        self.datasets.remove(dataset_id).map(|(_, ds)| ds)
    }

    /// Stop accepting batches. Batches already running finish.
    pub fn close(&self) {
        self.permits.close();
    }

    fn lease(&self, dataset_id: &str) -> Arc<Mutex<()>> {
        self.leases
            .entry(dataset_id.to_string())
            .or_default()
            .value()
            .clone()
    }

    /// Validate a batch against a stored dataset and commit the result.
    pub async fn apply(&self, dataset_id: &str, actions: Vec<Action>) -> ServiceResult<BatchOutcome> {
        self.run(dataset_id, actions, self.options.clone()).await
    }

    /// Like [`apply`](Self::apply), with per-call options.
    pub async fn run(
        &self,
        dataset_id: &str,
        actions: Vec<Action>,
        options: ValidatorOptions,
    ) -> ServiceResult<BatchOutcome> {
        let lease = self.lease(dataset_id);
        let _guard = lease.lock().await;
        let _permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ServiceError::Closed)?;

        let mut working = self
            .get(dataset_id)
            .ok_or_else(|| ServiceError::DatasetNotFound(dataset_id.to_string()))?;
        let connectors = self.connectors.clone();

        let result = tokio::task::spawn_blocking(move || -> Result<BatchOutcome, ValidationFatal> {
            let mut compiler = FormulaCompiler::new();
            let mut validator =
                DatasetValidator::new(&mut working, &mut compiler, &connectors, options);
            validator.apply_batch(actions)?;
            Ok(validator.outcome())
        })
        .await?;

        match result {
            Ok(outcome) => {
                info!(dataset = %dataset_id, errors = outcome.errors.len(), "batch committed");
                self.datasets
                    .insert(dataset_id.to_string(), outcome.dataset.clone());
                Ok(outcome)
            }
            Err(fatal) => {
                warn!(dataset = %dataset_id, error = %fatal, "batch rejected");
                Err(fatal.into())
            }
        }
    }

    /// Run batches for several datasets concurrently.
    ///
    /// Results come back in input order.
    pub async fn apply_many(
        &self,
        batches: Vec<(String, Vec<Action>)>,
    ) -> Vec<ServiceResult<BatchOutcome>> {
        let runs = batches
            .into_iter()
            .map(|(dataset_id, actions)| async move { self.apply(&dataset_id, actions).await });
        join_all(runs).await
    }
}

impl std::fmt::Debug for DatasetService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatasetService")
            .field("datasets", &self.datasets.len())
            .field("available_permits", &self.permits.available_permits())
            .field("options", &self.options)
            .finish()
    }
}
