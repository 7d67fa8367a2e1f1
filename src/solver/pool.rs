//! Bounded pool for CPU-bound solves.
//!
//! Solves run on the blocking thread pool; a semaphore caps how many run at
//! once so a burst of markets cannot starve the async runtime.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::debug;

use super::bregman::{BregmanProjector, Projection};
use super::constraints::LinearConstraints;
use super::frank_wolfe::{ExtractionEngine, ExtractionResult};
use crate::config::{ExtractionConfig, ProjectorConfig};
use crate::error::SolverError;

/// Shared handle to the solver workers.
#[derive(Debug, Clone)]
pub struct SolverPool {
    permits: Arc<Semaphore>,
    projector: BregmanProjector,
    extraction: ExtractionEngine,
}

impl SolverPool {
    /// Create a pool allowing `workers` concurrent solves (at least one).
    pub fn new(workers: usize, projector: ProjectorConfig, extraction: ExtractionConfig) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(workers.max(1))),
            projector: BregmanProjector::new(projector),
            extraction: ExtractionEngine::new(extraction),
        }
    }

    /// Solves that may start right now.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Project `theta` on a worker.
    pub async fn project(
        &self,
        theta: Vec<f64>,
        constraints: LinearConstraints,
    ) -> Result<Projection, SolverError> {
        let projector = self.projector.clone();
        self.run(move || projector.project(&theta, &constraints))
            .await
    }

    /// Run the extraction loop on a worker.
    pub async fn extract(
        &self,
        theta: Vec<f64>,
        constraints: LinearConstraints,
    ) -> Result<ExtractionResult, SolverError> {
        let engine = self.extraction.clone();
        self.run(move || engine.run(&theta, &constraints)).await
    }

    async fn run<T, F>(&self, solve: F) -> Result<T, SolverError>
    where
        F: FnOnce() -> Result<T, SolverError> + Send + 'static,
        T: Send + 'static,
    {
        let _permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| SolverError::WorkerFailed(e.to_string()))?;

        debug!(available = self.available(), "Solver permit acquired");

        tokio::task::spawn_blocking(solve)
            .await
            .map_err(|e| SolverError::WorkerFailed(e.to_string()))?
    }
}
