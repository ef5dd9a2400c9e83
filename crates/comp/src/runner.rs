//! Job execution seam of the comp.

use std::time::Duration;

use async_trait::async_trait;

use gantry_core::IdPair;

/// Errors produced by a job run.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// The tool process failed or produced an unusable result.
    #[error("Job execution failed: {0}")]
    Failed(String),
}

/// Executes one job to completion.
///
/// The comp runtime drives the protocol; implementations only run the
/// actual tool. Cancellation is handled outside the runner by aborting
/// the surrounding task.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self, id_pair: IdPair) -> Result<(), RunError>;
}

/// Runner that sleeps for a fixed duration instead of executing a tool.
///
/// Used by the single-process launcher and by tests.
pub struct SimulatedRunner {
    duration: Duration,
}

impl SimulatedRunner {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

#[async_trait]
impl JobRunner for SimulatedRunner {
    async fn run(&self, id_pair: IdPair) -> Result<(), RunError> {
        tracing::debug!(job = %id_pair, "Simulating job execution");
        tokio::time::sleep(self.duration).await;
        Ok(())
    }
}
