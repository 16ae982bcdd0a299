//! Batch scheduler layer
//!
//! - Backend: the injected cluster interface (Slurm in production)
//! - Submitter: renders the batch script and obtains a job id
//! - Tracker: polls the queue until the job disappears and classifies it

mod slurm;
pub mod submitter;
pub mod tracker;

pub use slurm::SlurmBackend;
pub use submitter::Submitter;
pub use tracker::JobTracker;

use async_trait::async_trait;
use slurmline_core::domain::job::JobId;
use std::path::Path;

use crate::error::SchedulerError;

/// Message the scheduler prints for a job id it has no record of
pub const INVALID_JOB_ID: &str = "Invalid job id specified";

/// Cluster scheduler operations
///
/// The backend returns the scheduler's raw text; parsing lives in the
/// submitter and tracker so it can be tested without a cluster.
#[async_trait]
pub trait ClusterBackend: Send + Sync {
    /// Submits a batch script and returns the acknowledgment text
    async fn submit(&self, script: &Path) -> Result<String, SchedulerError>;

    /// Lists the queue entry for one job
    ///
    /// An unknown job id is not an error: the listing (or the scheduler's
    /// "invalid job id" message) is returned for the tracker to interpret.
    async fn query(&self, job_id: JobId) -> Result<String, SchedulerError>;

    async fn cancel(&self, job_id: JobId) -> Result<(), SchedulerError>;
}
