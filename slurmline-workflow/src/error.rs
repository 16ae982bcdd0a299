//! Error types for the execution core

use slurmline_core::domain::job::JobId;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for workflow operations
pub type Result<T> = std::result::Result<T, WorkflowError>;

/// Provisioning step that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionStep {
    Clone,
    CheckEnvironment,
    CreateEnvironment,
    Install,
}

impl fmt::Display for ProvisionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProvisionStep::Clone => write!(f, "clone"),
            ProvisionStep::CheckEnvironment => write!(f, "environment check"),
            ProvisionStep::CreateEnvironment => write!(f, "environment creation"),
            ProvisionStep::Install => write!(f, "install"),
        }
    }
}

/// Errors from the environment provisioner
#[derive(Debug, Error)]
pub enum EnvironmentError {
    /// Environment setup failed; partial state has been rolled back
    #[error("Provisioning failed during {step}: {message}")]
    Provisioning { step: ProvisionStep, message: String },

    /// A command run inside an environment exited non-zero
    #[error("Command `{command}` failed: exit_code={exit_code}, stdout='{stdout}', stderr='{stderr}'")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stdout: String,
        stderr: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EnvironmentError {
    pub fn provisioning(step: ProvisionStep, message: impl Into<String>) -> Self {
        Self::Provisioning {
            step,
            message: message.into(),
        }
    }
}

/// Errors from the batch scheduler interface
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The scheduler rejected the submission or its acknowledgment could not be parsed
    #[error("Submission failed: {0}")]
    Submission(String),

    #[error("Queue query failed: {0}")]
    Query(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of a unit of work's own logic
#[derive(Debug, Error)]
pub enum WorkError {
    /// Recoverable failure: the node-local tmp dir is relocated for postmortem
    #[error("Work failed: {0}")]
    Failed(String),

    /// Anything else; cleanup still runs but nothing is relocated
    #[error("Unexpected work error: {0}")]
    Unexpected(String),
}

impl WorkError {
    pub fn is_recoverable(&self) -> bool {
        matches!(self, WorkError::Failed(_))
    }
}

impl From<EnvironmentError> for WorkError {
    fn from(err: EnvironmentError) -> Self {
        WorkError::Failed(err.to_string())
    }
}

impl From<StoreError> for WorkError {
    fn from(err: StoreError) -> Self {
        WorkError::Unexpected(err.to_string())
    }
}

/// Errors from the persistence collaborator
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Top-level error for one Work Unit attempt
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Environment(#[from] EnvironmentError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    Work(#[from] WorkError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The job never left the queue within the configured bound
    #[error("Tracking job {job_id} timed out after {elapsed:?}")]
    TrackingTimeout { job_id: JobId, elapsed: Duration },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid work unit state: {0}")]
    InvalidState(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WorkflowError {
    /// Whether this is a submission failure (no polling was started)
    pub fn is_submission(&self) -> bool {
        matches!(self, WorkflowError::Scheduler(SchedulerError::Submission(_)))
    }
}
