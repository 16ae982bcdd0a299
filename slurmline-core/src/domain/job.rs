//! Scheduler job types
//!
//! The batch scheduler only reports a coarse state code while a job is
//! listed in its queue. Completion is inferred from the job disappearing,
//! so the poll result is modeled as a three-valued outcome rather than a
//! single status code.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Numeric job identifier assigned by the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(JobId)
    }
}

/// Scheduler-observed job state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Running,
    Suspended,
    /// The scheduler has no record of the job. Not terminal by itself.
    Unknown,
    /// A listed job with a state code we do not track
    Other(String),
}

impl JobState {
    /// Maps a Slurm `squeue` state code
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "PD" | "CF" => JobState::Pending,
            "R" | "CG" => JobState::Running,
            "S" => JobState::Suspended,
            "" => JobState::Unknown,
            other => JobState::Other(other.to_string()),
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Pending => write!(f, "PENDING"),
            JobState::Running => write!(f, "RUNNING"),
            JobState::Suspended => write!(f, "SUSPENDED"),
            JobState::Unknown => write!(f, "UNKNOWN"),
            JobState::Other(code) => write!(f, "{}", code),
        }
    }
}

/// Result of a single tracker poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    StillRunning(JobState),
    CompletedOk,
    /// Carries the exact error-stream contents
    CompletedWithErrors(String),
}

impl PollOutcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PollOutcome::StillRunning(_))
    }

    /// Converts a terminal outcome into a completion
    pub fn into_completion(self) -> Option<Completion> {
        match self {
            PollOutcome::StillRunning(_) => None,
            PollOutcome::CompletedOk => Some(Completion::Ok),
            PollOutcome::CompletedWithErrors(detail) => Some(Completion::WithErrors(detail)),
        }
    }
}

/// Terminal classification of a Work Unit execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Completion {
    Ok,
    WithErrors(String),
}

impl Completion {
    pub fn is_ok(&self) -> bool {
        matches!(self, Completion::Ok)
    }
}

/// Outcome recorded by the runner in the completion marker file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerStatus {
    Succeeded,
    Failed,
}

/// Completion marker written by the runner into the shared scratch directory
///
/// Lets the tracker tell "job finished" apart from "job id unknown to the
/// scheduler", which the queue listing alone cannot do.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionMarker {
    pub status: MarkerStatus,
    #[serde(default)]
    pub message: Option<String>,
    pub finished_at: chrono::DateTime<chrono::Utc>,
}

impl CompletionMarker {
    pub fn succeeded() -> Self {
        Self {
            status: MarkerStatus::Succeeded,
            message: None,
            finished_at: chrono::Utc::now(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: MarkerStatus::Failed,
            message: Some(message.into()),
            finished_at: chrono::Utc::now(),
        }
    }
}
