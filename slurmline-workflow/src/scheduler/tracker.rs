//! Job tracker
//!
//! Polls the scheduler at a fixed interval. A listed job maps to
//! pending/running/suspended and polling continues. A job with no row
//! (including the scheduler's "invalid job id" reply) is a terminal
//! candidate: the error stream decides between `CompletedOk` and
//! `CompletedWithErrors`. An absent error stream reads as empty.

use slurmline_core::domain::job::{
    Completion, CompletionMarker, JobId, JobState, MarkerStatus, PollOutcome,
};
use slurmline_core::domain::work_unit::{COMPLETION_MARKER_FILE, WorkUnit};
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::{ClusterBackend, INVALID_JOB_ID};
use crate::config::Config;
use crate::error::{Result, WorkflowError};

/// State column position in default `squeue` output when no header names it
const DEFAULT_STATE_COLUMN: usize = 4;

/// What reading the error stream produced
#[derive(Debug)]
pub enum ErrorStream {
    Absent,
    Empty,
    Contents(String),
    /// Transient read failure other than "not found"
    Unreadable(std::io::Error),
}

/// Reads the error-stream side channel
///
/// Tools write whatever bytes they like to stderr, so invalid UTF-8 is
/// replaced rather than treated as a read failure.
pub fn read_error_stream(path: &Path) -> ErrorStream {
    match std::fs::read(path) {
        Ok(bytes) if bytes.is_empty() => ErrorStream::Empty,
        Ok(bytes) => ErrorStream::Contents(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) if e.kind() == ErrorKind::NotFound => ErrorStream::Absent,
        Err(e) => ErrorStream::Unreadable(e),
    }
}

/// Reads the runner's completion marker, if one was written
pub fn read_marker(path: &Path) -> Option<CompletionMarker> {
    let text = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&text) {
        Ok(marker) => Some(marker),
        Err(e) => {
            warn!("Ignoring malformed completion marker {}: {}", path.display(), e);
            None
        }
    }
}

/// Classifies a job that has left the queue
pub fn classify(stream: ErrorStream, marker: Option<CompletionMarker>) -> PollOutcome {
    match stream {
        ErrorStream::Contents(contents) => PollOutcome::CompletedWithErrors(contents),
        ErrorStream::Absent | ErrorStream::Empty | ErrorStream::Unreadable(_) => match marker {
            Some(CompletionMarker {
                status: MarkerStatus::Failed,
                message,
                ..
            }) => PollOutcome::CompletedWithErrors(
                message.unwrap_or_else(|| "runner reported failure".to_string()),
            ),
            _ => PollOutcome::CompletedOk,
        },
    }
}

/// Finds the state of `job_id` in a queue listing
///
/// Returns `Unknown` when the listing has no row for the job.
pub fn parse_queue_listing(listing: &str, job_id: JobId) -> JobState {
    if listing.contains(INVALID_JOB_ID) {
        return JobState::Unknown;
    }

    let id = job_id.to_string();
    let mut state_column = DEFAULT_STATE_COLUMN;

    for line in listing.lines() {
        let columns: Vec<&str> = line.split_whitespace().collect();
        if columns.is_empty() {
            continue;
        }

        if columns.contains(&"JOBID") {
            if let Some(idx) = columns.iter().position(|c| *c == "ST" || *c == "STATE") {
                state_column = idx;
            }
            continue;
        }

        if columns[0] != id {
            continue;
        }

        debug!("Queue row for job {}: {}", job_id, line.trim());
        // A listed job is never gone, even if its row is short
        return columns
            .get(state_column)
            .map(|code| JobState::from_code(code))
            .unwrap_or_else(|| JobState::Other(String::new()));
    }

    JobState::Unknown
}

pub struct JobTracker {
    config: Arc<Config>,
    backend: Arc<dyn ClusterBackend>,
}

impl JobTracker {
    pub fn new(config: Arc<Config>, backend: Arc<dyn ClusterBackend>) -> Self {
        Self { config, backend }
    }

    /// Polls until the submitted Work Unit reaches a terminal state
    pub async fn track(&self, unit: &WorkUnit) -> Result<Completion> {
        let job_id = unit.job_id.ok_or_else(|| {
            WorkflowError::InvalidState(format!("work unit {} was never submitted", unit.id))
        })?;
        let stderr_path = unit.stderr_path.clone().ok_or_else(|| {
            WorkflowError::InvalidState(format!("work unit {} has no error stream", unit.id))
        })?;
        let marker_path = unit
            .scratch_dir
            .as_ref()
            .map(|dir| dir.join(COMPLETION_MARKER_FILE));

        let label = format!("{} {}", unit.item.subject_id(), unit.kind());
        let started = Instant::now();

        let mut interval = time::interval_at(
            Instant::now() + self.config.poll_interval,
            self.config.poll_interval,
        );
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_state: Option<JobState> = None;
        let mut ambiguity_retried = false;

        loop {
            interval.tick().await;

            let elapsed = started.elapsed();
            if elapsed >= self.config.tracking_timeout {
                warn!(
                    "{} with job id {} still not finished after {:?}, cancelling",
                    label, job_id, elapsed
                );
                if let Err(e) = self.backend.cancel(job_id).await {
                    warn!("Failed to cancel job {}: {}", job_id, e);
                }
                return Err(WorkflowError::TrackingTimeout { job_id, elapsed });
            }

            debug!("Checking status of job {}", job_id);
            let outcome = self
                .poll_once(job_id, &stderr_path, marker_path.as_deref(), &mut ambiguity_retried)
                .await;

            match outcome {
                PollOutcome::StillRunning(state) => {
                    if last_state.as_ref() != Some(&state) {
                        info!("{} with job id {} is {}", label, job_id, state);
                        last_state = Some(state);
                    } else {
                        debug!("{} with job id {} is still {}", label, job_id, state);
                    }
                }
                PollOutcome::CompletedOk => {
                    info!("{} with job id {} has COMPLETED WITH NO ERRORS", label, job_id);
                    return Ok(Completion::Ok);
                }
                PollOutcome::CompletedWithErrors(detail) => {
                    warn!(
                        "{} with job id {} has COMPLETED WITH ERRORS/WARNINGS:\n{}",
                        label, job_id, detail
                    );
                    return Ok(Completion::WithErrors(detail));
                }
            }
        }
    }

    /// Performs one poll of the scheduler and, if the job is gone, the side channel
    pub async fn poll_once(
        &self,
        job_id: JobId,
        stderr_path: &Path,
        marker_path: Option<&Path>,
        ambiguity_retried: &mut bool,
    ) -> PollOutcome {
        let listing = match self.backend.query(job_id).await {
            Ok(listing) => listing,
            Err(e) => {
                warn!("Failed to query job {}: {}", job_id, e);
                return PollOutcome::StillRunning(JobState::Unknown);
            }
        };

        let state = parse_queue_listing(&listing, job_id);
        if state != JobState::Unknown {
            return PollOutcome::StillRunning(state);
        }

        let stream = match read_error_stream(stderr_path) {
            ErrorStream::Unreadable(e) if !*ambiguity_retried => {
                warn!(
                    "Job {} left the queue but {} is unreadable ({}), retrying next poll",
                    job_id,
                    stderr_path.display(),
                    e
                );
                *ambiguity_retried = true;
                return PollOutcome::StillRunning(JobState::Unknown);
            }
            ErrorStream::Unreadable(e) => {
                warn!(
                    "{} still unreadable ({}), treating as empty",
                    stderr_path.display(),
                    e
                );
                ErrorStream::Empty
            }
            ErrorStream::Absent => {
                info!("No error file found at {}", stderr_path.display());
                ErrorStream::Absent
            }
            stream => stream,
        };

        let marker = marker_path.and_then(read_marker);
        if marker.is_none() {
            debug!("No completion marker for job {}", job_id);
        }

        classify(stream, marker)
    }
}
