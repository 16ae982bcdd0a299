//! Slurm backend
//!
//! Wraps `sbatch`, `squeue` and `scancel`.

use async_trait::async_trait;
use slurmline_core::domain::job::JobId;
use std::path::Path;
use tokio::process::Command;
use tracing::debug;

use super::{ClusterBackend, INVALID_JOB_ID};
use crate::error::SchedulerError;

#[derive(Debug, Clone, Default)]
pub struct SlurmBackend {}

impl SlurmBackend {
    pub fn new() -> Self {
        Self {}
    }
}

#[async_trait]
impl ClusterBackend for SlurmBackend {
    async fn submit(&self, script: &Path) -> Result<String, SchedulerError> {
        let output = Command::new("sbatch")
            .arg(script)
            .output()
            .await
            .map_err(|e| SchedulerError::Submission(format!("failed to run sbatch: {}", e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            return Err(SchedulerError::Submission(format!(
                "sbatch exited with {}: {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }

        debug!("sbatch stdout: {}", stdout.trim());
        Ok(stdout)
    }

    async fn query(&self, job_id: JobId) -> Result<String, SchedulerError> {
        let output = Command::new("squeue")
            .arg("-j")
            .arg(job_id.to_string())
            .output()
            .await
            .map_err(|e| SchedulerError::Query(format!("failed to run squeue: {}", e)))?;

        interpret_query(
            output.status.success(),
            output.status.code(),
            &String::from_utf8_lossy(&output.stdout),
            &String::from_utf8_lossy(&output.stderr),
        )
    }

    async fn cancel(&self, job_id: JobId) -> Result<(), SchedulerError> {
        let output = Command::new("scancel")
            .arg(job_id.to_string())
            .output()
            .await
            .map_err(|e| SchedulerError::Query(format!("failed to run scancel: {}", e)))?;

        if !output.status.success() {
            return Err(SchedulerError::Query(format!(
                "scancel exited with {}: {}",
                output.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(())
    }
}

/// Maps an `squeue` result onto a listing for the tracker
///
/// squeue exits non-zero for ids it has already purged; that reply is a
/// listing with no row, not a query failure.
fn interpret_query(
    success: bool,
    code: Option<i32>,
    stdout: &str,
    stderr: &str,
) -> Result<String, SchedulerError> {
    if success {
        return Ok(stdout.to_string());
    }

    if stderr.contains(INVALID_JOB_ID) {
        debug!("squeue: {}", stderr.trim());
        return Ok(stderr.to_string());
    }

    Err(SchedulerError::Query(format!(
        "squeue exited with {}: {}",
        code.unwrap_or(-1),
        stderr.trim()
    )))
}
