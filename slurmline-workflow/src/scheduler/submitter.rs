//! Job submitter
//!
//! Turns a prepared Work Unit into a batch script under its scratch
//! directory and submits it. The acknowledgment must end in a decimal job
//! id; anything else is a submission error.

use slurmline_core::domain::job::JobId;
use slurmline_core::domain::work_unit::{STDERR_FILE, STDOUT_FILE, WorkUnit};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use super::ClusterBackend;
use crate::config::Config;
use crate::error::{Result, SchedulerError, WorkflowError};

pub struct Submitter {
    config: Arc<Config>,
    backend: Arc<dyn ClusterBackend>,
}

impl Submitter {
    pub fn new(config: Arc<Config>, backend: Arc<dyn ClusterBackend>) -> Self {
        Self { config, backend }
    }

    /// Submits the Work Unit, recording stream paths and the job id on it
    pub async fn submit(&self, unit: &mut WorkUnit) -> Result<JobId> {
        let scratch_dir = unit.scratch_dir.clone().ok_or_else(|| {
            WorkflowError::InvalidState(format!("work unit {} has no scratch directory", unit.id))
        })?;

        let job_name = unit.job_name(self.config.max_filename_len.saturating_sub(3));
        let stdout_path = scratch_dir.join(STDOUT_FILE);
        let stderr_path = scratch_dir.join(STDERR_FILE);

        let script = render_script(unit, &job_name, &scratch_dir, &self.config);
        let script_path = scratch_dir.join(format!("{}.sh", job_name));
        std::fs::write(&script_path, script)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(&script_path)?.permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(&script_path, perms)?;
        }
        debug!("Batch script: {}", script_path.display());

        unit.stdout_path = Some(stdout_path);
        unit.stderr_path = Some(stderr_path);

        let ack = self.backend.submit(&script_path).await?;
        let job_id = parse_acknowledgment(&ack)?;
        unit.job_id = Some(job_id);

        info!(
            "{} {} submitted with job id {}",
            unit.item.subject_id(),
            unit.kind(),
            job_id
        );

        Ok(job_id)
    }
}

/// Renders the batch script that starts the runner on a compute node
pub fn render_script(unit: &WorkUnit, job_name: &str, scratch_dir: &Path, config: &Config) -> String {
    let mut lines = vec![
        "#!/bin/bash".to_string(),
        format!("#SBATCH -J {}", job_name),
        format!("#SBATCH --output={}", scratch_dir.join(STDOUT_FILE).display()),
        format!("#SBATCH --error={}", scratch_dir.join(STDERR_FILE).display()),
        "#SBATCH -n1".to_string(),
        "#SBATCH --ntasks-per-node=1".to_string(),
        format!("#SBATCH --partition={}", unit.partition),
    ];

    if let Some(mem) = unit.item.memory_mb() {
        lines.push(format!("#SBATCH --mem={}", mem));
    }

    lines.push(format!(
        "source \"{}\"",
        escape(&config.conda_base.join("etc/profile.d/conda.sh"))
    ));
    lines.push(format!("conda activate {}", config.runner_env));
    // Quoted to protect the path from the shell
    lines.push(format!(
        "\"{}\" \"{}\"",
        escape(&config.runner_command),
        escape(scratch_dir)
    ));

    lines.join("\n") + "\n"
}

/// Extracts the job id from the last token of the acknowledgment
pub fn parse_acknowledgment(ack: &str) -> std::result::Result<JobId, SchedulerError> {
    let token = ack
        .split_whitespace()
        .last()
        .ok_or_else(|| SchedulerError::Submission("empty acknowledgment".to_string()))?;

    token.parse::<JobId>().map_err(|_| {
        SchedulerError::Submission(format!("unparsable acknowledgment: '{}'", ack.trim()))
    })
}

fn escape(p: &Path) -> String {
    p.to_string_lossy().replace('"', "\\\"")
}
