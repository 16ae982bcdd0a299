//! Remote runner
//!
//! Executes a Work Unit on the compute node. The unit gets a node-local
//! working directory named by its task instance id. That directory is
//! removed on every exit path except a debug-partition run at debug level.
//! A recoverable work failure first copies it to the error area next to the
//! shared scratch directory.

use slurmline_core::domain::job::CompletionMarker;
use slurmline_core::domain::work_unit::{COMPLETION_MARKER_FILE, WORK_UNIT_FILE, WorkUnit};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{Result, WorkflowError};
use crate::tasks::{self, TaskContext, TaskServices};

pub struct Runner {
    config: Arc<Config>,
    services: TaskServices,
}

impl Runner {
    pub fn new(config: Arc<Config>, services: TaskServices) -> Self {
        Self { config, services }
    }

    /// Runs the unit serialized in `scratch_dir` and leaves a completion marker
    pub async fn run_in_scratch(&self, scratch_dir: &Path) -> Result<()> {
        let mut unit = load_work_unit(scratch_dir)?;
        if unit.scratch_dir.is_none() {
            unit.scratch_dir = Some(scratch_dir.to_path_buf());
        }

        let result = self.run(&mut unit).await;

        let marker = match &result {
            Ok(()) => CompletionMarker::succeeded(),
            Err(e) => CompletionMarker::failed(e.to_string()),
        };
        if let Err(e) = write_marker(scratch_dir, &marker) {
            warn!("Failed to write completion marker in {}: {}", scratch_dir.display(), e);
        }

        result
    }

    /// Runs one Work Unit in a fresh node-local tmp directory
    ///
    /// Relocation only happens when the unit has a shared scratch directory,
    /// so local-mode runs propagate failures without copying anything.
    pub async fn run(&self, unit: &mut WorkUnit) -> Result<()> {
        let tmp_dir = self
            .config
            .local_tmp_root
            .join(unit.task_instance_id(self.config.max_filename_len));
        std::fs::create_dir_all(&tmp_dir)?;
        info!("Created local tmp dir: {}", tmp_dir.display());
        unit.local_tmp_dir = Some(tmp_dir.clone());

        let _guard = LocalTmpDir {
            path: tmp_dir.clone(),
            retain: unit.retains_local_tmp(),
        };

        let ctx = TaskContext {
            config: &self.config,
            services: &self.services,
            local_tmp_dir: tmp_dir.clone(),
        };

        match tasks::execute(&unit.item, &ctx).await {
            Ok(()) => {
                info!("{} {} finished", unit.item.subject_id(), unit.kind());
                Ok(())
            }
            Err(e) => {
                error!("Encountered error with {}: {}", unit.identity(), e);
                if e.is_recoverable() {
                    if let Some(scratch_dir) = &unit.scratch_dir {
                        self.relocate(&tmp_dir, scratch_dir);
                    }
                }
                Err(WorkflowError::Work(e))
            }
        }
    }

    /// Copies the local tmp dir to the error area; failures are only logged
    fn relocate(&self, tmp_dir: &Path, scratch_dir: &Path) {
        let target = self.config.relocation_target(scratch_dir);
        info!(
            "Copying local tmp folder {} to {}",
            tmp_dir.display(),
            target.display()
        );
        if let Err(e) = copy_dir_recursive(tmp_dir, &target) {
            warn!("Failed to relocate {}: {}", tmp_dir.display(), e);
        }
    }
}

/// Deletes the node-local tmp dir when the run ends, however it ends
struct LocalTmpDir {
    path: PathBuf,
    retain: bool,
}

impl Drop for LocalTmpDir {
    fn drop(&mut self) {
        if self.retain {
            info!("Keeping local tmp folder for debugging: {}", self.path.display());
            return;
        }

        info!("Deleting local tmp folder: {}", self.path.display());
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            warn!("Failed to delete {}: {}", self.path.display(), e);
        }
    }
}

/// Reads the serialized Work Unit from a scratch directory
pub fn load_work_unit(scratch_dir: &Path) -> Result<WorkUnit> {
    let path = scratch_dir.join(WORK_UNIT_FILE);
    let text = std::fs::read_to_string(&path)?;
    Ok(WorkUnit::from_json(&text)?)
}

fn write_marker(scratch_dir: &Path, marker: &CompletionMarker) -> Result<()> {
    let json = serde_json::to_string_pretty(marker)?;
    std::fs::write(scratch_dir.join(COMPLETION_MARKER_FILE), json)?;
    Ok(())
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    if !dst.exists() {
        std::fs::create_dir_all(dst)?;
    }

    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let path = entry.path();
        let dest_path = dst.join(entry.file_name());

        if path.is_dir() {
            copy_dir_recursive(&path, &dest_path)?;
        } else {
            std::fs::copy(&path, &dest_path)?;
        }
    }

    Ok(())
}
