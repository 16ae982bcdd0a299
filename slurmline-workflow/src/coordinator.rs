//! Execution coordinator
//!
//! Entry point for one Work Unit. In local mode the task runs in-process.
//! Otherwise a fresh scratch directory is prepared, the unit is submitted
//! and tracked until terminal. The scratch directory itself is left for the
//! runner and the operator; only the serialized unit is removed.

use slurmline_core::domain::job::Completion;
use slurmline_core::domain::work_unit::{RUN_CONFIG_FILE, WORK_UNIT_FILE, WorkUnit};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::runner::Runner;
use crate::scheduler::{ClusterBackend, JobTracker, Submitter};
use crate::tasks::TaskServices;

pub struct Coordinator {
    config: Arc<Config>,
    submitter: Submitter,
    tracker: JobTracker,
    runner: Runner,
}

impl Coordinator {
    pub fn new(
        config: Arc<Config>,
        backend: Arc<dyn ClusterBackend>,
        services: TaskServices,
    ) -> Self {
        Self {
            submitter: Submitter::new(config.clone(), backend.clone()),
            tracker: JobTracker::new(config.clone(), backend),
            runner: Runner::new(config.clone(), services),
            config,
        }
    }

    /// Executes the Work Unit and returns its terminal classification
    pub async fn execute(&self, mut unit: WorkUnit) -> Result<Completion> {
        if self.config.local_mode {
            info!("Running {} locally", unit.identity());
            self.runner.run(&mut unit).await?;
            return Ok(Completion::Ok);
        }

        let scratch_dir = self.prepare_scratch(&mut unit)?;
        self.submitter.submit(&mut unit).await?;
        let completion = self.tracker.track(&unit).await?;

        let serialized = scratch_dir.join(WORK_UNIT_FILE);
        match std::fs::remove_file(&serialized) {
            Ok(()) => debug!("Removed {}", serialized.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {}: {}", serialized.display(), e),
        }

        Ok(completion)
    }

    /// Creates the unit's scratch directory and writes the unit and config into it
    ///
    /// The leaf directory is created exclusively: an existing directory
    /// means another unit owns that name.
    pub fn prepare_scratch(&self, unit: &mut WorkUnit) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.config.scratch_root)?;

        let scratch_dir = self
            .config
            .scratch_root
            .join(unit.scratch_dir_name(self.config.scratch_name_max_len()));
        std::fs::create_dir(&scratch_dir)?;
        info!("Created scratch dir: {}", scratch_dir.display());

        let config_path = scratch_dir.join(RUN_CONFIG_FILE);
        std::fs::write(&config_path, self.config.to_json()?)?;

        unit.scratch_dir = Some(scratch_dir.clone());
        unit.config_path = Some(config_path);
        std::fs::write(scratch_dir.join(WORK_UNIT_FILE), unit.to_json()?)?;

        Ok(scratch_dir)
    }
}
