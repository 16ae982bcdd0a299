//! Environment provisioner
//!
//! `ensure` is a no-op when the versioned checkout already exists on disk.
//! Otherwise it clones, creates the environment if missing and installs.
//! If any step fails, everything created by this call is removed and the
//! original failure is returned.

use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::{CommandOutput, EnvironmentBackend, EnvironmentHandle};
use crate::config::{Config, PgeSpec};
use crate::error::EnvironmentError;

pub struct Provisioner {
    backend: Arc<dyn EnvironmentBackend>,
    pge_base: std::path::PathBuf,
    conda_base: std::path::PathBuf,
}

impl Provisioner {
    pub fn new(backend: Arc<dyn EnvironmentBackend>, config: &Config) -> Self {
        Self {
            backend,
            pge_base: config.pge_base.clone(),
            conda_base: config.conda_base.clone(),
        }
    }

    pub fn resolve(&self, spec: &PgeSpec) -> EnvironmentHandle {
        EnvironmentHandle::resolve(spec, &self.pge_base, &self.conda_base)
    }

    /// Ensures the processing element and its environment exist
    pub fn ensure(&self, spec: &PgeSpec) -> Result<EnvironmentHandle, EnvironmentError> {
        let handle = self.resolve(spec);

        if handle.repo_dir.exists() {
            debug!(
                "{} {} already provisioned at {}",
                handle.repo_name,
                handle.version,
                handle.repo_dir.display()
            );
            return Ok(handle);
        }

        info!("Provisioning {} {}", handle.repo_name, handle.version);

        let mut created_env = false;
        match self.build(&handle, &mut created_env) {
            Ok(()) => {
                info!("Provisioned {} {}", handle.repo_name, handle.version);
                Ok(handle)
            }
            Err(e) => {
                error!("Provisioning {} failed: {}", handle.repo_name, e);
                self.rollback(&handle, created_env);
                Err(e)
            }
        }
    }

    fn build(
        &self,
        handle: &EnvironmentHandle,
        created_env: &mut bool,
    ) -> Result<(), EnvironmentError> {
        self.backend.clone_repo(handle)?;

        if !self.backend.env_exists(handle)? {
            *created_env = self.backend.create_env(handle)?;
        }

        self.backend.install(handle)
    }

    /// Removes partial state; failures here are logged, never returned
    fn rollback(&self, handle: &EnvironmentHandle, created_env: bool) {
        info!("Cleaning up after failed provisioning of {}", handle.repo_name);

        if handle.repo_dir.exists() {
            if let Err(e) = std::fs::remove_dir_all(&handle.repo_dir) {
                warn!("Failed to remove {}: {}", handle.repo_dir.display(), e);
            }
        }

        if created_env {
            if let Err(e) = self.backend.remove_env(handle) {
                warn!("Failed to remove environment {}: {}", handle.env_name, e);
            }
        }
    }

    /// Runs a command inside the environment
    ///
    /// A non-zero exit is reported as `CommandFailed` with the captured output.
    pub fn run(
        &self,
        handle: &EnvironmentHandle,
        command: &[String],
        cwd: Option<&Path>,
    ) -> Result<CommandOutput, EnvironmentError> {
        let output = self.backend.run(handle, command, cwd)?;

        if output.exit_code != 0 {
            return Err(EnvironmentError::CommandFailed {
                command: command.join(" "),
                exit_code: output.exit_code,
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }

        Ok(output)
    }
}
