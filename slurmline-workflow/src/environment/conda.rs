//! Conda environment backend
//!
//! Shells out to `git` and `conda`. Every command's stdout/stderr is logged
//! at debug level and attached to the error on failure.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tracing::{debug, info};

use super::{CommandOutput, EnvironmentBackend, EnvironmentHandle};
use crate::error::{EnvironmentError, ProvisionStep};

/// Environment backend backed by a conda installation
pub struct CondaBackend {
    conda_exe: PathBuf,
    conda_sh: PathBuf,
}

impl CondaBackend {
    /// Creates a backend for the conda installation at `conda_base`
    pub fn new(conda_base: &Path) -> Self {
        Self {
            conda_exe: conda_base.join("bin/conda"),
            conda_sh: conda_base.join("etc/profile.d/conda.sh"),
        }
    }

    fn conda(&self) -> Command {
        Command::new(&self.conda_exe)
    }
}

/// Runs a command for a provisioning step, failing on spawn error or non-zero exit
fn run_step(mut command: Command, step: ProvisionStep) -> Result<Output, EnvironmentError> {
    debug!("Running {:?}", command);

    let output = command.output().map_err(|e| {
        EnvironmentError::provisioning(step, format!("failed to spawn {:?}: {}", command, e))
    })?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stdout.trim().is_empty() {
        debug!("{} stdout: {}", step, stdout.trim());
    }
    if !stderr.trim().is_empty() {
        debug!("{} stderr: {}", step, stderr.trim());
    }

    if !output.status.success() {
        return Err(EnvironmentError::provisioning(
            step,
            format!(
                "{:?} exited with {}: stderr='{}'",
                command,
                output.status.code().unwrap_or(-1),
                stderr.trim()
            ),
        ));
    }

    Ok(output)
}

impl EnvironmentBackend for CondaBackend {
    fn clone_repo(&self, handle: &EnvironmentHandle) -> Result<(), EnvironmentError> {
        info!(
            "Cloning {} at {} into {}",
            handle.repo_url,
            handle.version_tag,
            handle.repo_dir.display()
        );

        let mut command = Command::new("git");
        command
            .arg("clone")
            .arg("-b")
            .arg(&handle.version_tag)
            .arg(&handle.repo_url)
            .arg(&handle.repo_dir);

        run_step(command, ProvisionStep::Clone).map(|_| ())
    }

    fn env_exists(&self, handle: &EnvironmentHandle) -> Result<bool, EnvironmentError> {
        let mut command = self.conda();
        command.arg("env").arg("list");

        let output = run_step(command, ProvisionStep::CheckEnvironment)?;
        let listing = String::from_utf8_lossy(&output.stdout);
        let env_dir = handle.env_dir.to_string_lossy();

        Ok(listing
            .lines()
            .any(|line| line.split_whitespace().any(|col| col == env_dir)))
    }

    fn create_env(&self, handle: &EnvironmentHandle) -> Result<bool, EnvironmentError> {
        let env_file = handle.repo_dir.join("environment.yml");
        if !env_file.exists() {
            debug!("No environment.yml in {}", handle.repo_dir.display());
            return Ok(false);
        }

        info!("Creating conda env {} from {}", handle.env_name, env_file.display());

        let mut command = self.conda();
        command
            .arg("env")
            .arg("create")
            .arg("-f")
            .arg(&env_file)
            .arg("-n")
            .arg(&handle.env_name);

        run_step(command, ProvisionStep::CreateEnvironment)?;
        Ok(true)
    }

    fn install(&self, handle: &EnvironmentHandle) -> Result<(), EnvironmentError> {
        let script = handle.repo_dir.join("install.sh");
        if !script.exists() {
            debug!("No install.sh in {}", handle.repo_dir.display());
            return Ok(());
        }

        info!("Installing {} into {}", handle.repo_name, handle.env_name);

        let mut command = Command::new("bash");
        command.arg("-c").arg(format!(
            "source \"{}\" && conda activate \"{}\" && ./install.sh",
            self.conda_sh.display(),
            handle.env_dir.display()
        ));
        command.current_dir(&handle.repo_dir);

        run_step(command, ProvisionStep::Install).map(|_| ())
    }

    fn remove_env(&self, handle: &EnvironmentHandle) -> Result<(), EnvironmentError> {
        info!("Removing conda env {}", handle.env_name);

        let mut command = self.conda();
        command
            .arg("env")
            .arg("remove")
            .arg("-y")
            .arg("-n")
            .arg(&handle.env_name);

        run_step(command, ProvisionStep::CreateEnvironment).map(|_| ())
    }

    fn run(
        &self,
        handle: &EnvironmentHandle,
        command: &[String],
        cwd: Option<&Path>,
    ) -> Result<CommandOutput, EnvironmentError> {
        let mut conda_run = self.conda();
        conda_run.arg("run").arg("-n").arg(&handle.env_name);
        if let Some(dir) = cwd {
            conda_run.arg("--cwd").arg(dir);
        }
        conda_run.args(command);

        debug!("Executing in env {}: {:?}", handle.env_name, command);

        let output = conda_run.output()?;

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}
