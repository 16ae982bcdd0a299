//! Processing element environments
//!
//! - Handle: where a versioned processing element lives on disk
//! - Backend: the injected environment manager (conda in production)
//! - Provisioner: idempotent `ensure` with rollback, and `run`

mod conda;
mod provisioner;

pub use conda::CondaBackend;
pub use provisioner::Provisioner;

use std::path::{Path, PathBuf};

use crate::config::PgeSpec;
use crate::error::EnvironmentError;

/// Resolved locations of a processing element and its environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentHandle {
    pub repo_url: String,
    pub version_tag: String,
    /// Version tag without a leading "v"
    pub version: String,
    pub repo_account: String,
    pub repo_name: String,
    /// `<pge_base>/<repo_name>-<version>`
    pub repo_dir: PathBuf,
    pub env_name: String,
    /// `<conda_base>/envs/<env_name>`
    pub env_dir: PathBuf,
}

impl EnvironmentHandle {
    pub fn resolve(spec: &PgeSpec, pge_base: &Path, conda_base: &Path) -> Self {
        let version = spec
            .version_tag
            .strip_prefix('v')
            .unwrap_or(&spec.version_tag)
            .to_string();

        let repo_name = spec
            .repo_url
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .trim_end_matches(".git")
            .to_string();

        let env_name = spec.conda_env.clone().unwrap_or_else(|| repo_name.clone());

        Self {
            repo_url: spec.repo_url.clone(),
            version_tag: spec.version_tag.clone(),
            repo_account: repo_account(&spec.repo_url),
            repo_dir: pge_base.join(format!("{}-{}", repo_name, version)),
            env_dir: conda_base.join("envs").join(&env_name),
            version,
            repo_name,
            env_name,
        }
    }
}

/// Account (owner) segment of an https or ssh repository URL
fn repo_account(url: &str) -> String {
    let parts: Vec<&str> = url.split('/').collect();
    if parts.len() < 2 {
        return String::new();
    }
    let owner = parts[parts.len() - 2];

    if url.starts_with("https") {
        owner.to_string()
    } else if url.starts_with("git@") {
        owner.rsplit(':').next().unwrap_or_default().to_string()
    } else {
        String::new()
    }
}

/// Captured output of a command run inside an environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Environment manager operations the provisioner is built from
///
/// Every step reports failure as an error; the provisioner owns the
/// ordering, idempotence and rollback.
pub trait EnvironmentBackend: Send + Sync {
    /// Checks out `version_tag` of the repository into `repo_dir`
    fn clone_repo(&self, handle: &EnvironmentHandle) -> Result<(), EnvironmentError>;

    fn env_exists(&self, handle: &EnvironmentHandle) -> Result<bool, EnvironmentError>;

    /// Creates the environment; returns false when the repository does not
    /// describe one and nothing was created
    fn create_env(&self, handle: &EnvironmentHandle) -> Result<bool, EnvironmentError>;

    /// Runs the repository's install step, if it has one
    fn install(&self, handle: &EnvironmentHandle) -> Result<(), EnvironmentError>;

    fn remove_env(&self, handle: &EnvironmentHandle) -> Result<(), EnvironmentError>;

    /// Runs a command inside the environment and captures its output
    fn run(
        &self,
        handle: &EnvironmentHandle,
        command: &[String],
        cwd: Option<&Path>,
    ) -> Result<CommandOutput, EnvironmentError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(url: &str, tag: &str, env: Option<&str>) -> PgeSpec {
        PgeSpec {
            repo_url: url.to_string(),
            version_tag: tag.to_string(),
            conda_env: env.map(str::to_string),
        }
    }

    #[test]
    fn test_resolve_https() {
        let handle = EnvironmentHandle::resolve(
            &spec("https://github.com/emit-sds/emit-sds-l1b.git", "v1.4.0", None),
            Path::new("/pges"),
            Path::new("/conda"),
        );

        assert_eq!(handle.version, "1.4.0");
        assert_eq!(handle.repo_account, "emit-sds");
        assert_eq!(handle.repo_name, "emit-sds-l1b");
        assert_eq!(handle.repo_dir, PathBuf::from("/pges/emit-sds-l1b-1.4.0"));
        assert_eq!(handle.env_name, "emit-sds-l1b");
        assert_eq!(handle.env_dir, PathBuf::from("/conda/envs/emit-sds-l1b"));
    }

    #[test]
    fn test_resolve_ssh_with_explicit_env() {
        let handle = EnvironmentHandle::resolve(
            &spec("git@github.com:org/isofit.git", "3.0.1", Some("isofit-env")),
            Path::new("/pges"),
            Path::new("/conda"),
        );

        assert_eq!(handle.version, "3.0.1");
        assert_eq!(handle.repo_account, "org");
        assert_eq!(handle.env_name, "isofit-env");
        assert_eq!(handle.repo_dir, PathBuf::from("/pges/isofit-3.0.1"));
    }
}
