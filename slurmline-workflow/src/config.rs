//! Run configuration
//!
//! One explicit configuration value is threaded through the coordinator,
//! submitter, tracker and runner. A copy is written into every scratch
//! directory so the runner on the compute node sees the same settings.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, WorkflowError};
use slurmline_core::naming::{self, DEFAULT_MAX_FILENAME_LEN};

/// Appended to a scratch directory name when it is relocated
pub const RELOCATION_SUFFIX: &str = "_tmp";

/// Environment variable naming the configuration file
pub const CONFIG_ENV_VAR: &str = "SLURMLINE_CONFIG";

/// A processing element: versioned code plus its execution environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PgeSpec {
    pub repo_url: String,
    pub version_tag: String,
    /// Environment name; defaults to the repository name
    #[serde(default)]
    pub conda_env: Option<String>,
}

/// Run configuration
///
/// All intervals are configurable to allow tuning per deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Execute work in-process instead of submitting to the scheduler
    pub local_mode: bool,

    /// Shared scratch root, e.g. "/beegfs/scratch/tmp"
    pub scratch_root: PathBuf,

    /// Path segment of `scratch_root` swapped for `error_segment` on relocation
    pub scratch_segment: String,
    pub error_segment: String,

    /// Node-local scratch root on compute nodes
    pub local_tmp_root: PathBuf,

    /// Maximum length of one path component
    pub max_filename_len: usize,

    pub conda_base: PathBuf,

    /// Where processing element repositories are checked out
    pub pge_base: PathBuf,

    /// Environment activated by the batch script before starting the runner
    pub runner_env: String,

    /// Runner executable invoked on the compute node
    pub runner_command: PathBuf,

    pub pges: BTreeMap<String, PgeSpec>,

    /// Processing element recorded in provenance of database-only tasks
    pub self_pge: String,

    /// JSON store shared between submit host and compute nodes
    pub store_path: PathBuf,

    #[serde(with = "duration_secs")]
    pub poll_interval: Duration,

    /// Upper bound on how long a job is tracked before giving up
    #[serde(with = "duration_secs")]
    pub tracking_timeout: Duration,

    pub default_partition: String,
    pub default_level: String,
}

impl Config {
    /// Creates a configuration with defaults rooted at `scratch_root`
    pub fn new(scratch_root: impl Into<PathBuf>) -> Self {
        Self {
            local_mode: false,
            scratch_root: scratch_root.into(),
            scratch_segment: "tmp".to_string(),
            error_segment: "error".to_string(),
            local_tmp_root: PathBuf::from("/local/scratch"),
            max_filename_len: DEFAULT_MAX_FILENAME_LEN,
            conda_base: PathBuf::from("/shared/anaconda3"),
            pge_base: PathBuf::from("/shared/pges"),
            runner_env: "slurmline".to_string(),
            runner_command: PathBuf::from("slurmline-runner"),
            pges: BTreeMap::new(),
            self_pge: "pipeline-main".to_string(),
            store_path: PathBuf::from("/shared/slurmline/store.json"),
            poll_interval: Duration::from_secs(30),
            tracking_timeout: Duration::from_secs(7 * 24 * 60 * 60),
            default_partition: "batch".to_string(),
            default_level: "INFO".to_string(),
        }
    }

    /// Loads configuration from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            WorkflowError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: Config = serde_json::from_str(&text).map_err(|e| {
            WorkflowError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the file named by `SLURMLINE_CONFIG`
    pub fn from_env() -> Result<Self> {
        let path = std::env::var(CONFIG_ENV_VAR).map_err(|_| {
            WorkflowError::Config(format!("{} environment variable not set", CONFIG_ENV_VAR))
        })?;
        Self::from_file(Path::new(&path))
    }

    /// Serializes the configuration for the scratch-directory copy
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn with_pge(mut self, name: impl Into<String>, spec: PgeSpec) -> Self {
        self.pges.insert(name.into(), spec);
        self
    }

    pub fn pge(&self, name: &str) -> Option<&PgeSpec> {
        self.pges.get(name)
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(WorkflowError::Config(
                "poll_interval must be greater than 0".to_string(),
            ));
        }

        if self.tracking_timeout < self.poll_interval {
            return Err(WorkflowError::Config(
                "tracking_timeout must be at least one poll_interval".to_string(),
            ));
        }

        if self.max_filename_len <= RELOCATION_SUFFIX.len() {
            return Err(WorkflowError::Config(format!(
                "max_filename_len must be greater than {}",
                RELOCATION_SUFFIX.len()
            )));
        }

        if self.scratch_segment.is_empty() || self.error_segment.is_empty() {
            return Err(WorkflowError::Config(
                "scratch_segment and error_segment cannot be empty".to_string(),
            ));
        }

        if self.scratch_segment == self.error_segment {
            return Err(WorkflowError::Config(
                "scratch_segment and error_segment must differ".to_string(),
            ));
        }

        let root = format!("{}/", self.scratch_root.to_string_lossy());
        if !root.contains(&segment(&self.scratch_segment)) {
            return Err(WorkflowError::Config(format!(
                "scratch_root {} does not contain the segment '{}'",
                self.scratch_root.display(),
                self.scratch_segment
            )));
        }

        Ok(())
    }

    /// Longest scratch directory name that still relocates within `max_filename_len`
    pub fn scratch_name_max_len(&self) -> usize {
        self.max_filename_len.saturating_sub(RELOCATION_SUFFIX.len())
    }

    /// Error-area target for a scratch directory
    ///
    /// The last `/<scratch_segment>/` in the path is replaced by
    /// `/<error_segment>/` and `_tmp` is appended. A leaf longer than
    /// [`Config::scratch_name_max_len`] is shortened first so the target
    /// stays a valid file name.
    pub fn relocation_target(&self, scratch_dir: &Path) -> PathBuf {
        let path = scratch_dir.to_string_lossy();
        let from = segment(&self.scratch_segment);
        let to = segment(&self.error_segment);

        let relocated = match path.rfind(&from) {
            Some(idx) => format!("{}{}{}", &path[..idx], to, &path[idx + from.len()..]),
            None => path.to_string(),
        };
        let relocated = PathBuf::from(relocated);

        let leaf = relocated
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        let leaf = format!(
            "{}{}",
            naming::truncate(&leaf, self.scratch_name_max_len()),
            RELOCATION_SUFFIX
        );

        relocated.with_file_name(leaf)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new("/beegfs/scratch/tmp")
    }
}

fn segment(name: &str) -> String {
    format!("/{}/", name)
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
