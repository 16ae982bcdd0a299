//! Work Unit
//!
//! A self-contained description of one unit of work plus the execution
//! state filled in along the way:
//! - the coordinator sets the scratch directory and config copy
//! - the submitter sets the stream paths and the scheduler job id
//! - the runner sets the node-local tmp directory

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use super::job::JobId;
use super::work_item::WorkItem;
use crate::naming;

/// Current serialized format version
pub const WORK_UNIT_FORMAT_VERSION: u32 = 1;

/// File names inside a Work Unit's scratch directory
pub const WORK_UNIT_FILE: &str = "work-unit.json";
pub const RUN_CONFIG_FILE: &str = "run-config.json";
pub const STDOUT_FILE: &str = "job.out";
pub const STDERR_FILE: &str = "job.err";
pub const COMPLETION_MARKER_FILE: &str = "job.done";

/// Partition and level under which the node-local tmp dir is kept
pub const DEBUG_PARTITION: &str = "debug";
pub const DEBUG_LEVEL: &str = "DEBUG";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkUnit {
    #[serde(default = "default_format_version")]
    pub format_version: u32,
    /// Instance id, unique per Work Unit
    pub id: Uuid,
    pub item: WorkItem,
    pub created_at: DateTime<Utc>,
    pub partition: String,
    pub level: String,
    #[serde(default)]
    pub config_path: Option<PathBuf>,
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
    #[serde(default)]
    pub stdout_path: Option<PathBuf>,
    #[serde(default)]
    pub stderr_path: Option<PathBuf>,
    #[serde(default)]
    pub job_id: Option<JobId>,
    #[serde(default)]
    pub local_tmp_dir: Option<PathBuf>,
}

fn default_format_version() -> u32 {
    WORK_UNIT_FORMAT_VERSION
}

impl WorkUnit {
    pub fn new(item: WorkItem, partition: impl Into<String>, level: impl Into<String>) -> Self {
        Self {
            format_version: WORK_UNIT_FORMAT_VERSION,
            id: Uuid::new_v4(),
            item,
            created_at: Utc::now(),
            partition: partition.into(),
            level: level.into(),
            config_path: None,
            scratch_dir: None,
            stdout_path: None,
            stderr_path: None,
            job_id: None,
            local_tmp_dir: None,
        }
    }

    /// Task kind shorthand
    pub fn kind(&self) -> &'static str {
        self.item.kind()
    }

    /// Composite identity: subject and task kind
    pub fn identity(&self) -> String {
        format!("{}_{}", self.item.subject_id(), self.item.kind())
    }

    /// Scheduler job name: the sanitized identity
    pub fn job_name(&self, max_len: usize) -> String {
        naming::safe_name(&self.identity(), "", max_len)
    }

    /// Name of the node-local tmp directory, at most `max_len` bytes
    ///
    /// The instance id is always kept in full; long subjects are shortened.
    pub fn task_instance_id(&self, max_len: usize) -> String {
        naming::safe_name(
            &format!("{}_{}", self.item.kind(), self.item.subject_id()),
            &format!("_{}", self.id.simple()),
            max_len,
        )
    }

    /// Scratch directory name: identity, creation timestamp and a short
    /// instance id so that units created within the same second differ
    pub fn scratch_dir_name(&self, max_len: usize) -> String {
        let instance = self.id.simple().to_string();
        let suffix = format!(
            "_v{}_{}",
            self.created_at.format("%Y%m%dt%H%M%S"),
            &instance[..8]
        );
        naming::safe_name(&self.identity(), &suffix, max_len)
    }

    /// Whether the node-local tmp dir is kept after the run
    pub fn retains_local_tmp(&self) -> bool {
        self.partition == DEBUG_PARTITION && self.level == DEBUG_LEVEL
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::work_item::SceneNumberParams;

    fn scene_unit(orbit: &str) -> WorkUnit {
        WorkUnit::new(
            WorkItem::AssignSceneNumbers(SceneNumberParams {
                orbit_id: orbit.to_string(),
                override_output: false,
            }),
            "batch",
            "INFO",
        )
    }

    #[test]
    fn test_scratch_names_are_distinct_within_a_second() {
        let a = scene_unit("orbit 7 (test)");
        let mut b = scene_unit("orbit 7 (test)");
        b.created_at = a.created_at;

        let name_a = a.scratch_dir_name(255);
        let name_b = b.scratch_dir_name(255);
        assert_ne!(name_a, name_b);
        assert!(name_a.starts_with("orbit_7__test__assign_scene_numbers_v"));
    }

    #[test]
    fn test_long_subject_names_stay_within_limit() {
        let unit = scene_unit(&"a".repeat(240));

        let instance = unit.task_instance_id(255);
        assert!(instance.len() <= 255);
        assert!(instance.starts_with("assign_scene_numbers_aaa"));
        assert!(instance.ends_with(&unit.id.simple().to_string()));

        assert!(unit.scratch_dir_name(251).len() <= 251);
    }

    #[test]
    fn test_retains_local_tmp_only_for_debug_partition_and_level() {
        let mut unit = scene_unit("o1");
        assert!(!unit.retains_local_tmp());

        unit.partition = "debug".to_string();
        assert!(!unit.retains_local_tmp());

        unit.level = "DEBUG".to_string();
        assert!(unit.retains_local_tmp());

        unit.partition = "batch".to_string();
        assert!(!unit.retains_local_tmp());
    }

    #[test]
    fn test_json_round_trip_keeps_execution_state() {
        let mut unit = scene_unit("o1");
        unit.job_id = Some(JobId(77));
        unit.scratch_dir = Some(PathBuf::from("/scratch/tmp/o1"));

        let back = WorkUnit::from_json(&unit.to_json().unwrap()).unwrap();
        assert_eq!(back.id, unit.id);
        assert_eq!(back.job_id, Some(JobId(77)));
        assert_eq!(back.item, unit.item);
    }

    #[test]
    fn test_older_documents_without_state_fields_load() {
        let json = r#"{
            "id": "67e55044-10b1-426f-9247-bb680e5fe0c8",
            "item": {"kind": "assign_scene_numbers", "params": {"orbit_id": "o9"}},
            "created_at": "2024-03-01T12:00:00Z",
            "partition": "batch",
            "level": "INFO"
        }"#;

        let unit = WorkUnit::from_json(json).unwrap();
        assert_eq!(unit.format_version, WORK_UNIT_FORMAT_VERSION);
        assert!(unit.scratch_dir.is_none());
        assert!(unit.job_id.is_none());
    }
}
