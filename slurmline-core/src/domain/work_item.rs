//! Work items
//!
//! A work item names one supported task kind together with its parameters.
//! The runner dispatches on the variant, so deserializing a Work Unit never
//! executes anything by itself.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The supported task kinds and their parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "params", rename_all = "snake_case")]
pub enum WorkItem {
    AssignSceneNumbers(SceneNumberParams),
    PgeCommand(PgeCommandParams),
}

impl WorkItem {
    /// Stable task kind name, used in job names and log entries
    pub fn kind(&self) -> &'static str {
        match self {
            WorkItem::AssignSceneNumbers(_) => "assign_scene_numbers",
            WorkItem::PgeCommand(_) => "pge_command",
        }
    }

    /// Identifier of the record this work is about
    pub fn subject_id(&self) -> &str {
        match self {
            WorkItem::AssignSceneNumbers(p) => &p.orbit_id,
            WorkItem::PgeCommand(p) => &p.acquisition_id,
        }
    }

    /// Memory request in megabytes, if the task needs more than the default
    pub fn memory_mb(&self) -> Option<u32> {
        match self {
            WorkItem::AssignSceneNumbers(_) => Some(18_000),
            WorkItem::PgeCommand(p) => p.memory_mb,
        }
    }
}

/// Assigns contiguous scene numbers to every acquisition in an orbit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneNumberParams {
    pub orbit_id: String,
    /// Reassign even when numbers already exist
    #[serde(default)]
    pub override_output: bool,
}

/// Runs a command inside a processing element's environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PgeCommandParams {
    pub acquisition_id: String,
    /// Name of the processing element in the run configuration
    pub pge: String,
    pub command: Vec<String>,
    #[serde(default)]
    pub input_files: BTreeMap<String, String>,
    #[serde(default)]
    pub memory_mb: Option<u32>,
}
