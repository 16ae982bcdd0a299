//! Provenance log entries
//!
//! One immutable entry is appended per affected record after a task
//! produces its result. Entries are never mutated once written.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Run command recorded for tasks that only update the database
pub const DB_ONLY_RUN_COMMAND: &str = "N/A - DB updates only";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompletionStatus {
    Success,
    Failure,
}

/// A processing log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceEntry {
    pub task: String,
    pub pge_name: String,
    pub pge_version: String,
    #[serde(default)]
    pub pge_input_files: Map<String, Value>,
    pub pge_run_command: String,
    #[serde(default = "not_applicable")]
    pub documentation_version: String,
    pub log_timestamp: DateTime<Utc>,
    pub completion_status: CompletionStatus,
    #[serde(default)]
    pub output: Map<String, Value>,
}

fn not_applicable() -> String {
    "N/A".to_string()
}

impl ProvenanceEntry {
    /// Starts a successful entry for a database-only task
    pub fn new(
        task: impl Into<String>,
        pge_name: impl Into<String>,
        pge_version: impl Into<String>,
    ) -> Self {
        Self {
            task: task.into(),
            pge_name: pge_name.into(),
            pge_version: pge_version.into(),
            pge_input_files: Map::new(),
            pge_run_command: DB_ONLY_RUN_COMMAND.to_string(),
            documentation_version: not_applicable(),
            log_timestamp: Utc::now(),
            completion_status: CompletionStatus::Success,
            output: Map::new(),
        }
    }

    pub fn with_input(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.pge_input_files.insert(key.into(), value.into());
        self
    }

    pub fn with_run_command(mut self, command: impl Into<String>) -> Self {
        self.pge_run_command = command.into();
        self
    }

    pub fn with_output(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.output.insert(key.into(), value.into());
        self
    }

    pub fn with_status(mut self, status: CompletionStatus) -> Self {
        self.completion_status = status;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let entry = ProvenanceEntry::new("assign_scene_numbers", "https://git/x/main.git", "v1.2.0")
            .with_input("orbit_id", "0012345")
            .with_output("number_of_scenes", 3);

        assert_eq!(entry.pge_run_command, DB_ONLY_RUN_COMMAND);
        assert_eq!(entry.completion_status, CompletionStatus::Success);
        assert_eq!(entry.output["number_of_scenes"], 3);

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["completion_status"], "SUCCESS");
    }
}
