//! Domain tasks
//!
//! Each work item variant maps to one task function. The runner and the
//! local-mode coordinator both dispatch through [`execute`].

mod pge_command;
mod scene_numbers;

pub use scene_numbers::SCENE_NUMBER_FIELD;

use slurmline_core::domain::work_item::WorkItem;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::environment::Provisioner;
use crate::error::WorkError;
use crate::store::Store;

/// Collaborators the tasks are built from
#[derive(Clone)]
pub struct TaskServices {
    pub store: Arc<dyn Store>,
    pub provisioner: Arc<Provisioner>,
}

impl TaskServices {
    pub fn new(store: Arc<dyn Store>, provisioner: Arc<Provisioner>) -> Self {
        Self { store, provisioner }
    }
}

/// Everything a task sees while it runs
pub struct TaskContext<'a> {
    pub config: &'a Config,
    pub services: &'a TaskServices,
    /// Node-local working directory for this run
    pub local_tmp_dir: PathBuf,
}

/// Runs the task named by `item`
pub async fn execute(item: &WorkItem, ctx: &TaskContext<'_>) -> Result<(), WorkError> {
    match item {
        WorkItem::AssignSceneNumbers(params) => scene_numbers::run(params, ctx).await,
        WorkItem::PgeCommand(params) => pge_command::run(params, ctx).await,
    }
}
