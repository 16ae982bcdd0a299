//! Test doubles for the cluster and environment backends, plus fixtures

use async_trait::async_trait;
use slurmline_core::domain::job::JobId;
use slurmline_core::domain::work_item::{
    PgeCommandParams, SceneNumberParams, WorkItem,
};
use slurmline_core::domain::work_unit::WorkUnit;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::{Config, PgeSpec};
use crate::environment::{CommandOutput, EnvironmentBackend, EnvironmentHandle, Provisioner};
use crate::error::{EnvironmentError, ProvisionStep, SchedulerError};
use crate::runner::Runner;
use crate::scheduler::ClusterBackend;
use crate::store::MemoryStore;
use crate::tasks::{TaskContext, TaskServices};

/// Header of a default `squeue` listing
pub const QUEUE_HEADER: &str = "JOBID PARTITION NAME USER ST TIME NODES NODELIST(REASON)";

pub fn queue_row(job_id: JobId, state: &str) -> String {
    format!("{} batch acq1_pge_command emit {} 0:05 1 node01", job_id, state)
}

type SubmitHook = Box<dyn Fn(&Path) + Send + Sync>;

/// Scripted cluster backend
///
/// Query responses are served in order; once they run out the job is
/// reported gone (header only).
pub struct MockCluster {
    ack: String,
    listings: Mutex<VecDeque<String>>,
    query_failures: Mutex<usize>,
    queries: Mutex<usize>,
    submitted: Mutex<Vec<PathBuf>>,
    cancelled: Mutex<Vec<JobId>>,
    on_submit: Option<SubmitHook>,
}

impl MockCluster {
    pub fn new(job_id: JobId) -> Self {
        Self::with_ack(&format!("Submitted batch job {}\n", job_id))
    }

    pub fn with_ack(ack: &str) -> Self {
        Self {
            ack: ack.to_string(),
            listings: Mutex::new(VecDeque::new()),
            query_failures: Mutex::new(0),
            queries: Mutex::new(0),
            submitted: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
            on_submit: None,
        }
    }

    pub fn with_listings(self, listings: Vec<String>) -> Self {
        *self.listings.lock().unwrap() = listings.into();
        self
    }

    /// Fails the first `n` queries before serving listings
    pub fn with_query_failures(self, n: usize) -> Self {
        *self.query_failures.lock().unwrap() = n;
        self
    }

    pub fn on_submit(mut self, hook: impl Fn(&Path) + Send + Sync + 'static) -> Self {
        self.on_submit = Some(Box::new(hook));
        self
    }

    pub fn submitted(&self) -> Vec<PathBuf> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn cancelled(&self) -> Vec<JobId> {
        self.cancelled.lock().unwrap().clone()
    }

    pub fn query_count(&self) -> usize {
        *self.queries.lock().unwrap()
    }
}

#[async_trait]
impl ClusterBackend for MockCluster {
    async fn submit(&self, script: &Path) -> Result<String, SchedulerError> {
        self.submitted.lock().unwrap().push(script.to_path_buf());
        if let Some(hook) = &self.on_submit {
            hook(script);
        }
        Ok(self.ack.clone())
    }

    async fn query(&self, _job_id: JobId) -> Result<String, SchedulerError> {
        *self.queries.lock().unwrap() += 1;

        let mut failures = self.query_failures.lock().unwrap();
        if *failures > 0 {
            *failures -= 1;
            return Err(SchedulerError::Query("slurm_load_jobs error: timeout".to_string()));
        }

        Ok(self
            .listings
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| format!("{}\n", QUEUE_HEADER)))
    }

    async fn cancel(&self, job_id: JobId) -> Result<(), SchedulerError> {
        self.cancelled.lock().unwrap().push(job_id);
        Ok(())
    }
}

/// Environment backend that touches only the directories it is told about
pub struct MockEnvironment {
    fail_at: Option<ProvisionStep>,
    exit_code: Mutex<i32>,
    envs: Mutex<BTreeSet<String>>,
    calls: Mutex<Vec<&'static str>>,
}

impl MockEnvironment {
    pub fn new() -> Self {
        Self {
            fail_at: None,
            exit_code: Mutex::new(0),
            envs: Mutex::new(BTreeSet::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_at(step: ProvisionStep) -> Self {
        Self {
            fail_at: Some(step),
            ..Self::new()
        }
    }

    pub fn with_exit_code(self, code: i32) -> Self {
        self.set_exit_code(code);
        self
    }

    pub fn set_exit_code(&self, code: i32) {
        *self.exit_code.lock().unwrap() = code;
    }

    pub fn preexisting_env(&self, name: &str) {
        self.envs.lock().unwrap().insert(name.to_string());
    }

    pub fn has_env(&self, name: &str) -> bool {
        self.envs.lock().unwrap().contains(name)
    }

    pub fn count(&self, op: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == op).count()
    }

    fn record(&self, op: &'static str, step: ProvisionStep) -> Result<(), EnvironmentError> {
        self.calls.lock().unwrap().push(op);
        if self.fail_at == Some(step) {
            return Err(EnvironmentError::provisioning(step, format!("mock {} failed", op)));
        }
        Ok(())
    }
}

impl EnvironmentBackend for MockEnvironment {
    fn clone_repo(&self, handle: &EnvironmentHandle) -> Result<(), EnvironmentError> {
        std::fs::create_dir_all(&handle.repo_dir)?;
        self.record("clone", ProvisionStep::Clone)
    }

    fn env_exists(&self, handle: &EnvironmentHandle) -> Result<bool, EnvironmentError> {
        self.record("env_exists", ProvisionStep::CheckEnvironment)?;
        Ok(self.has_env(&handle.env_name))
    }

    fn create_env(&self, handle: &EnvironmentHandle) -> Result<bool, EnvironmentError> {
        self.record("create_env", ProvisionStep::CreateEnvironment)?;
        std::fs::create_dir_all(&handle.env_dir)?;
        self.envs.lock().unwrap().insert(handle.env_name.clone());
        Ok(true)
    }

    fn install(&self, _handle: &EnvironmentHandle) -> Result<(), EnvironmentError> {
        self.record("install", ProvisionStep::Install)
    }

    fn remove_env(&self, handle: &EnvironmentHandle) -> Result<(), EnvironmentError> {
        self.calls.lock().unwrap().push("remove_env");
        if handle.env_dir.exists() {
            std::fs::remove_dir_all(&handle.env_dir)?;
        }
        self.envs.lock().unwrap().remove(&handle.env_name);
        Ok(())
    }

    fn run(
        &self,
        _handle: &EnvironmentHandle,
        _command: &[String],
        _cwd: Option<&Path>,
    ) -> Result<CommandOutput, EnvironmentError> {
        self.calls.lock().unwrap().push("run");
        let exit_code = *self.exit_code.lock().unwrap();
        Ok(CommandOutput {
            exit_code,
            stdout: "mock output".to_string(),
            stderr: if exit_code == 0 {
                String::new()
            } else {
                "mock failure".to_string()
            },
        })
    }
}

pub fn pge_item(acquisition_id: &str) -> WorkItem {
    WorkItem::PgeCommand(PgeCommandParams {
        acquisition_id: acquisition_id.to_string(),
        pge: "l1b".to_string(),
        command: vec![
            "l1b_run.py".to_string(),
            "--mode".to_string(),
            "full".to_string(),
        ],
        input_files: BTreeMap::from([(
            "raw".to_string(),
            format!("/store/{}_raw.img", acquisition_id),
        )]),
        memory_mb: None,
    })
}

pub fn scene_item(orbit_id: &str, override_output: bool) -> WorkItem {
    WorkItem::AssignSceneNumbers(SceneNumberParams {
        orbit_id: orbit_id.to_string(),
        override_output,
    })
}

pub fn pge_unit(acquisition_id: &str, partition: &str, level: &str) -> WorkUnit {
    WorkUnit::new(pge_item(acquisition_id), partition, level)
}

/// Config, store and environment rooted in a temporary directory
///
/// The shared scratch root ends in `/scratch/tmp` so relocation lands in
/// the sibling `/scratch/error` inside the same temporary directory.
pub struct Fixture {
    _dir: tempfile::TempDir,
    pub config: Arc<Config>,
    pub store: Arc<MemoryStore>,
    pub environment: Arc<MockEnvironment>,
    pub services: TaskServices,
}

impl Fixture {
    pub fn new() -> Self {
        Self::build(false)
    }

    pub fn local() -> Self {
        Self::build(true)
    }

    fn build(local_mode: bool) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        let mut config = Config::new(root.join("scratch").join("tmp"))
            .with_pge(
                "l1b",
                PgeSpec {
                    repo_url: "https://github.com/emit-sds/emit-sds-l1b.git".to_string(),
                    version_tag: "v1.4.0".to_string(),
                    conda_env: None,
                },
            )
            .with_pge(
                "pipeline-main",
                PgeSpec {
                    repo_url: "https://github.com/emit-sds/emit-main.git".to_string(),
                    version_tag: "v1.0.0".to_string(),
                    conda_env: None,
                },
            );
        config.local_mode = local_mode;
        config.local_tmp_root = root.join("local");
        config.pge_base = root.join("pges");
        config.conda_base = root.join("conda");
        config.store_path = root.join("store.json");
        config.poll_interval = Duration::from_millis(5);
        config.tracking_timeout = Duration::from_secs(5);
        let config = Arc::new(config);

        let store = Arc::new(MemoryStore::new());
        let environment = Arc::new(MockEnvironment::new());
        let provisioner = Arc::new(Provisioner::new(environment.clone(), &config));
        let services = TaskServices::new(store.clone(), provisioner);

        Self {
            _dir: dir,
            config,
            store,
            environment,
            services,
        }
    }

    pub fn runner(&self) -> Runner {
        Runner::new(self.config.clone(), self.services.clone())
    }

    pub fn context(&self) -> TaskContext<'_> {
        TaskContext {
            config: &self.config,
            services: &self.services,
            local_tmp_dir: self.config.local_tmp_root.clone(),
        }
    }
}
