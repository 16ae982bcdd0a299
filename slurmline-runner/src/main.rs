//! Slurmline runner
//!
//! Started on a compute node by the generated batch script with the
//! Work Unit's shared scratch directory as its only argument.

use anyhow::{Context, Result, ensure};
use clap::Parser;
use slurmline_core::domain::work_unit::RUN_CONFIG_FILE;
use slurmline_workflow::environment::{CondaBackend, Provisioner};
use slurmline_workflow::runner::{Runner, load_work_unit};
use slurmline_workflow::store::JsonFileStore;
use slurmline_workflow::tasks::TaskServices;
use slurmline_workflow::Config;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "slurmline-runner")]
#[command(about = "Runs a serialized Work Unit on a compute node", long_about = None)]
struct Cli {
    /// Scratch directory containing work-unit.json
    scratch_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    ensure!(
        cli.scratch_dir.is_dir(),
        "scratch directory {} does not exist",
        cli.scratch_dir.display()
    );

    let unit = load_work_unit(&cli.scratch_dir)
        .with_context(|| format!("Failed to load work unit from {}", cli.scratch_dir.display()))?;

    // Logs go to stdout; stderr is reserved for failures
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter(&unit.level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stdout))
        .init();

    info!(
        "Starting {} for {} (partition={}, level={})",
        unit.kind(),
        unit.item.subject_id(),
        unit.partition,
        unit.level
    );

    let config_path = unit
        .config_path
        .clone()
        .unwrap_or_else(|| cli.scratch_dir.join(RUN_CONFIG_FILE));
    let config = Arc::new(
        Config::from_file(&config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?,
    );

    let store = JsonFileStore::open(&config.store_path)
        .await
        .with_context(|| format!("Failed to open store {}", config.store_path.display()))?;
    info!("Using store at {}", store.path().display());

    let provisioner = Provisioner::new(Arc::new(CondaBackend::new(&config.conda_base)), &config);
    let services = TaskServices::new(Arc::new(store), Arc::new(provisioner));

    Runner::new(config, services)
        .run_in_scratch(&cli.scratch_dir)
        .await
        .context("Work unit failed")?;

    info!("Work unit completed");
    Ok(())
}

/// Maps a Work Unit level onto a tracing filter
fn default_filter(level: &str) -> String {
    let level = match level.to_uppercase().as_str() {
        "DEBUG" => "debug",
        "WARNING" | "WARN" => "warn",
        "ERROR" | "CRITICAL" => "error",
        _ => "info",
    };
    format!("slurmline_runner={0},slurmline_workflow={0}", level)
}
