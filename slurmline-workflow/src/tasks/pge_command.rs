//! Runs a command inside a processing element's environment

use slurmline_core::domain::provenance::ProvenanceEntry;
use slurmline_core::domain::work_item::PgeCommandParams;
use tracing::info;

use super::TaskContext;
use crate::error::WorkError;

const TASK_NAME: &str = "pge_command";

pub(super) async fn run(params: &PgeCommandParams, ctx: &TaskContext<'_>) -> Result<(), WorkError> {
    let spec = ctx.config.pge(&params.pge).ok_or_else(|| {
        WorkError::Unexpected(format!("processing element '{}' is not configured", params.pge))
    })?;

    if params.command.is_empty() {
        return Err(WorkError::Unexpected("empty command".to_string()));
    }

    let provisioner = &ctx.services.provisioner;
    let handle = provisioner.ensure(spec)?;

    info!(
        "Running {} {} for {}: {}",
        handle.repo_name,
        handle.version,
        params.acquisition_id,
        params.command.join(" ")
    );
    let output = provisioner.run(
        &handle,
        &params.command,
        Some(ctx.local_tmp_dir.as_path()),
    )?;

    let mut entry = ProvenanceEntry::new(TASK_NAME, &spec.repo_url, &spec.version_tag)
        .with_run_command(params.command.join(" "))
        .with_output("exit_code", output.exit_code);
    for (key, path) in &params.input_files {
        entry = entry.with_input(key.as_str(), path.as_str());
    }

    ctx.services
        .store
        .append_log_entry(&params.acquisition_id, entry)
        .await?;
    Ok(())
}
