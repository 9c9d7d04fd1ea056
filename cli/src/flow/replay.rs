use std::path::Path;

use arcscope_core::api::{AppConfig, CliError, RunConfiguration, RunState};
use arcscope_plugins::factory::build_replay_controller;

use crate::commands::cli::ReplayArgs;
use crate::render::RunReport;

use super::print_report;

/// Fold a captured stream through the same controller a live run uses.
pub async fn replay_state(args: &ReplayArgs, cfg: &AppConfig) -> Result<RunState, CliError> {
    let controller = build_replay_controller(Path::new(&args.events), args.chunk_bytes, cfg);

    controller
        .start(RunConfiguration::new("replay", "replay", 1))
        .await
        .map_err(|e| CliError::Replay(e.to_string()))?;
    controller.wait().await;
    Ok(controller.snapshot())
}

pub async fn replay_flow(args: ReplayArgs, cfg: &AppConfig) -> Result<i32, CliError> {
    let state = replay_state(&args, cfg).await?;
    tracing::debug!(
        target: "arcscope.cli",
        stage = "replay.done",
        events = %args.events,
        status = %state.status,
        frames = state.frames.len()
    );
    print_report(&RunReport::from_state(&state), args.format)?;
    Ok(0)
}
