use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use arcscope_core::api::{AppConfig, ControllerOptions, RunBackend, RunController};

use crate::backend::{HttpRunBackend, ReplayRunBackend};

pub fn build_backend(cfg: &AppConfig) -> Result<Arc<dyn RunBackend>> {
    Ok(Arc::new(HttpRunBackend::new(&cfg.backend)?))
}

pub fn build_replay_backend(events_file: &Path, chunk_bytes: usize) -> Arc<dyn RunBackend> {
    Arc::new(ReplayRunBackend::new(events_file).with_chunk_bytes(chunk_bytes))
}

/// Controller wired to the configured HTTP backend.
pub fn build_controller(cfg: &AppConfig) -> Result<RunController> {
    Ok(RunController::from_config(build_backend(cfg)?, cfg))
}

/// Controller that folds a captured stream. Captures carry no credential.
pub fn build_replay_controller(
    events_file: &Path,
    chunk_bytes: usize,
    cfg: &AppConfig,
) -> RunController {
    let options = ControllerOptions {
        require_credential: false,
        ..ControllerOptions::from_config(cfg)
    };
    RunController::new(build_replay_backend(events_file, chunk_bytes), options)
}
