use std::path::Path;

use arcscope_cli::commands::cli;
use arcscope_cli::flow;
use arcscope_core::api::{self as core_api, CliError, GatewayError, RunError};
use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

static LOG_GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
    std::sync::OnceLock::new();

#[tokio::main]
async fn main() {
    let exit = match real_main().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e}");
            exit_code_for_error(&e)
        }
    };

    std::process::exit(exit);
}

async fn real_main() -> Result<i32, CliError> {
    let args = cli::Args::parse();
    let mut cfg = match args.config.as_deref() {
        Some(path) => {
            let mut cfg = core_api::load_from_path(Path::new(path))
                .map_err(|e| CliError::Config(format!("{e:#}")))?;
            core_api::apply_env_overrides(&mut cfg, |key| std::env::var(key).ok());
            cfg
        }
        None => core_api::load_default().map_err(|e| CliError::Config(format!("{e:#}")))?,
    };
    if let Some(url) = args.backend_url.as_deref().filter(|u| !u.trim().is_empty()) {
        cfg.backend.base_url = url.to_string();
    }
    init_tracing(&cfg.logging).map_err(CliError::Command)?;

    match args.command {
        cli::Commands::Run(run_args) => flow::run::run_flow(run_args, &cfg).await,
        cli::Commands::Replay(replay_args) => flow::replay::replay_flow(replay_args, &cfg).await,
    }
}

fn exit_code_for_error(e: &CliError) -> i32 {
    // 0: success (1: the run itself ended in error)
    // 11: config error
    // 12: invalid run configuration
    // 20: transport / IO error
    // 30: operator action or continue rejected
    // 50: internal/uncategorized
    match e {
        CliError::Config(_) => 11,
        CliError::Run(re) => match re {
            RunError::Validation(_) => 12,
            RunError::Transport(_) => 20,
            RunError::Gateway(GatewayError::Transport(_)) => 20,
            RunError::Gateway(_) => 30,
            RunError::Transition(_) => 30,
            RunError::NotResumable(_) => 30,
        },
        CliError::Io(_) => 20,
        CliError::Command(_) => 20,
        CliError::Replay(_) => 50,
        CliError::Anyhow(_) => 50,
    }
}

fn init_tracing(logging: &core_api::LoggingConfig) -> Result<(), String> {
    if !logging.enabled {
        return Ok(());
    }

    let filter = match std::env::var("RUST_LOG") {
        Ok(v) if !v.trim().is_empty() => EnvFilter::from_default_env(),
        _ => EnvFilter::try_new(logging.level.clone()).map_err(|e| e.to_string())?,
    };

    let mut maybe_writer = None;

    if logging.file {
        let dir = match logging
            .directory
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            Some(d) => std::path::PathBuf::from(d),
            None => std::env::temp_dir().join("arcscope"),
        };

        std::fs::create_dir_all(&dir).map_err(|e| format!("create log dir failed: {e}"))?;
        let file_name = format!("arcscope.{}.log", std::process::id());
        let appender = tracing_appender::rolling::never(dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        let _ = LOG_GUARD.set(guard);
        maybe_writer = Some(non_blocking);
    }

    if !logging.console && maybe_writer.is_none() {
        return Err("logging disabled for both console and file".to_string());
    }

    let console_layer = logging.console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(atty::is(atty::Stream::Stderr))
    });

    let file_layer = maybe_writer.map(|w| {
        tracing_subscriber::fmt::layer()
            .with_writer(w)
            .with_ansi(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(())
}
