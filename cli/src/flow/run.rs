use std::io::Write;

use arcscope_core::api::{
    gateway_open, AppConfig, CliError, RunConfiguration, RunController, RunNotice, RunState,
    RunStatus,
};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::broadcast;

use crate::commands::cli::{OutputFormat, RunArgs};
use crate::commands::operator::{parse_command, OperatorCommand, HELP};
use crate::render::{format_frame, format_status, RunReport, TimelinePrinter};

use super::print_report;

enum Next {
    Resumed,
    Quit,
}

/// 0 unless the run ended in `error`.
pub fn exit_code_for_status(status: RunStatus) -> i32 {
    match status {
        RunStatus::Error => 1,
        _ => 0,
    }
}

pub async fn build_configuration(args: &RunArgs) -> Result<RunConfiguration, CliError> {
    let instructions = match &args.instructions_file {
        Some(path) => tokio::fs::read_to_string(path).await?,
        None => args.instructions.clone(),
    };
    let mut config = RunConfiguration::new(&args.target, &args.agent, args.max_turns)
        .with_instructions(instructions);
    if let Some(credential) = args.credential.as_deref().filter(|c| !c.trim().is_empty()) {
        config = config.with_credential(credential);
    }
    Ok(config)
}

pub async fn run_flow(args: RunArgs, cfg: &AppConfig) -> Result<i32, CliError> {
    let config = build_configuration(&args).await?;
    let controller = arcscope_plugins::factory::build_controller(cfg)?;
    let run_id = uuid::Uuid::new_v4();
    tracing::info!(
        target: "arcscope.cli",
        stage = "run.begin",
        run_id = %run_id,
        backend = %cfg.backend.base_url,
        config = ?config
    );

    let to_stdout = args.format == OutputFormat::Text;
    let mut printer = TimelinePrinter::default();
    let mut notices = controller.subscribe();
    controller.start(config).await?;

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    loop {
        follow(&controller, &mut notices, &mut printer, to_stdout).await;

        if !(args.interactive && controller.read(can_steer)) {
            break;
        }
        match operator_loop(&controller, &mut stdin, &mut printer, to_stdout).await? {
            Next::Resumed => continue,
            Next::Quit => break,
        }
    }

    let state = controller.snapshot();
    tracing::info!(
        target: "arcscope.cli",
        stage = "run.end",
        run_id = %run_id,
        status = %state.status,
        frames = state.frames.len()
    );
    print_report(&RunReport::from_state(&state), args.format)?;
    Ok(exit_code_for_status(state.status))
}

/// Whether the operator still has anything to send.
fn can_steer(state: &RunState) -> bool {
    state.status == RunStatus::Paused || gateway_open(state)
}

fn emit(lines: Vec<String>, to_stdout: bool) {
    for line in lines {
        if to_stdout {
            println!("{line}");
        } else {
            eprintln!("{line}");
        }
    }
}

/// Print progress until the stream settles. Ctrl-C cancels the run.
async fn follow(
    controller: &RunController,
    notices: &mut broadcast::Receiver<RunNotice>,
    printer: &mut TimelinePrinter,
    to_stdout: bool,
) {
    loop {
        let (lines, settled) = controller.read(|state| {
            (
                printer.drain(state),
                !matches!(state.status, RunStatus::Idle | RunStatus::Running),
            )
        });
        emit(lines, to_stdout);
        if settled {
            return;
        }

        tokio::select! {
            notice = notices.recv() => match notice {
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return,
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!(target: "arcscope.cli", stage = "run.interrupt");
                controller.cancel();
            }
        }
    }
}

async fn operator_loop(
    controller: &RunController,
    stdin: &mut Lines<BufReader<Stdin>>,
    printer: &mut TimelinePrinter,
    to_stdout: bool,
) -> Result<Next, CliError> {
    eprintln!("{}", controller.read(format_status));
    eprintln!("type `help` for commands");
    loop {
        eprint!("> ");
        std::io::stderr().flush()?;

        let Some(line) = stdin.next_line().await? else {
            return Ok(Next::Quit);
        };
        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };

        match command {
            OperatorCommand::Continue(message) => match controller.continue_run(&message).await {
                Ok(()) => return Ok(Next::Resumed),
                Err(e) => eprintln!("{e}"),
            },
            OperatorCommand::Action(action) => {
                if let Err(e) = controller.manual_action(action).await {
                    eprintln!("action failed: {e}");
                }
                emit(controller.read(|s| printer.drain(s)), to_stdout);
                if !controller.read(can_steer) {
                    eprintln!("{}", controller.read(format_status));
                    return Ok(Next::Quit);
                }
            }
            OperatorCommand::Frame(index) => {
                controller.select_frame(index);
                match controller.read(format_frame) {
                    Some(line) => eprintln!("{line}"),
                    None => eprintln!("no frames yet"),
                }
            }
            OperatorCommand::Status => eprintln!("{}", controller.read(format_status)),
            OperatorCommand::Help => eprintln!("{HELP}"),
            OperatorCommand::Quit => return Ok(Next::Quit),
        }
    }
}
