// src/main.rs

use std::process::ExitCode;

use streamtask::cli::{self, Command, RunArgs};
use streamtask::{RunStatus, exec, logging, run};

fn main() -> ExitCode {
    let args = cli::parse();
    if let Err(err) = logging::init_logging(args.log_level) {
        eprintln!("streamtask error: {err:?}");
        return ExitCode::FAILURE;
    }

    match args.command {
        // Child mode stays synchronous; it never returns on success.
        Command::ExecJob { job } => match exec::exec_command_job(&job) {
            Ok(never) => match never {},
            Err(err) => {
                eprintln!("streamtask error: {err:?}");
                ExitCode::FAILURE
            }
        },
        Command::Run(run_args) => match run_main(run_args) {
            Ok(code) => code,
            Err(err) => {
                eprintln!("streamtask error: {err:?}");
                ExitCode::FAILURE
            }
        },
    }
}

fn run_main(args: RunArgs) -> anyhow::Result<ExitCode> {
    // The poll loop is a single task; a current-thread runtime keeps it that way.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let Some(status) = runtime.block_on(run(args))? else {
        return Ok(ExitCode::SUCCESS);
    };

    println!("{status}");
    Ok(ExitCode::from(exit_code(&status)))
}

fn exit_code(status: &RunStatus) -> u8 {
    match status {
        RunStatus::Done(_) => 0,
        RunStatus::Aborted => 130,
        RunStatus::Failed | RunStatus::Started => 1,
    }
}
