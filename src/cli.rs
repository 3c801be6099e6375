// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Command-line arguments for `streamtask`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "streamtask",
    version,
    about = "Run a command in an isolated process and stream its output to a Socket.IO server.",
    long_about = None
)]
pub struct CliArgs {
    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `STREAMTASK_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run a program and stream its output.
    Run(RunArgs),

    /// Child mode: execute a serialized job on inherited channels.
    #[command(name = "__exec-job", hide = true)]
    ExecJob {
        /// The job, as JSON.
        #[arg(long, value_name = "JSON")]
        job: String,
    },
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Streamtask.toml` in the current working directory, if present.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Socket.IO server to stream to; overrides `[transport].endpoint`.
    ///
    /// Without an endpoint, messages are printed as JSON lines.
    #[arg(long, value_name = "URL")]
    pub endpoint: Option<String>,

    /// Socket.IO namespace; overrides `[transport].namespace`.
    #[arg(long, value_name = "NS")]
    pub namespace: Option<String>,

    /// Identity attached to every message, as JSON.
    #[arg(long, value_name = "JSON", default_value = "null")]
    pub identity: String,

    /// Abort the run once this file exists.
    #[arg(long, value_name = "PATH")]
    pub abort_file: Option<PathBuf>,

    /// Run the program and its arguments as one `sh -c` command line.
    #[arg(long)]
    pub shell: bool,

    /// Print the effective configuration and job, but don't run anything.
    #[arg(long)]
    pub dry_run: bool,

    /// The program to run, followed by its arguments.
    #[arg(last = true, required = true, value_name = "PROGRAM")]
    pub program: Vec<String>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_collects_program_after_separator() {
        let args = CliArgs::try_parse_from([
            "streamtask",
            "run",
            "--identity",
            r#"{"uuid":"x"}"#,
            "--",
            "ls",
            "-la",
        ])
        .unwrap();

        let Command::Run(run) = args.command else {
            panic!("expected run subcommand");
        };
        assert_eq!(run.program, vec!["ls", "-la"]);
        assert_eq!(run.identity, r#"{"uuid":"x"}"#);
        assert!(!run.shell);
    }

    #[test]
    fn run_requires_a_program() {
        assert!(CliArgs::try_parse_from(["streamtask", "run"]).is_err());
    }

    #[test]
    fn hidden_child_mode_parses() {
        let args =
            CliArgs::try_parse_from(["streamtask", "__exec-job", "--job", "{}"]).unwrap();
        assert!(matches!(args.command, Command::ExecJob { ref job } if job == "{}"));
    }

    #[test]
    fn log_level_is_global() {
        let args = CliArgs::try_parse_from([
            "streamtask",
            "run",
            "--log-level",
            "debug",
            "--",
            "true",
        ])
        .unwrap();
        assert!(matches!(args.log_level, Some(LogLevel::Debug)));
    }
}
