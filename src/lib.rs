// src/lib.rs

pub mod channel;
pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod sink;
pub mod supervisor;
pub mod transport;
pub mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::{debug, info, warn};

use crate::cli::RunArgs;
use crate::config::{ConfigFile, load_or_default};
use crate::exec::CommandJob;
use crate::transport::socketio::websocket_url;
use crate::transport::{JsonLinesTransport, SocketIoTransport, Transport};
use crate::types::TaskIdentity;

pub use crate::engine::{RunSettings, RunStatus};
pub use crate::supervisor::{ChildCommand, Run};

/// High-level entry point used by `main.rs` for `streamtask run`.
///
/// This wires together:
/// - config loading and CLI overrides
/// - transport selection
/// - the abort probe (abort file + Ctrl-C)
/// - the supervised run itself
///
/// Returns `None` for a dry run.
pub async fn run(args: RunArgs) -> Result<Option<RunStatus>> {
    let cfg = load_or_default(args.config.as_deref())?;
    let settings = effective_settings(&cfg, &args)?;

    let identity: TaskIdentity = serde_json::from_str(&args.identity)
        .with_context(|| format!("--identity is not valid JSON: {}", args.identity))?;

    let job = command_job(&args)?;

    if args.dry_run {
        print_dry_run(&cfg, &settings, &identity, &job);
        return Ok(None);
    }

    let transport: Box<dyn Transport> = match settings.endpoint {
        Some(ref endpoint) => {
            info!(endpoint = %endpoint, namespace = %settings.namespace, "streaming over socket.io");
            Box::new(SocketIoTransport::new(Duration::from_millis(
                cfg.transport.connect_timeout_ms,
            )))
        }
        None => {
            debug!("no endpoint configured; writing messages as JSON lines");
            Box::new(JsonLinesTransport::stdout())
        }
    };

    let child = ChildCommand::current_exe_job(&job)?;
    let abort = abort_probe(args.abort_file.clone());

    let status = Run::new(identity, transport, settings, abort)
        .execute(child)
        .await;
    Ok(Some(status))
}

/// Config values with the CLI overrides applied.
fn effective_settings(cfg: &ConfigFile, args: &RunArgs) -> Result<RunSettings> {
    let mut settings = RunSettings::from(cfg);

    if let Some(endpoint) = &args.endpoint {
        websocket_url(endpoint).with_context(|| format!("--endpoint '{endpoint}'"))?;
        settings.endpoint = Some(endpoint.clone());
    }

    if let Some(namespace) = &args.namespace {
        if !namespace.starts_with('/') {
            bail!("--namespace must start with '/' (got '{namespace}')");
        }
        settings.namespace = namespace.clone();
    }

    Ok(settings)
}

fn command_job(args: &RunArgs) -> Result<CommandJob> {
    let Some((program, rest)) = args.program.split_first() else {
        bail!("no program given");
    };
    let mut job = CommandJob::new(program.clone())
        .args(rest.iter().cloned())
        .shell(args.shell);
    job.dir = std::env::current_dir().ok();
    Ok(job)
}

/// Abort once `abort_file` exists or Ctrl-C was received.
///
/// Must be called from within a Tokio runtime.
fn abort_probe(abort_file: Option<PathBuf>) -> impl FnMut() -> bool + Send + 'static {
    let interrupted = Arc::new(AtomicBool::new(false));

    {
        let flag = Arc::clone(&interrupted);
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Ctrl-C received; aborting run");
                    flag.store(true, Ordering::SeqCst);
                }
                Err(e) => warn!(error = %e, "failed to listen for Ctrl+C"),
            }
        });
    }

    move || interrupted.load(Ordering::SeqCst) || abort_file.as_deref().is_some_and(Path::exists)
}

/// Simple dry-run output: print effective settings and the job.
fn print_dry_run(cfg: &ConfigFile, settings: &RunSettings, identity: &TaskIdentity, job: &CommandJob) {
    println!("streamtask dry-run");
    println!(
        "  transport.endpoint = {}",
        settings.endpoint.as_deref().unwrap_or("(none: JSON lines on stdout)")
    );
    println!("  transport.namespace = {}", settings.namespace);
    println!("  transport.event_name = {}", settings.event_name);
    println!("  transport.connect_timeout_ms = {}", cfg.transport.connect_timeout_ms);
    println!("  transport.disconnect_grace_ms = {}", settings.disconnect_grace.as_millis());
    println!("  poll.read_sleep_ms = {}", settings.read_sleep.as_millis());
    println!("  poll.max_read_bytes = {}", settings.max_read_bytes);
    println!("  poll.abort_poll_ms = {}", settings.abort_poll_interval.as_millis());
    println!();
    println!("identity: {identity}");
    println!("job:");
    println!("  cmd: {}", job.display_line());
    if job.shell {
        println!("  shell: true");
    }
    if let Some(dir) = &job.dir {
        println!("  dir: {}", dir.display());
    }

    debug!("dry-run complete (no execution)");
}
