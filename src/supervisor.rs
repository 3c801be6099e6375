// src/supervisor.rs

//! Run supervisor: process setup, hand-off to the poll loop, teardown.
//!
//! A [`Run`] is single-use. [`Run::execute`] consumes it and always returns
//! exactly one [`RunStatus`]:
//!
//! 1. open the output and control channel pairs and spawn the
//!    [`ChildCommand`] in its own process group, handing it the write ends;
//! 2. connect the transport and emit `started`;
//! 3. drive the [`PollLoop`] until it reaches a terminal status;
//! 4. close the read ends, emit `finished`, wait the grace delay and
//!    disconnect;
//! 5. SIGKILL the child's process group and reap the child.
//!
//! A launch failure skips step 3 and resolves to `FAILED`; every other step
//! still runs.

use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::{Child, Command};
use tracing::{debug, error, info, warn};

use crate::channel::{ChannelPairs, ParentChannels, set_cloexec};
use crate::engine::{AbortProbe, PollLoop, RunEvents, RunSettings, RunStatus};
use crate::errors::Result;
use crate::exec::CommandJob;
use crate::transport::Transport;
use crate::types::TaskIdentity;

/// Hidden CLI subcommand that puts the binary into child mode.
pub const EXEC_JOB_SUBCOMMAND: &str = "__exec-job";

/// Program and arguments the supervisor launches as the isolated child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl ChildCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// `exe __exec-job --job <json>`: re-enter `exe` in child mode.
    pub fn command_job(exe: impl Into<PathBuf>, job: &CommandJob) -> Result<Self> {
        let json = serde_json::to_string(job)?;
        Ok(Self::new(exe)
            .arg(EXEC_JOB_SUBCOMMAND)
            .arg("--job")
            .arg(json))
    }

    /// Like [`ChildCommand::command_job`] for the running executable.
    pub fn current_exe_job(job: &CommandJob) -> Result<Self> {
        let exe = std::env::current_exe()?;
        Self::command_job(exe, job)
    }
}

/// A spawned child that leads its own process group.
struct IsolatedChild {
    child: Child,
    pid: u32,
}

impl IsolatedChild {
    /// Open both channel pairs and spawn `cmd` with the write ends.
    ///
    /// The parent's copies of the write ends are closed before returning, so
    /// end-of-stream on a channel means the child side is gone.
    fn spawn(cmd: &ChildCommand) -> Result<(Self, ParentChannels)> {
        let (read_ends, write_ends) = ChannelPairs::open()?.split();
        let (output_fd, control_fd) = write_ends.raw_fds();

        let mut command = Command::new(&cmd.program);
        command
            .args(&cmd.args)
            .envs(write_ends.env())
            .stdin(Stdio::null())
            .kill_on_drop(true);

        // SAFETY: only async-signal-safe calls (setpgid, fcntl) run between
        // fork and exec.
        unsafe {
            command.pre_exec(move || {
                if libc::setpgid(0, 0) < 0 {
                    return Err(io::Error::last_os_error());
                }
                set_cloexec(output_fd, false)?;
                set_cloexec(control_fd, false)?;
                Ok(())
            });
        }

        let child = command.spawn()?;
        drop(write_ends);

        let mut isolated = Self {
            pid: child.id().unwrap_or_default(),
            child,
        };

        match read_ends.into_receivers() {
            Ok(channels) => Ok((isolated, channels)),
            Err(e) => {
                isolated.kill_group();
                let _ = isolated.child.start_kill();
                Err(e.into())
            }
        }
    }

    fn kill_group(&self) {
        if self.pid == 0 {
            return;
        }
        // A negative pid addresses the whole group created in `pre_exec`.
        // SAFETY: kill(2) takes no pointers; a stale group yields ESRCH.
        if unsafe { libc::kill(-(self.pid as libc::pid_t), libc::SIGKILL) } != 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ESRCH) {
                warn!(pid = self.pid, error = %err, "failed to kill task process group");
            }
        }
    }

    /// SIGKILL the group, then the child itself, and reap it.
    async fn terminate(mut self) {
        self.kill_group();
        if let Err(e) = self.child.start_kill() {
            debug!(pid = self.pid, error = %e, "task process already gone");
        }
        match self.child.wait().await {
            Ok(status) => info!(pid = self.pid, %status, "killed task process"),
            Err(e) => warn!(pid = self.pid, error = %e, "failed to reap task process"),
        }
    }
}

/// One streamed execution of one job.
pub struct Run<T: Transport> {
    identity: TaskIdentity,
    transport: T,
    settings: RunSettings,
    abort: Box<AbortProbe>,
}

impl<T: Transport> Run<T> {
    pub fn new<F>(identity: TaskIdentity, transport: T, settings: RunSettings, abort: F) -> Self
    where
        F: FnMut() -> bool + Send + 'static,
    {
        Self {
            identity,
            transport,
            settings,
            abort: Box::new(abort),
        }
    }

    /// Launch `command`, stream its output and return the terminal status.
    ///
    /// No error escapes this function; faults resolve to
    /// [`RunStatus::Failed`].
    pub async fn execute(self, command: ChildCommand) -> RunStatus {
        let Run {
            identity,
            mut transport,
            settings,
            mut abort,
        } = self;

        let launched = IsolatedChild::spawn(&command);

        let mut events = RunEvents::new(
            &mut transport,
            &identity,
            &settings.event_name,
            &settings.namespace,
        );
        events
            .connect(settings.endpoint.as_deref().unwrap_or_default())
            .await;
        events.started().await;

        let (status, child) = match launched {
            Ok((child, channels)) => {
                info!(pid = child.pid, identity = %identity, "task process launched");
                let status = PollLoop::new(&channels, abort.as_mut(), &settings)
                    .run(&mut events)
                    .await;
                channels.close();
                (status, Some(child))
            }
            Err(e) => {
                error!(
                    program = %command.program.display(),
                    error = %e,
                    "failed to launch task process"
                );
                (RunStatus::Failed, None)
            }
        };

        events.finished().await;
        events.sleep(settings.disconnect_grace).await;
        events.disconnect().await;

        if let Some(child) = child {
            child.terminate().await;
        }

        info!(status = %status, "run finished");
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_job_re_enters_child_mode() {
        let job = CommandJob::new("echo").arg("hi");
        let cmd = ChildCommand::command_job("/bin/streamtask", &job).unwrap();

        assert_eq!(cmd.program, PathBuf::from("/bin/streamtask"));
        assert_eq!(cmd.args[0], EXEC_JOB_SUBCOMMAND);
        assert_eq!(cmd.args[1], "--job");

        let decoded: CommandJob =
            serde_json::from_str(cmd.args[2].to_str().unwrap()).unwrap();
        assert_eq!(decoded, job);
    }
}
