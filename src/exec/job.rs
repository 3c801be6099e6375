// src/exec/job.rs

//! The unit of work executed inside the isolated child.
//!
//! A job receives one argument, the output sink, and returns a value whose
//! `Display` text becomes the run's result. Closures qualify through a
//! blanket impl; [`CommandJob`] covers the common "run this program" case
//! used by the CLI.

use std::fmt::Display;
use std::io::{self, Read, Write};
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::channel::{CONTROL_FD_ENV, OUTPUT_FD_ENV};

/// Work executed once inside the child process.
pub trait Job {
    type Output: Display;

    fn run(self, sink: &mut (dyn Write + Send)) -> Result<Self::Output>;
}

impl<F, T> Job for F
where
    F: FnOnce(&mut (dyn Write + Send)) -> Result<T>,
    T: Display,
{
    type Output = T;

    fn run(self, sink: &mut (dyn Write + Send)) -> Result<T> {
        self(sink)
    }
}

/// An external program whose stdout and stderr become the run's output and
/// whose exit code becomes the run's result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandJob {
    pub program: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Run `program args...` as one `sh -c` command line.
    #[serde(default)]
    pub shell: bool,

    /// Working directory; inherited when `None`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

impl CommandJob {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            shell: false,
            dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn shell(mut self, shell: bool) -> Self {
        self.shell = shell;
        self
    }

    /// Human-readable command line, used for logging and dry runs.
    pub fn display_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn command(&self) -> Command {
        let mut cmd = if self.shell {
            let mut c = Command::new("sh");
            c.arg("-c").arg(self.display_line());
            c
        } else {
            let mut c = Command::new(&self.program);
            c.args(&self.args);
            c
        };

        if let Some(dir) = &self.dir {
            cmd.current_dir(dir);
        }

        // The channels belong to this process only.
        cmd.env_remove(OUTPUT_FD_ENV)
            .env_remove(CONTROL_FD_ENV)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

impl Job for CommandJob {
    type Output = i32;

    fn run(self, sink: &mut (dyn Write + Send)) -> Result<i32> {
        info!(cmd = %self.display_line(), shell = self.shell, "starting job process");

        let mut child = self
            .command()
            .spawn()
            .with_context(|| format!("spawning '{}'", self.program))?;

        let stdout = child.stdout.take().context("job stdout was not captured")?;
        let stderr = child.stderr.take().context("job stderr was not captured")?;

        let sink = Mutex::new(sink);
        std::thread::scope(|scope| -> Result<()> {
            let err_copy = scope.spawn(|| copy_into(stderr, &sink));
            copy_into(stdout, &sink).context("copying job stdout")?;
            match err_copy.join() {
                Ok(copied) => copied.context("copying job stderr"),
                Err(_) => bail!("stderr copier panicked"),
            }
        })?;

        let status = child
            .wait()
            .with_context(|| format!("waiting for '{}'", self.program))?;

        match status.code() {
            Some(code) => {
                debug!(exit_code = code, "job process exited");
                Ok(code)
            }
            None => bail!(
                "'{}' was terminated by signal {}",
                self.program,
                status.signal().unwrap_or_default()
            ),
        }
    }
}

/// Forward everything `src` produces into the shared sink, one read at a
/// time so stdout and stderr interleave roughly as produced.
fn copy_into(mut src: impl Read, sink: &Mutex<&mut (dyn Write + Send)>) -> io::Result<()> {
    let mut buf = [0u8; 8192];
    loop {
        let n = match src.read(&mut buf) {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        let mut guard = sink.lock().unwrap_or_else(PoisonError::into_inner);
        guard.write_all(&buf[..n])?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_job<J: Job>(job: J) -> (Result<String>, String) {
        let mut out: Vec<u8> = Vec::new();
        let result = job.run(&mut out).map(|v| v.to_string());
        (result, String::from_utf8_lossy(&out).into_owned())
    }

    #[test]
    fn closures_are_jobs() {
        let (result, out) = run_job(|sink: &mut (dyn Write + Send)| -> Result<u32> {
            sink.write_all(b"hello")?;
            Ok(7)
        });
        assert_eq!(result.unwrap(), "7");
        assert_eq!(out, "hello");
    }

    #[test]
    fn command_output_and_exit_code_are_captured() {
        let job = CommandJob::new("printf 'out\\n'; printf 'err\\n' >&2; exit 3").shell(true);
        let (result, out) = run_job(job);
        assert_eq!(result.unwrap(), "3");
        assert!(out.contains("out\n"), "stdout missing from {out:?}");
        assert!(out.contains("err\n"), "stderr missing from {out:?}");
    }

    #[test]
    fn arguments_are_passed_verbatim_without_shell() {
        let job = CommandJob::new("printf").args(["%s|%s", "a b", "$HOME"]);
        let (result, out) = run_job(job);
        assert_eq!(result.unwrap(), "0");
        assert_eq!(out, "a b|$HOME");
    }

    #[test]
    fn missing_program_is_a_job_fault() {
        let (result, _) = run_job(CommandJob::new("/definitely/not/a/program"));
        assert!(result.is_err());
    }

    #[test]
    fn termination_by_signal_is_a_job_fault() {
        let job = CommandJob::new("kill -9 $$").shell(true);
        let (result, _) = run_job(job);
        let err = result.unwrap_err();
        assert!(err.to_string().contains("signal 9"), "unexpected error: {err}");
    }

    #[test]
    fn deserializes_with_defaults() {
        let job: CommandJob = serde_json::from_str(r#"{"program":"ls"}"#).unwrap();
        assert_eq!(job, CommandJob::new("ls"));
        assert_eq!(job.display_line(), "ls");
    }
}
