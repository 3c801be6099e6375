// src/exec/executor.rs

//! Child-side executor.
//!
//! Runs a [`Job`] against an [`UnbufferedSink`] over the output channel and
//! reports exactly one terminated result on the control channel:
//!
//! - the job's `Display` text when it returns normally;
//! - [`FAILED_SENTINEL`] when it returns an error or panics.
//!
//! The process never exits on its own afterwards. It parks until the parent
//! kills it, so "the child is gone" always means "the parent reaped it".

use std::convert::Infallible;
use std::fs::File;
use std::io::Write;
use std::panic::{AssertUnwindSafe, catch_unwind};

use tracing::{debug, error, warn};

use crate::channel::{ChildEnds, write_result};
use crate::errors::{Result, panic_message};
use crate::sink::UnbufferedSink;
use crate::types::FAILED_SENTINEL;

use super::job::{CommandJob, Job};

/// Execute `job`, report its result and wait to be killed.
pub fn run_isolated<J: Job>(job: J, ends: ChildEnds) -> ! {
    let ChildEnds { output, control } = ends;
    let mut sink = UnbufferedSink::new(File::from(output));

    let result = match catch_unwind(AssertUnwindSafe(|| job.run(&mut sink))) {
        Ok(Ok(value)) => value.to_string(),
        Ok(Err(e)) => {
            error!(error = ?e, "job failed");
            FAILED_SENTINEL.to_string()
        }
        Err(panic) => {
            error!(panic = %panic_message(panic.as_ref()), "job panicked");
            FAILED_SENTINEL.to_string()
        }
    };

    if let Err(e) = sink.flush() {
        warn!(error = %e, "flushing the output channel failed");
    }

    let mut control = File::from(control);
    match write_result(&mut control, &result) {
        Ok(()) => debug!(result = %result, "result reported"),
        Err(e) => error!(error = %e, "reporting the result failed"),
    }

    drop(sink);
    drop(control);

    idle_until_killed()
}

/// Block the calling process until it is killed from outside.
pub fn idle_until_killed() -> ! {
    loop {
        std::thread::park();
    }
}

/// Child-mode entry point: adopt the inherited channels and run the
/// serialized [`CommandJob`].
///
/// Returns only when the channels cannot be adopted; a job description that
/// does not parse is reported as a failed job.
pub fn exec_command_job(job_json: &str) -> Result<Infallible> {
    let ends = ChildEnds::from_env()?;

    match serde_json::from_str::<CommandJob>(job_json) {
        Ok(job) => run_isolated(job, ends),
        Err(e) => run_isolated(
            move |_: &mut (dyn Write + Send)| -> anyhow::Result<String> {
                Err(anyhow::Error::new(e).context("decoding job description"))
            },
            ends,
        ),
    }
}
