#![allow(dead_code)]

use std::error::Error;

use streamtask::ChildCommand;
use streamtask::exec::CommandJob;

pub use streamtask_test_utils::builders;
pub use streamtask_test_utils::{
    Record, RecordingTransport, abort_after, init_tracing, never_abort, with_timeout,
};

pub type TestResult = Result<(), Box<dyn Error>>;

/// Path of the binary under test.
pub const BIN: &str = env!("CARGO_BIN_EXE_streamtask");

/// A `sh -c` job.
pub fn sh(script: &str) -> CommandJob {
    CommandJob::new(script).shell(true)
}

/// Launch `job` through the binary's child mode.
pub fn child(job: &CommandJob) -> ChildCommand {
    ChildCommand::command_job(BIN, job).expect("job serializes")
}

pub const STARTED: &str = "sio_streamed_task_started";
pub const OUTPUT: &str = "sio_streamed_task_output";
pub const FINISHED: &str = "sio_streamed_task_finished";
