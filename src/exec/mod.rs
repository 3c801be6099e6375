// src/exec/mod.rs

//! Child-side execution layer.
//!
//! Everything in here runs inside the isolated child process that the
//! [`supervisor`](crate::supervisor) spawns:
//!
//! - [`job`] defines the [`Job`] contract and the built-in [`CommandJob`],
//!   which runs an external program with `std::process::Command`.
//! - [`executor`] binds a job to the output channel, reports its result on
//!   the control channel and then parks until the parent kills the process.

pub mod executor;
pub mod job;

pub use executor::{exec_command_job, idle_until_killed, run_isolated};
pub use job::{CommandJob, Job};
