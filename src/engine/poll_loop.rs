// src/engine/poll_loop.rs

//! Parent-side poll loop.
//!
//! One iteration:
//! 1. cooperative sleep (`read_sleep`, ~10 ms) through the transport;
//! 2. zero-timeout read of the output channel, forwarded as one `output`
//!    message per ready read (at most `max_read_bytes`);
//! 3. every `abort_poll_interval` of accumulated time, one call to the abort
//!    probe;
//! 4. zero-timeout read of the control channel; a result ends the loop.
//!
//! The control message is the result text followed by
//! [`RESULT_TERMINATOR`]. Once its first byte arrives the loop keeps reading
//! until the terminator, so results of any length (including the empty one)
//! come through whole.
//!
//! Any error or panic inside the loop ends it with `FAILED`. Bytes the child
//! writes after the last output read of the tick that detects an abort are
//! dropped.

use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use tokio::net::unix::pipe;
use tracing::{info, warn};

use crate::channel::{ParentChannels, RESULT_TERMINATOR, read_ready};
use crate::errors::{Result, StreamTaskError, panic_message};
use crate::transport::Transport;

use super::events::RunEvents;
use super::status::{RunStatus, StatusMachine};
use super::utf8::Utf8Chunker;
use super::{AbortProbe, RunSettings};

pub struct PollLoop<'a> {
    channels: &'a ParentChannels,
    abort: &'a mut AbortProbe,
    settings: &'a RunSettings,
}

impl<'a> PollLoop<'a> {
    pub fn new(
        channels: &'a ParentChannels,
        abort: &'a mut AbortProbe,
        settings: &'a RunSettings,
    ) -> Self {
        Self {
            channels,
            abort,
            settings,
        }
    }

    /// Drive the run to a terminal status. Never fails.
    pub async fn run<T: Transport + ?Sized>(mut self, events: &mut RunEvents<'_, T>) -> RunStatus {
        let mut machine = StatusMachine::new();

        let status = match AssertUnwindSafe(self.poll(events)).catch_unwind().await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                warn!(error = %e, "exception during execution");
                RunStatus::Failed
            }
            Err(panic) => {
                warn!(panic = %panic_message(panic.as_ref()), "panic during execution");
                RunStatus::Failed
            }
        };

        machine.finish(status);
        machine.into_status()
    }

    async fn poll<T: Transport + ?Sized>(&mut self, events: &mut RunEvents<'_, T>) -> Result<RunStatus> {
        let mut buf = vec![0u8; self.settings.max_read_bytes];
        let mut chunker = Utf8Chunker::new();
        let mut since_probe = Duration::ZERO;

        loop {
            let tick = Instant::now();
            events.sleep(self.settings.read_sleep).await;
            since_probe += tick.elapsed();

            if let Some(n) = read_ready(&self.channels.output, &mut buf)? {
                forward(events, &mut chunker, &buf[..n]).await;
            }

            if since_probe > self.settings.abort_poll_interval {
                since_probe = Duration::ZERO;
                if (self.abort)() {
                    info!("aborting task");
                    return Ok(RunStatus::Aborted);
                }
            }

            match read_ready(&self.channels.control, &mut buf)? {
                None => {}
                Some(0) => {
                    return Err(StreamTaskError::ChannelError(
                        "control channel closed before the job reported a result".to_string(),
                    ));
                }
                Some(n) => {
                    let mut result = buf[..n].to_vec();
                    self.read_result(events, &mut buf, &mut result).await?;

                    // The child flushes its output before reporting, so whatever
                    // it wrote is already sitting in the output pipe.
                    drain_output(&self.channels.output, events, &mut chunker, &mut buf).await?;

                    let text = String::from_utf8_lossy(&result).into_owned();
                    info!(status = %text, "task done");
                    return Ok(RunStatus::from_result_text(&text));
                }
            }
        }
    }

    /// Read the rest of the control message into `result` and strip the
    /// terminator.
    async fn read_result<T: Transport + ?Sized>(
        &self,
        events: &mut RunEvents<'_, T>,
        buf: &mut [u8],
        result: &mut Vec<u8>,
    ) -> Result<()> {
        loop {
            if result.last() == Some(&RESULT_TERMINATOR) {
                result.pop();
                return Ok(());
            }
            match read_ready(&self.channels.control, buf)? {
                Some(0) => {
                    return Err(StreamTaskError::ChannelError(
                        "control channel closed before the result was complete".to_string(),
                    ));
                }
                Some(n) => result.extend_from_slice(&buf[..n]),
                None => events.sleep(self.settings.read_sleep).await,
            }
        }
    }
}

async fn forward<T: Transport + ?Sized>(
    events: &mut RunEvents<'_, T>,
    chunker: &mut Utf8Chunker,
    bytes: &[u8],
) {
    let text = chunker.push(bytes);
    if !text.is_empty() {
        events.output(text).await;
    }
}

async fn drain_output<T: Transport + ?Sized>(
    output: &pipe::Receiver,
    events: &mut RunEvents<'_, T>,
    chunker: &mut Utf8Chunker,
    buf: &mut [u8],
) -> Result<()> {
    while let Some(n) = read_ready(output, buf)? {
        if n == 0 {
            break;
        }
        forward(events, chunker, &buf[..n]).await;
    }
    if chunker.has_pending() {
        events.output(chunker.finish()).await;
    }
    Ok(())
}
