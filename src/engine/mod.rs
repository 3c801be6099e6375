// src/engine/mod.rs

//! Parent-side engine of a streamed run.
//!
//! - [`status`] holds the `STARTED → ABORTED | FAILED | DONE` state machine.
//! - [`poll_loop`] multiplexes the output channel, the control channel and
//!   the abort probe until a terminal status is reached.
//! - [`events`] turns loop activity into transport messages.
//! - [`utf8`] decodes output chunks without splitting characters.

use std::time::Duration;

use crate::config::ConfigFile;
use crate::types::DEFAULT_EVENT_NAME;

/// Caller-supplied cancellation predicate, polled at a bounded rate.
pub type AbortProbe = dyn FnMut() -> bool + Send;

/// Timing and addressing knobs of a single run.
#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Transport endpoint; `None` lets the transport pick its own sink.
    pub endpoint: Option<String>,
    pub namespace: String,
    pub event_name: String,
    /// Pause between loop iterations.
    pub read_sleep: Duration,
    /// Upper bound for a single output read (and thus a single message).
    pub max_read_bytes: usize,
    /// How often the abort probe is consulted.
    pub abort_poll_interval: Duration,
    /// Pause after the `finished` message before disconnecting.
    pub disconnect_grace: Duration,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            namespace: "/".to_string(),
            event_name: DEFAULT_EVENT_NAME.to_string(),
            read_sleep: Duration::from_millis(10),
            max_read_bytes: 1024 * 20,
            abort_poll_interval: Duration::from_millis(200),
            disconnect_grace: Duration::from_secs(2),
        }
    }
}

impl From<&ConfigFile> for RunSettings {
    fn from(cfg: &ConfigFile) -> Self {
        Self {
            endpoint: cfg.transport.endpoint.clone(),
            namespace: cfg.transport.namespace.clone(),
            event_name: cfg.transport.event_name.clone(),
            read_sleep: Duration::from_millis(cfg.poll.read_sleep_ms),
            max_read_bytes: cfg.poll.max_read_bytes,
            abort_poll_interval: Duration::from_millis(cfg.poll.abort_poll_ms),
            disconnect_grace: Duration::from_millis(cfg.transport.disconnect_grace_ms),
        }
    }
}

pub mod events;
pub mod poll_loop;
pub mod status;
pub mod utf8;

pub use events::RunEvents;
pub use poll_loop::PollLoop;
pub use status::{RunStatus, StatusMachine};
pub use utf8::Utf8Chunker;
