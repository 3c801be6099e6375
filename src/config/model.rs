// src/config/model.rs

use serde::{Deserialize, Serialize};

use crate::types::DEFAULT_EVENT_NAME;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [transport]
/// endpoint = "http://localhost:80"
/// namespace = "/pty"
///
/// [poll]
/// read_sleep_ms = 10
/// max_read_bytes = 20480
/// abort_poll_ms = 200
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub transport: TransportSection,

    #[serde(default)]
    pub poll: PollSection,
}

/// Validated configuration.
///
/// Only obtainable through `TryFrom<RawConfigFile>` (or [`ConfigFile::default`]),
/// so holders can rely on the ranges checked in `validate.rs`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfigFile {
    pub transport: TransportSection,
    pub poll: PollSection,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(transport: TransportSection, poll: PollSection) -> Self {
        Self { transport, poll }
    }
}

/// `[transport]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportSection {
    /// Socket.IO server (`http`, `https`, `ws` or `wss`).
    ///
    /// When absent, messages are written as JSON lines to stdout.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Socket.IO namespace every message is sent on.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Event name every message is emitted under.
    #[serde(default = "default_event_name")]
    pub event_name: String,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Pause between the `finished` message and disconnecting, so the
    /// message can leave before the socket closes.
    #[serde(default = "default_disconnect_grace_ms")]
    pub disconnect_grace_ms: u64,
}

fn default_namespace() -> String {
    "/".to_string()
}

fn default_event_name() -> String {
    DEFAULT_EVENT_NAME.to_string()
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_disconnect_grace_ms() -> u64 {
    2000
}

impl Default for TransportSection {
    fn default() -> Self {
        Self {
            endpoint: None,
            namespace: default_namespace(),
            event_name: default_event_name(),
            connect_timeout_ms: default_connect_timeout_ms(),
            disconnect_grace_ms: default_disconnect_grace_ms(),
        }
    }
}

/// `[poll]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollSection {
    /// Sleep between poll loop iterations.
    #[serde(default = "default_read_sleep_ms")]
    pub read_sleep_ms: u64,

    /// Largest single read from the output channel, and so the largest
    /// `output` message.
    #[serde(default = "default_max_read_bytes")]
    pub max_read_bytes: usize,

    /// How often the abort probe is consulted.
    #[serde(default = "default_abort_poll_ms")]
    pub abort_poll_ms: u64,
}

fn default_read_sleep_ms() -> u64 {
    10
}

fn default_max_read_bytes() -> usize {
    1024 * 20
}

fn default_abort_poll_ms() -> u64 {
    200
}

impl Default for PollSection {
    fn default() -> Self {
        Self {
            read_sleep_ms: default_read_sleep_ms(),
            max_read_bytes: default_max_read_bytes(),
            abort_poll_ms: default_abort_poll_ms(),
        }
    }
}
