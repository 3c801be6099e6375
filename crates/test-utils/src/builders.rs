#![allow(dead_code)]

use std::time::Duration;

use streamtask::config::{ConfigFile, PollSection, RawConfigFile, TransportSection};
use streamtask::engine::RunSettings;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                transport: TransportSection::default(),
                poll: PollSection::default(),
            },
        }
    }

    pub fn endpoint(mut self, endpoint: &str) -> Self {
        self.config.transport.endpoint = Some(endpoint.to_string());
        self
    }

    pub fn namespace(mut self, namespace: &str) -> Self {
        self.config.transport.namespace = namespace.to_string();
        self
    }

    pub fn disconnect_grace_ms(mut self, ms: u64) -> Self {
        self.config.transport.disconnect_grace_ms = ms;
        self
    }

    pub fn read_sleep_ms(mut self, ms: u64) -> Self {
        self.config.poll.read_sleep_ms = ms;
        self
    }

    pub fn max_read_bytes(mut self, bytes: usize) -> Self {
        self.config.poll.max_read_bytes = bytes;
        self
    }

    pub fn abort_poll_ms(mut self, ms: u64) -> Self {
        self.config.poll.abort_poll_ms = ms;
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Default run settings with a short grace delay, so tests don't wait 2s
/// after every run.
pub fn quick_settings() -> RunSettings {
    RunSettings {
        disconnect_grace: Duration::from_millis(20),
        ..RunSettings::from(&ConfigFileBuilder::new().build())
    }
}
