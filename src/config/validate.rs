// src/config/validate.rs

use crate::config::model::{ConfigFile, PollSection, RawConfigFile, TransportSection};
use crate::errors::{Result, StreamTaskError};
use crate::transport::socketio::websocket_url;

/// Largest accepted `[poll].max_read_bytes`; the read buffer is allocated
/// at this size up front.
pub const MAX_READ_BYTES_LIMIT: usize = 16 * 1024 * 1024;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::StreamTaskError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.transport, raw.poll))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_transport(&cfg.transport)?;
    validate_poll(&cfg.poll)?;
    Ok(())
}

fn validate_transport(t: &TransportSection) -> Result<()> {
    if !t.namespace.starts_with('/') {
        return Err(StreamTaskError::ConfigError(format!(
            "[transport].namespace must start with '/' (got '{}')",
            t.namespace
        )));
    }

    if t.event_name.trim().is_empty() {
        return Err(StreamTaskError::ConfigError(
            "[transport].event_name must not be empty".to_string(),
        ));
    }

    ensure_positive("[transport].connect_timeout_ms", t.connect_timeout_ms)?;

    if let Some(endpoint) = &t.endpoint {
        websocket_url(endpoint).map_err(|_| {
            StreamTaskError::ConfigError(format!(
                "[transport].endpoint '{endpoint}' must be an http, https, ws or wss URL"
            ))
        })?;
    }

    Ok(())
}

fn validate_poll(p: &PollSection) -> Result<()> {
    ensure_positive("[poll].read_sleep_ms", p.read_sleep_ms)?;
    ensure_positive("[poll].max_read_bytes", p.max_read_bytes as u64)?;
    if p.max_read_bytes > MAX_READ_BYTES_LIMIT {
        return Err(StreamTaskError::ConfigError(format!(
            "[poll].max_read_bytes must be <= {MAX_READ_BYTES_LIMIT} (got {})",
            p.max_read_bytes
        )));
    }
    ensure_positive("[poll].abort_poll_ms", p.abort_poll_ms)?;
    Ok(())
}

fn ensure_positive(field: &str, value: u64) -> Result<()> {
    if value == 0 {
        return Err(StreamTaskError::ConfigError(format!(
            "{field} must be >= 1 (got 0)"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<ConfigFile> {
        let raw: RawConfigFile = toml::from_str(toml_src)?;
        ConfigFile::try_from(raw)
    }

    #[test]
    fn empty_file_yields_defaults() {
        let cfg = parse("").unwrap();
        assert_eq!(cfg.transport.endpoint, None);
        assert_eq!(cfg.transport.namespace, "/");
        assert_eq!(cfg.transport.event_name, "sio_streamed_task_data");
        assert_eq!(cfg.transport.disconnect_grace_ms, 2000);
        assert_eq!(cfg.poll.read_sleep_ms, 10);
        assert_eq!(cfg.poll.max_read_bytes, 20480);
        assert_eq!(cfg.poll.abort_poll_ms, 200);
    }

    #[test]
    fn full_file_is_accepted() {
        let cfg = parse(
            r#"
            [transport]
            endpoint = "http://push-server:80"
            namespace = "/pty"
            disconnect_grace_ms = 0

            [poll]
            max_read_bytes = 4096
            "#,
        )
        .unwrap();
        assert_eq!(cfg.transport.endpoint.as_deref(), Some("http://push-server:80"));
        assert_eq!(cfg.transport.namespace, "/pty");
        assert_eq!(cfg.transport.disconnect_grace_ms, 0);
        assert_eq!(cfg.poll.max_read_bytes, 4096);
    }

    #[test]
    fn namespace_without_leading_slash_is_rejected() {
        let err = parse("[transport]\nnamespace = \"pty\"").unwrap_err();
        assert!(matches!(err, StreamTaskError::ConfigError(ref m) if m.contains("namespace")));
    }

    #[test]
    fn zero_poll_values_are_rejected() {
        for field in ["read_sleep_ms", "max_read_bytes", "abort_poll_ms"] {
            let err = parse(&format!("[poll]\n{field} = 0")).unwrap_err();
            assert!(
                matches!(err, StreamTaskError::ConfigError(ref m) if m.contains(field)),
                "{field}: {err}"
            );
        }
    }

    #[test]
    fn oversized_read_buffer_is_rejected() {
        let err = parse(&format!("[poll]\nmax_read_bytes = {}", MAX_READ_BYTES_LIMIT + 1)).unwrap_err();
        assert!(matches!(err, StreamTaskError::ConfigError(ref m) if m.contains("max_read_bytes")));

        let cfg = parse(&format!("[poll]\nmax_read_bytes = {MAX_READ_BYTES_LIMIT}")).unwrap();
        assert_eq!(cfg.poll.max_read_bytes, MAX_READ_BYTES_LIMIT);
    }

    #[test]
    fn unsupported_endpoint_scheme_is_rejected() {
        let err = parse("[transport]\nendpoint = \"ftp://host\"").unwrap_err();
        assert!(matches!(err, StreamTaskError::ConfigError(ref m) if m.contains("endpoint")));
    }

    #[test]
    fn blank_event_name_is_rejected() {
        assert!(parse("[transport]\nevent_name = \"  \"").is_err());
    }
}
