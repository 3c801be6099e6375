// src/transport/jsonl.rs

//! Transport that prints every message as a JSON line.
//!
//! Used when no endpoint is configured, so a run can be observed (or piped
//! into another tool) without a Socket.IO server:
//!
//! ```json
//! {"event":"sio_streamed_task_data","namespace":"/","payload":{...}}
//! ```

use std::io::{self, Write};

use serde_json::{Value, json};

use super::{AckCallback, BoxFuture, Transport, TransportError};

pub struct JsonLinesTransport<W: Write + Send = io::Stdout> {
    out: W,
}

impl JsonLinesTransport<io::Stdout> {
    pub fn stdout() -> Self {
        Self { out: io::stdout() }
    }
}

impl<W: Write + Send> JsonLinesTransport<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_line(&mut self, event: &str, payload: Value, namespace: &str) -> Result<(), TransportError> {
        let line = json!({
            "event": event,
            "namespace": namespace,
            "payload": payload,
        });
        serde_json::to_writer(&mut self.out, &line)?;
        self.out.write_all(b"\n")?;
        self.out.flush()?;
        Ok(())
    }
}

impl<W: Write + Send> Transport for JsonLinesTransport<W> {
    fn connect<'a>(
        &'a mut self,
        _endpoint: &'a str,
        _namespace: &'a str,
    ) -> BoxFuture<'a, Result<(), TransportError>> {
        Box::pin(async { Ok(()) })
    }

    fn emit<'a>(
        &'a mut self,
        event: &'a str,
        payload: Value,
        namespace: &'a str,
        ack: Option<AckCallback>,
    ) -> BoxFuture<'a, Result<(), TransportError>> {
        let written = self.write_line(event, payload, namespace);
        if written.is_ok() {
            if let Some(ack) = ack {
                ack(Value::Null);
            }
        }
        Box::pin(async move { written })
    }

    fn disconnect(&mut self) -> BoxFuture<'_, Result<(), TransportError>> {
        let flushed = self.out.flush().map_err(TransportError::from);
        Box::pin(async move { flushed })
    }
}
