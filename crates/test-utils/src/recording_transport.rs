use std::sync::{Arc, Mutex};

use serde_json::Value;
use streamtask::transport::{AckCallback, BoxFuture, Transport, TransportError};

/// One call observed by a [`RecordingTransport`].
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Connect { endpoint: String, namespace: String },
    Emit { event: String, namespace: String, payload: Value },
    Disconnect,
}

/// A fake transport that:
/// - records every connect / emit / disconnect in a shared log
/// - acknowledges every emit immediately
/// - optionally fails every call, to exercise the "log and continue" paths.
///
/// Clones share the log, so a test can keep one handle while the run owns
/// the other.
#[derive(Clone, Default)]
pub struct RecordingTransport {
    log: Arc<Mutex<Vec<Record>>>,
    acks: Arc<Mutex<Vec<Value>>>,
    failing: bool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records calls but reports every one of them as failed.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn records(&self) -> Vec<Record> {
        self.log.lock().unwrap().clone()
    }

    /// Payloads of all emits, in order.
    pub fn payloads(&self) -> Vec<Value> {
        self.records()
            .into_iter()
            .filter_map(|r| match r {
                Record::Emit { payload, .. } => Some(payload),
                _ => None,
            })
            .collect()
    }

    /// `action` field of every emitted payload, in order.
    pub fn actions(&self) -> Vec<String> {
        self.payloads()
            .iter()
            .map(|p| p["action"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    /// Output chunks, in order.
    pub fn outputs(&self) -> Vec<String> {
        self.payloads()
            .iter()
            .filter_map(|p| p.get("output").and_then(Value::as_str).map(str::to_string))
            .collect()
    }

    /// Concatenation of all output chunks.
    pub fn output_text(&self) -> String {
        self.outputs().concat()
    }

    /// Number of delivery callbacks that were invoked.
    pub fn acked(&self) -> usize {
        self.acks.lock().unwrap().len()
    }

    fn push(&self, record: Record) {
        self.log.lock().unwrap().push(record);
    }

    fn outcome(&self) -> Result<(), TransportError> {
        if self.failing {
            Err(TransportError::NotConnected)
        } else {
            Ok(())
        }
    }
}

impl Transport for RecordingTransport {
    fn connect<'a>(
        &'a mut self,
        endpoint: &'a str,
        namespace: &'a str,
    ) -> BoxFuture<'a, Result<(), TransportError>> {
        self.push(Record::Connect {
            endpoint: endpoint.to_string(),
            namespace: namespace.to_string(),
        });
        let outcome = self.outcome();
        Box::pin(async move { outcome })
    }

    fn emit<'a>(
        &'a mut self,
        event: &'a str,
        payload: Value,
        namespace: &'a str,
        ack: Option<AckCallback>,
    ) -> BoxFuture<'a, Result<(), TransportError>> {
        self.push(Record::Emit {
            event: event.to_string(),
            namespace: namespace.to_string(),
            payload,
        });
        let outcome = self.outcome();
        if outcome.is_ok() {
            if let Some(ack) = ack {
                self.acks.lock().unwrap().push(Value::Null);
                ack(Value::Null);
            }
        }
        Box::pin(async move { outcome })
    }

    fn disconnect(&mut self) -> BoxFuture<'_, Result<(), TransportError>> {
        self.push(Record::Disconnect);
        let outcome = self.outcome();
        Box::pin(async move { outcome })
    }
}
