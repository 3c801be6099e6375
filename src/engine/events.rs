// src/engine/events.rs

//! Emission of the run's lifecycle messages over a [`Transport`].
//!
//! Transport faults never influence the run's outcome: every failure is
//! logged here and swallowed.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::transport::{AckCallback, Transport};
use crate::types::{TaskEvent, TaskIdentity};

/// Borrowed view over the transport plus the per-run addressing
/// (identity, event name, namespace).
pub struct RunEvents<'a, T: Transport + ?Sized> {
    transport: &'a mut T,
    identity: &'a TaskIdentity,
    event_name: &'a str,
    namespace: &'a str,
}

impl<'a, T: Transport + ?Sized> RunEvents<'a, T> {
    pub fn new(
        transport: &'a mut T,
        identity: &'a TaskIdentity,
        event_name: &'a str,
        namespace: &'a str,
    ) -> Self {
        Self {
            transport,
            identity,
            event_name,
            namespace,
        }
    }

    pub async fn connect(&mut self, endpoint: &str) {
        match self.transport.connect(endpoint, self.namespace).await {
            Ok(()) => info!(endpoint, namespace = %self.namespace, "transport connected"),
            Err(e) => warn!(
                endpoint,
                namespace = %self.namespace,
                error = %e,
                "transport connect failed; continuing without delivery"
            ),
        }
    }

    pub async fn started(&mut self) {
        let event = TaskEvent::started(self.identity);
        self.emit(event, None).await;
    }

    pub async fn output(&mut self, chunk: String) {
        debug!(bytes = chunk.len(), "output: {}", chunk);
        let event = TaskEvent::output(self.identity, chunk);
        self.emit(event, None).await;
    }

    pub async fn finished(&mut self) {
        let event = TaskEvent::finished(self.identity);
        let ack: AckCallback = Box::new(|_| info!("closing message received"));
        self.emit(event, Some(ack)).await;
    }

    pub async fn sleep(&self, duration: Duration) {
        self.transport.sleep(duration).await;
    }

    pub async fn disconnect(&mut self) {
        if let Err(e) = self.transport.disconnect().await {
            warn!(error = %e, "transport disconnect failed");
        }
    }

    async fn emit(&mut self, event: TaskEvent, ack: Option<AckCallback>) {
        let action = event.action;
        let payload = match serde_json::to_value(&event) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(?action, error = %e, "could not serialize task event");
                return;
            }
        };

        if let Err(e) = self
            .transport
            .emit(self.event_name, payload, self.namespace, ack)
            .await
        {
            warn!(?action, error = %e, "transport emit failed");
        }
    }
}
