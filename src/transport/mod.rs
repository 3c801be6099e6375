// src/transport/mod.rs

//! Push-messaging transport abstraction.
//!
//! The run talks to a [`Transport`] instead of a concrete client. This keeps
//! the poll loop independent of the wire protocol and lets tests record
//! emitted messages instead of talking to a server.
//!
//! - [`SocketIoTransport`] speaks Socket.IO (Engine.IO v4) over WebSocket.
//! - [`JsonLinesTransport`] writes every message as one JSON line, for local
//!   use without a server.
//! - [`packet`] is the text codec shared by the Socket.IO client and its tests.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

pub mod jsonl;
pub mod packet;
pub mod socketio;

pub use jsonl::JsonLinesTransport;
pub use socketio::SocketIoTransport;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Invoked with the acknowledgement data once the server confirms delivery.
pub type AckCallback = Box<dyn FnOnce(Value) + Send>;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("transport is not connected")]
    NotConnected,

    #[error("invalid endpoint '{0}'")]
    InvalidEndpoint(String),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("namespace '{namespace}' rejected the connection: {message}")]
    ConnectRejected { namespace: String, message: String },

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("malformed packet: {0}")]
    Packet(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Client side of the push-messaging channel.
///
/// Delivery is at-most-effort: implementations do not retry, and callers
/// treat every error as non-fatal.
pub trait Transport: Send {
    fn connect<'a>(
        &'a mut self,
        endpoint: &'a str,
        namespace: &'a str,
    ) -> BoxFuture<'a, Result<(), TransportError>>;

    fn emit<'a>(
        &'a mut self,
        event: &'a str,
        payload: Value,
        namespace: &'a str,
        ack: Option<AckCallback>,
    ) -> BoxFuture<'a, Result<(), TransportError>>;

    fn disconnect(&mut self) -> BoxFuture<'_, Result<(), TransportError>>;

    /// Cooperative pause used as the poll loop's yield point.
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn connect<'a>(
        &'a mut self,
        endpoint: &'a str,
        namespace: &'a str,
    ) -> BoxFuture<'a, Result<(), TransportError>> {
        (**self).connect(endpoint, namespace)
    }

    fn emit<'a>(
        &'a mut self,
        event: &'a str,
        payload: Value,
        namespace: &'a str,
        ack: Option<AckCallback>,
    ) -> BoxFuture<'a, Result<(), TransportError>> {
        (**self).emit(event, payload, namespace, ack)
    }

    fn disconnect(&mut self) -> BoxFuture<'_, Result<(), TransportError>> {
        (**self).disconnect()
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        (**self).sleep(duration)
    }
}
