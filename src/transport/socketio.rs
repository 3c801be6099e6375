// src/transport/socketio.rs

//! Minimal Socket.IO client over a WebSocket (Engine.IO v4).
//!
//! Only what a streamed run needs: namespace connect, fire-and-forget
//! events with optional acknowledgement callbacks, ping/pong keep-alive and
//! disconnect. There is no reconnection and no long-polling fallback.
//!
//! After the handshake two background tasks own the socket:
//! - a writer draining an unbounded queue, so `emit` never waits on the
//!   network;
//! - a reader answering server pings and resolving acknowledgements.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use super::packet::{EnginePacket, OpenHandshake, SocketPacket, SocketPacketKind};
use super::{AckCallback, BoxFuture, Transport, TransportError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type PendingAcks = Arc<Mutex<HashMap<u64, AckCallback>>>;

/// Socket.IO client bound to a single namespace per connection.
pub struct SocketIoTransport {
    connect_timeout: Duration,
    connection: Option<Connection>,
}

struct Connection {
    namespace: String,
    outbox: mpsc::UnboundedSender<Message>,
    acks: PendingAcks,
    next_ack_id: u64,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl SocketIoTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            connection: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    async fn open(&mut self, endpoint: &str, namespace: &str) -> Result<(), TransportError> {
        if self.connection.is_some() {
            debug!("already connected; dropping previous connection");
            self.close().await?;
        }

        let url = websocket_url(endpoint)?;
        debug!(%url, "opening websocket");

        let (ws, _response) = timeout(self.connect_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| TransportError::Timeout(self.connect_timeout))??;
        let (mut sink, mut stream) = ws.split();

        let session = timeout(
            self.connect_timeout,
            handshake(&mut sink, &mut stream, namespace),
        )
        .await
        .map_err(|_| TransportError::Timeout(self.connect_timeout))??;

        debug!(
            sid = %session.sid,
            ping_interval_ms = session.ping_interval,
            "socket.io namespace connected"
        );

        let (outbox, queue) = mpsc::unbounded_channel();
        let acks: PendingAcks = Arc::new(Mutex::new(HashMap::new()));

        let writer = tokio::spawn(write_loop(sink, queue));
        let reader = tokio::spawn(read_loop(stream, outbox.clone(), Arc::clone(&acks)));

        self.connection = Some(Connection {
            namespace: namespace.to_string(),
            outbox,
            acks,
            next_ack_id: 0,
            reader,
            writer,
        });
        Ok(())
    }

    fn send_event(
        &mut self,
        event: &str,
        payload: Value,
        namespace: &str,
        ack: Option<AckCallback>,
    ) -> Result<(), TransportError> {
        let conn = self.connection.as_mut().ok_or(TransportError::NotConnected)?;

        let id = ack.map(|callback| {
            let id = conn.next_ack_id;
            conn.next_ack_id += 1;
            conn.acks
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(id, callback);
            id
        });

        let packet = EnginePacket::Message(SocketPacket::event(namespace, id, event, payload));
        conn.outbox
            .send(Message::Text(packet.encode().into()))
            .map_err(|_| TransportError::NotConnected)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        let Some(conn) = self.connection.take() else {
            return Ok(());
        };

        let goodbye = EnginePacket::Message(SocketPacket::disconnect(&conn.namespace));
        let _ = conn.outbox.send(Message::Text(goodbye.encode().into()));
        let _ = conn.outbox.send(Message::Close(None));
        drop(conn.outbox);

        let flushed = timeout(self.connect_timeout, conn.writer).await;
        conn.reader.abort();

        let dropped = conn.acks.lock().unwrap_or_else(PoisonError::into_inner).len();
        if dropped > 0 {
            debug!(dropped, "disconnecting with unacknowledged messages");
        }

        match flushed {
            Ok(_) => Ok(()),
            Err(_) => Err(TransportError::Timeout(self.connect_timeout)),
        }
    }
}

impl Transport for SocketIoTransport {
    fn connect<'a>(
        &'a mut self,
        endpoint: &'a str,
        namespace: &'a str,
    ) -> BoxFuture<'a, Result<(), TransportError>> {
        Box::pin(self.open(endpoint, namespace))
    }

    fn emit<'a>(
        &'a mut self,
        event: &'a str,
        payload: Value,
        namespace: &'a str,
        ack: Option<AckCallback>,
    ) -> BoxFuture<'a, Result<(), TransportError>> {
        let sent = self.send_event(event, payload, namespace, ack);
        Box::pin(async move { sent })
    }

    fn disconnect(&mut self) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(self.close())
    }
}

impl Drop for SocketIoTransport {
    fn drop(&mut self) {
        if let Some(conn) = self.connection.take() {
            conn.reader.abort();
            conn.writer.abort();
        }
    }
}

/// Turn an `http(s)://` or `ws(s)://` endpoint into the Engine.IO WebSocket URL.
pub fn websocket_url(endpoint: &str) -> Result<String, TransportError> {
    let (scheme, rest) = endpoint
        .split_once("://")
        .ok_or_else(|| TransportError::InvalidEndpoint(endpoint.to_string()))?;

    let ws_scheme = match scheme.to_ascii_lowercase().as_str() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        _ => return Err(TransportError::InvalidEndpoint(endpoint.to_string())),
    };

    let rest = rest.trim_end_matches('/');
    if rest.is_empty() {
        return Err(TransportError::InvalidEndpoint(endpoint.to_string()));
    }

    Ok(format!("{ws_scheme}://{rest}/socket.io/?EIO=4&transport=websocket"))
}

async fn handshake(
    sink: &mut SplitSink<WsStream, Message>,
    stream: &mut SplitStream<WsStream>,
    namespace: &str,
) -> Result<OpenHandshake, TransportError> {
    let open = match next_packet(stream).await? {
        EnginePacket::Open(open) => open,
        other => {
            return Err(TransportError::Handshake(format!(
                "expected OPEN packet, got {other:?}"
            )));
        }
    };

    let connect = EnginePacket::Message(SocketPacket::connect(namespace));
    sink.send(Message::Text(connect.encode().into())).await?;

    loop {
        match next_packet(stream).await? {
            EnginePacket::Message(packet) if packet.namespace == namespace => match packet.kind {
                SocketPacketKind::Connect => return Ok(open),
                SocketPacketKind::ConnectError => {
                    return Err(TransportError::ConnectRejected {
                        namespace: namespace.to_string(),
                        message: packet.error_message(),
                    });
                }
                _ => continue,
            },
            EnginePacket::Ping => {
                sink.send(Message::Text(EnginePacket::Pong.encode().into()))
                    .await?;
            }
            EnginePacket::Close => {
                return Err(TransportError::Handshake(
                    "server closed the session during connect".to_string(),
                ));
            }
            _ => continue,
        }
    }
}

async fn next_packet(stream: &mut SplitStream<WsStream>) -> Result<EnginePacket, TransportError> {
    while let Some(frame) = stream.next().await {
        match frame? {
            Message::Text(text) => return EnginePacket::decode(text.as_str()),
            Message::Close(_) => break,
            _ => continue,
        }
    }
    Err(TransportError::Handshake(
        "connection closed during handshake".to_string(),
    ))
}

async fn write_loop(
    mut sink: SplitSink<WsStream, Message>,
    mut queue: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(message) = queue.recv().await {
        let closing = matches!(message, Message::Close(_));
        if let Err(e) = sink.send(message).await {
            warn!(error = %e, "websocket write failed; dropping queued messages");
            break;
        }
        if closing {
            break;
        }
    }
    let _ = sink.close().await;
    debug!("websocket writer finished");
}

async fn read_loop(
    mut stream: SplitStream<WsStream>,
    outbox: mpsc::UnboundedSender<Message>,
    acks: PendingAcks,
) {
    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!(error = %e, "websocket read failed");
                break;
            }
        };

        match EnginePacket::decode(text.as_str()) {
            Ok(EnginePacket::Ping) => {
                let _ = outbox.send(Message::Text(EnginePacket::Pong.encode().into()));
            }
            Ok(EnginePacket::Message(packet)) if packet.kind == SocketPacketKind::Ack => {
                let callback = packet.id.and_then(|id| {
                    acks.lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .remove(&id)
                });
                match callback {
                    Some(callback) => callback(packet.data.unwrap_or(Value::Null)),
                    None => debug!(id = ?packet.id, "acknowledgement for unknown message"),
                }
            }
            Ok(EnginePacket::Message(packet)) if packet.kind == SocketPacketKind::Disconnect => {
                info!(namespace = %packet.namespace, "server disconnected the namespace");
            }
            Ok(EnginePacket::Close) => break,
            Ok(_) => {}
            Err(e) => debug!(error = %e, "ignoring undecodable packet"),
        }
    }
    debug!("websocket reader finished");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_endpoints_become_websocket_urls() {
        assert_eq!(
            websocket_url("http://push-server:80").unwrap(),
            "ws://push-server:80/socket.io/?EIO=4&transport=websocket"
        );
        assert_eq!(
            websocket_url("https://example.com/").unwrap(),
            "wss://example.com/socket.io/?EIO=4&transport=websocket"
        );
        assert_eq!(
            websocket_url("ws://127.0.0.1:9000").unwrap(),
            "ws://127.0.0.1:9000/socket.io/?EIO=4&transport=websocket"
        );
    }

    #[test]
    fn rejects_unknown_schemes() {
        assert!(matches!(
            websocket_url("ftp://host"),
            Err(TransportError::InvalidEndpoint(_))
        ));
        assert!(matches!(
            websocket_url("localhost:80"),
            Err(TransportError::InvalidEndpoint(_))
        ));
        assert!(matches!(
            websocket_url("http://"),
            Err(TransportError::InvalidEndpoint(_))
        ));
    }

    #[tokio::test]
    async fn emit_without_connection_fails() {
        let mut transport = SocketIoTransport::new(Duration::from_millis(100));
        let err = transport
            .emit("ev", Value::Null, "/", None)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::NotConnected));
        assert!(transport.disconnect().await.is_ok());
    }
}
