// src/transport/packet.rs

//! Engine.IO v4 / Socket.IO v5 text packet codec.
//!
//! Every WebSocket text frame carries exactly one Engine.IO packet:
//!
//! ```text
//! 0{"sid":"…","pingInterval":25000,…}   open
//! 2 / 3                                  ping / pong
//! 4<socket.io packet>                    message
//! ```
//!
//! A Socket.IO packet is `<type>[<attachments>-][<namespace>,][<ack id>][<json>]`,
//! e.g. `42/pty,7["sio_streamed_task_data",{…}]`. The default namespace `/`
//! is never written out.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::TransportError;

/// Session parameters sent by the server in the Engine.IO OPEN packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenHandshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    pub ping_interval: u64,
    pub ping_timeout: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_payload: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(OpenHandshake),
    Close,
    Ping,
    Pong,
    Message(SocketPacket),
    Upgrade,
    Noop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketPacketKind {
    Connect,
    Disconnect,
    Event,
    Ack,
    ConnectError,
    BinaryEvent,
    BinaryAck,
}

impl SocketPacketKind {
    fn code(self) -> char {
        match self {
            SocketPacketKind::Connect => '0',
            SocketPacketKind::Disconnect => '1',
            SocketPacketKind::Event => '2',
            SocketPacketKind::Ack => '3',
            SocketPacketKind::ConnectError => '4',
            SocketPacketKind::BinaryEvent => '5',
            SocketPacketKind::BinaryAck => '6',
        }
    }

    fn from_code(c: char) -> Option<Self> {
        Some(match c {
            '0' => SocketPacketKind::Connect,
            '1' => SocketPacketKind::Disconnect,
            '2' => SocketPacketKind::Event,
            '3' => SocketPacketKind::Ack,
            '4' => SocketPacketKind::ConnectError,
            '5' => SocketPacketKind::BinaryEvent,
            '6' => SocketPacketKind::BinaryAck,
            _ => return None,
        })
    }

    fn is_binary(self) -> bool {
        matches!(self, SocketPacketKind::BinaryEvent | SocketPacketKind::BinaryAck)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SocketPacket {
    pub kind: SocketPacketKind,
    pub namespace: String,
    pub id: Option<u64>,
    pub data: Option<Value>,
}

impl SocketPacket {
    pub fn connect(namespace: &str) -> Self {
        Self {
            kind: SocketPacketKind::Connect,
            namespace: namespace.to_string(),
            id: None,
            data: None,
        }
    }

    pub fn disconnect(namespace: &str) -> Self {
        Self {
            kind: SocketPacketKind::Disconnect,
            namespace: namespace.to_string(),
            id: None,
            data: None,
        }
    }

    /// An EVENT packet; the data is `[event, payload]`.
    pub fn event(namespace: &str, id: Option<u64>, event: &str, payload: Value) -> Self {
        Self {
            kind: SocketPacketKind::Event,
            namespace: namespace.to_string(),
            id,
            data: Some(Value::Array(vec![Value::String(event.to_string()), payload])),
        }
    }

    pub fn encode(&self) -> String {
        let mut out = String::new();
        out.push(self.kind.code());
        if !self.namespace.is_empty() && self.namespace != "/" {
            out.push_str(&self.namespace);
            out.push(',');
        }
        if let Some(id) = self.id {
            out.push_str(&id.to_string());
        }
        if let Some(data) = &self.data {
            out.push_str(&data.to_string());
        }
        out
    }

    pub fn decode(text: &str) -> Result<Self, TransportError> {
        let mut chars = text.chars();
        let kind = chars
            .next()
            .and_then(SocketPacketKind::from_code)
            .ok_or_else(|| TransportError::Packet(format!("unknown socket.io packet type in {text:?}")))?;
        let mut rest = chars.as_str();

        if kind.is_binary() {
            let dash = rest
                .find('-')
                .ok_or_else(|| TransportError::Packet(format!("binary packet without attachment count: {text:?}")))?;
            rest = &rest[dash + 1..];
        }

        let namespace = if rest.starts_with('/') {
            match rest.find(',') {
                Some(comma) => {
                    let ns = &rest[..comma];
                    rest = &rest[comma + 1..];
                    ns.to_string()
                }
                None => {
                    let ns = rest.to_string();
                    rest = "";
                    ns
                }
            }
        } else {
            "/".to_string()
        };

        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        let id = if digits > 0 {
            let id = rest[..digits]
                .parse()
                .map_err(|_| TransportError::Packet(format!("ack id out of range in {text:?}")))?;
            rest = &rest[digits..];
            Some(id)
        } else {
            None
        };

        let data = if rest.is_empty() {
            None
        } else {
            Some(serde_json::from_str(rest)?)
        };

        Ok(Self {
            kind,
            namespace,
            id,
            data,
        })
    }

    /// Human-readable reason carried by a CONNECT_ERROR packet.
    pub fn error_message(&self) -> String {
        match &self.data {
            Some(Value::Object(map)) => map
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| Value::Object(map.clone()).to_string()),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => "no reason given".to_string(),
        }
    }
}

impl EnginePacket {
    pub fn encode(&self) -> String {
        match self {
            EnginePacket::Open(handshake) => {
                format!("0{}", serde_json::to_string(handshake).unwrap_or_default())
            }
            EnginePacket::Close => "1".to_string(),
            EnginePacket::Ping => "2".to_string(),
            EnginePacket::Pong => "3".to_string(),
            EnginePacket::Message(packet) => format!("4{}", packet.encode()),
            EnginePacket::Upgrade => "5".to_string(),
            EnginePacket::Noop => "6".to_string(),
        }
    }

    pub fn decode(text: &str) -> Result<Self, TransportError> {
        let mut chars = text.chars();
        let code = chars
            .next()
            .ok_or_else(|| TransportError::Packet("empty engine.io packet".to_string()))?;
        let rest = chars.as_str();

        match code {
            '0' => Ok(EnginePacket::Open(serde_json::from_str(rest)?)),
            '1' => Ok(EnginePacket::Close),
            '2' => Ok(EnginePacket::Ping),
            '3' => Ok(EnginePacket::Pong),
            '4' => Ok(EnginePacket::Message(SocketPacket::decode(rest)?)),
            '5' => Ok(EnginePacket::Upgrade),
            '6' => Ok(EnginePacket::Noop),
            other => Err(TransportError::Packet(format!(
                "unknown engine.io packet type '{other}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn encodes_namespace_connect() {
        assert_eq!(SocketPacket::connect("/pty").encode(), "0/pty,");
        assert_eq!(SocketPacket::connect("/").encode(), "0");
    }

    #[test]
    fn encodes_event_with_ack_id() {
        let packet = SocketPacket::event("/pty", Some(12), "data", json!({"action": "x"}));
        assert_eq!(
            EnginePacket::Message(packet).encode(),
            r#"42/pty,12["data",{"action":"x"}]"#
        );
    }

    #[test]
    fn encodes_event_on_default_namespace_without_ack() {
        let packet = SocketPacket::event("/", None, "data", json!(1));
        assert_eq!(packet.encode(), r#"2["data",1]"#);
    }

    #[test]
    fn decodes_open_handshake() {
        let packet = EnginePacket::decode(
            r#"0{"sid":"abc","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#,
        )
        .unwrap();
        assert_eq!(
            packet,
            EnginePacket::Open(OpenHandshake {
                sid: "abc".into(),
                upgrades: vec![],
                ping_interval: 25000,
                ping_timeout: 20000,
                max_payload: Some(1_000_000),
            })
        );
    }

    #[test]
    fn decodes_connect_ack_with_namespace() {
        let packet = EnginePacket::decode(r#"40/pty,{"sid":"s1"}"#).unwrap();
        let EnginePacket::Message(packet) = packet else {
            panic!("expected message packet");
        };
        assert_eq!(packet.kind, SocketPacketKind::Connect);
        assert_eq!(packet.namespace, "/pty");
        assert_eq!(packet.id, None);
        assert_eq!(packet.data, Some(json!({"sid": "s1"})));
    }

    #[test]
    fn decodes_ack_on_default_namespace() {
        let packet = SocketPacket::decode("37[]").unwrap();
        assert_eq!(packet.kind, SocketPacketKind::Ack);
        assert_eq!(packet.namespace, "/");
        assert_eq!(packet.id, Some(7));
        assert_eq!(packet.data, Some(json!([])));
    }

    #[test]
    fn decodes_disconnect_without_trailing_comma() {
        let packet = SocketPacket::decode("1/pty").unwrap();
        assert_eq!(packet.kind, SocketPacketKind::Disconnect);
        assert_eq!(packet.namespace, "/pty");
        assert_eq!(packet.data, None);
    }

    #[test]
    fn skips_binary_attachment_count() {
        let packet = SocketPacket::decode(r#"51-/pty,["file",{"_placeholder":true,"num":0}]"#).unwrap();
        assert_eq!(packet.kind, SocketPacketKind::BinaryEvent);
        assert_eq!(packet.namespace, "/pty");
    }

    #[test]
    fn connect_error_message_is_extracted() {
        let packet = SocketPacket::decode(r#"4/pty,{"message":"Not authorized"}"#).unwrap();
        assert_eq!(packet.kind, SocketPacketKind::ConnectError);
        assert_eq!(packet.error_message(), "Not authorized");
    }

    #[test]
    fn rejects_garbage() {
        assert!(EnginePacket::decode("").is_err());
        assert!(EnginePacket::decode("9").is_err());
        assert!(EnginePacket::decode("4x").is_err());
        assert!(EnginePacket::decode("42[not json").is_err());
    }

    #[test]
    fn event_round_trips_through_the_codec() {
        let sent = SocketPacket::event("/pty", Some(3), "ev", json!({"identity": [1, "a"]}));
        let decoded = SocketPacket::decode(&sent.encode()).unwrap();
        assert_eq!(decoded, sent);
    }
}
