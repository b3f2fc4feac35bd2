//! Socket.IO wire codec for the coordinator link.
//!
//! The coordinator runs a Socket.IO server and nodes connect with the
//! WebSocket transport only, so every WebSocket text frame carries exactly
//! one Engine.IO packet:
//!
//! | Frame | Meaning |
//! |-------|---------|
//! | `0{"sid":..,"pingInterval":..,"pingTimeout":..}` | Engine.IO open |
//! | `1` | Engine.IO close |
//! | `2` / `3` | ping / pong |
//! | `40` / `40{"sid":..}` | Socket.IO namespace connect |
//! | `41` | Socket.IO disconnect |
//! | `42["topic", payload]` | Socket.IO event |
//! | `44{"message":..}` | Socket.IO connect error |
//!
//! Only the default namespace is used; a namespace prefix (`/ns,`) and an
//! ack id on inbound packets are tolerated and discarded.

use crate::error::{GatewayError, Result};
use serde::Deserialize;
use serde_json::Value;

/// Engine.IO protocol revision spoken by this codec.
pub const ENGINE_IO_VERSION: u8 = 4;

/// Message sent to the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub topic: String,
    pub payload: Value,
}

impl OutboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Value>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Message received from the coordinator. `payload` is `Null` when the
/// event carried no argument.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Value,
}

/// Parameters announced by the server in the Engine.IO open packet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenInfo {
    pub sid: String,
    #[serde(default)]
    pub ping_interval: u64,
    #[serde(default)]
    pub ping_timeout: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(OpenInfo),
    Close,
    Ping,
    Pong,
    Message(SocketPacket),
    /// Upgrade and noop packets; nothing to do on a pure WebSocket link.
    Noop,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect { sid: Option<String> },
    Disconnect,
    Event(InboundMessage),
    ConnectError(String),
    /// Acks and binary attachments are not used by the coordinator.
    Unsupported(char),
}

/// Build the Engine.IO WebSocket URL for a coordinator `host:port`.
pub fn endpoint_url(host: &str, port: u16) -> String {
    format!(
        "ws://{}:{}/socket.io/?EIO={}&transport=websocket",
        host, port, ENGINE_IO_VERSION
    )
}

/// Decode one WebSocket text frame.
pub fn decode(frame: &str) -> Result<EnginePacket> {
    let mut chars = frame.chars();
    let kind = chars
        .next()
        .ok_or_else(|| GatewayError::Protocol("empty frame".to_string()))?;
    let body = chars.as_str();

    match kind {
        '0' => Ok(EnginePacket::Open(serde_json::from_str(body).map_err(
            |e| GatewayError::Protocol(format!("bad open packet: {}", e)),
        )?)),
        '1' => Ok(EnginePacket::Close),
        '2' => Ok(EnginePacket::Ping),
        '3' => Ok(EnginePacket::Pong),
        '4' => decode_socket(body).map(EnginePacket::Message),
        '5' | '6' => Ok(EnginePacket::Noop),
        other => Err(GatewayError::Protocol(format!(
            "unknown engine packet type '{}'",
            other
        ))),
    }
}

fn decode_socket(packet: &str) -> Result<SocketPacket> {
    let mut chars = packet.chars();
    let kind = chars
        .next()
        .ok_or_else(|| GatewayError::Protocol("empty socket packet".to_string()))?;
    let body = strip_namespace(chars.as_str());

    match kind {
        '0' => {
            #[derive(Deserialize)]
            struct ConnectAck {
                sid: Option<String>,
            }
            if body.is_empty() {
                return Ok(SocketPacket::Connect { sid: None });
            }
            let ack: ConnectAck = serde_json::from_str(body)
                .map_err(|e| GatewayError::Protocol(format!("bad connect packet: {}", e)))?;
            Ok(SocketPacket::Connect { sid: ack.sid })
        }
        '1' => Ok(SocketPacket::Disconnect),
        '2' => decode_event(body).map(SocketPacket::Event),
        '4' => {
            let message = match serde_json::from_str::<Value>(body) {
                Ok(Value::Object(map)) => map
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("connection refused")
                    .to_string(),
                Ok(Value::String(s)) => s,
                _ => body.to_string(),
            };
            Ok(SocketPacket::ConnectError(message))
        }
        other => Ok(SocketPacket::Unsupported(other)),
    }
}

fn strip_namespace(body: &str) -> &str {
    if body.starts_with('/') {
        match body.find(',') {
            Some(idx) => &body[idx + 1..],
            None => "",
        }
    } else {
        body
    }
}

fn decode_event(body: &str) -> Result<InboundMessage> {
    // Optional ack id precedes the JSON array.
    let json = body.trim_start_matches(|c: char| c.is_ascii_digit());
    let args: Vec<Value> = serde_json::from_str(json)
        .map_err(|e| GatewayError::Protocol(format!("bad event packet: {}", e)))?;

    let mut args = args.into_iter();
    let topic = match args.next() {
        Some(Value::String(topic)) => topic,
        _ => {
            return Err(GatewayError::Protocol(
                "event packet without a topic".to_string(),
            ));
        }
    };

    Ok(InboundMessage {
        topic,
        payload: args.next().unwrap_or(Value::Null),
    })
}

/// Socket.IO connect request for the default namespace.
pub fn encode_connect() -> &'static str {
    "40"
}

/// Socket.IO disconnect for the default namespace.
pub fn encode_disconnect() -> &'static str {
    "41"
}

/// Engine.IO heartbeat reply.
pub fn encode_pong() -> &'static str {
    "3"
}

/// Encode an outward event as `42["topic", payload]`.
pub fn encode_event(message: &OutboundMessage) -> Result<String> {
    let frame = serde_json::to_string(&(&message.topic, &message.payload))?;
    Ok(format!("42{}", frame))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_open() {
        let packet =
            decode(r#"0{"sid":"abc","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#)
                .unwrap();
        assert_eq!(
            packet,
            EnginePacket::Open(OpenInfo {
                sid: "abc".into(),
                ping_interval: 25000,
                ping_timeout: 20000,
            })
        );
    }

    #[test]
    fn test_decode_heartbeat_and_close() {
        assert_eq!(decode("2").unwrap(), EnginePacket::Ping);
        assert_eq!(decode("3").unwrap(), EnginePacket::Pong);
        assert_eq!(decode("1").unwrap(), EnginePacket::Close);
        assert_eq!(decode("6").unwrap(), EnginePacket::Noop);
    }

    #[test]
    fn test_decode_connect_ack() {
        assert_eq!(
            decode(r#"40{"sid":"s1"}"#).unwrap(),
            EnginePacket::Message(SocketPacket::Connect {
                sid: Some("s1".into())
            })
        );
        assert_eq!(
            decode("40").unwrap(),
            EnginePacket::Message(SocketPacket::Connect { sid: None })
        );
    }

    #[test]
    fn test_decode_event_with_payload() {
        let packet = decode(r#"42["hit",{"msg":"x"}]"#).unwrap();
        assert_eq!(
            packet,
            EnginePacket::Message(SocketPacket::Event(InboundMessage {
                topic: "hit".into(),
                payload: json!({"msg": "x"}),
            }))
        );
    }

    #[test]
    fn test_decode_event_without_payload() {
        let packet = decode(r#"42["dataOn"]"#).unwrap();
        assert_eq!(
            packet,
            EnginePacket::Message(SocketPacket::Event(InboundMessage {
                topic: "dataOn".into(),
                payload: Value::Null,
            }))
        );
    }

    #[test]
    fn test_decode_event_with_namespace_and_ack_id() {
        let packet = decode(r#"42/game,17["dataOff"]"#).unwrap();
        match packet {
            EnginePacket::Message(SocketPacket::Event(msg)) => assert_eq!(msg.topic, "dataOff"),
            other => panic!("unexpected packet {:?}", other),
        }
    }

    #[test]
    fn test_decode_connect_error() {
        assert_eq!(
            decode(r#"44{"message":"Not authorized"}"#).unwrap(),
            EnginePacket::Message(SocketPacket::ConnectError("Not authorized".into()))
        );
    }

    #[test]
    fn test_decode_rejects_malformed_frames() {
        assert!(decode("").is_err());
        assert!(decode("9").is_err());
        assert!(decode("0not-json").is_err());
        assert!(decode("42[1,2]").is_err());
        assert!(decode("42{").is_err());
    }

    #[test]
    fn test_encode_event() {
        let frame = encode_event(&OutboundMessage::new("shooting", "4")).unwrap();
        assert_eq!(frame, r#"42["shooting","4"]"#);

        let frame = encode_event(&OutboundMessage::new(
            "initializeDevice",
            json!({"device_type": "gun"}),
        ))
        .unwrap();
        assert_eq!(frame, r#"42["initializeDevice",{"device_type":"gun"}]"#);
    }

    #[test]
    fn test_endpoint_url() {
        assert_eq!(
            endpoint_url("10.0.0.5", 3000),
            "ws://10.0.0.5:3000/socket.io/?EIO=4&transport=websocket"
        );
    }
}
