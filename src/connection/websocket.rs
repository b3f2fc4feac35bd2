//! Socket.IO-over-WebSocket connector.
//!
//! Performs the Engine.IO open and Socket.IO namespace connect, then hands
//! the socket to a pump task that translates between WebSocket frames and
//! session channels and answers server heartbeats.

use super::protocol::{
    self, EnginePacket, InboundMessage, OpenInfo, OutboundMessage, SocketPacket,
};
use super::transport::{Connector, Session};
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWrite = SplitSink<WsStream, Message>;
type WsRead = SplitStream<WsStream>;

/// Heartbeat allowance used when the server announces none.
const FALLBACK_HEARTBEAT: Duration = Duration::from_secs(45);

pub struct WebSocketConnector {
    /// Capacity of the per-session outbound queue.
    queue_capacity: usize,
}

impl WebSocketConnector {
    pub fn new(queue_capacity: usize) -> Self {
        Self { queue_capacity }
    }
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, endpoint: &str) -> Result<Session> {
        let (ws_stream, _) = connect_async(endpoint)
            .await
            .map_err(|e| GatewayError::ConnectionFailed(format!("{}: {}", endpoint, e)))?;

        let (mut write, mut read) = ws_stream.split();

        let open = match next_packet(&mut read).await? {
            EnginePacket::Open(open) => open,
            other => {
                return Err(GatewayError::Protocol(format!(
                    "expected open packet, got {:?}",
                    other
                )));
            }
        };
        debug!(
            "[Conn] Engine.IO session {} (ping interval {} ms, timeout {} ms)",
            open.sid, open.ping_interval, open.ping_timeout
        );

        write
            .send(Message::Text(protocol::encode_connect().into()))
            .await?;

        loop {
            match next_packet(&mut read).await? {
                EnginePacket::Message(SocketPacket::Connect { sid }) => {
                    info!(
                        "[Conn] Joined coordinator namespace (sid {})",
                        sid.as_deref().unwrap_or("-")
                    );
                    break;
                }
                EnginePacket::Message(SocketPacket::ConnectError(message)) => {
                    return Err(GatewayError::ConnectionFailed(message));
                }
                EnginePacket::Ping => {
                    write
                        .send(Message::Text(protocol::encode_pong().into()))
                        .await?;
                }
                EnginePacket::Close => {
                    return Err(GatewayError::ConnectionFailed(
                        "server closed during handshake".to_string(),
                    ));
                }
                other => debug!("[Conn] Ignoring {:?} during handshake", other),
            }
        }

        let (out_tx, out_rx) = mpsc::channel(self.queue_capacity);
        let (in_tx, in_rx) = mpsc::channel(self.queue_capacity);
        tokio::spawn(pump(write, read, out_rx, in_tx, heartbeat_allowance(&open)));

        Ok(Session {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

fn heartbeat_allowance(open: &OpenInfo) -> Duration {
    if open.ping_interval == 0 {
        return FALLBACK_HEARTBEAT;
    }
    Duration::from_millis(open.ping_interval + open.ping_timeout)
}

/// Read frames until one decodes into an Engine.IO packet.
async fn next_packet(read: &mut WsRead) -> Result<EnginePacket> {
    while let Some(frame) = read.next().await {
        match frame? {
            Message::Text(text) => {
                let text_str: &str = &text;
                return protocol::decode(text_str);
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
    Err(GatewayError::ConnectionFailed(
        "connection closed during handshake".to_string(),
    ))
}

async fn pump(
    mut write: WsWrite,
    mut read: WsRead,
    mut outbound: mpsc::Receiver<OutboundMessage>,
    inbound: mpsc::Sender<InboundMessage>,
    heartbeat: Duration,
) {
    let mut deadline = Instant::now() + heartbeat;

    loop {
        tokio::select! {
            message = outbound.recv() => match message {
                Some(message) => {
                    let frame = match protocol::encode_event(&message) {
                        Ok(frame) => frame,
                        Err(e) => {
                            warn!("[Conn] Cannot encode {}: {}", message.topic, e);
                            continue;
                        }
                    };
                    if let Err(e) = write.send(Message::Text(frame.into())).await {
                        warn!("[Conn] Send failed: {}", e);
                        break;
                    }
                }
                None => {
                    debug!("[Conn] Session closed locally");
                    let _ = write
                        .send(Message::Text(protocol::encode_disconnect().into()))
                        .await;
                    let _ = write.send(Message::Close(None)).await;
                    break;
                }
            },
            frame = read.next() => {
                deadline = Instant::now() + heartbeat;
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        let text_str: &str = &text;
                        match protocol::decode(text_str) {
                            Ok(EnginePacket::Ping) => {
                                if let Err(e) = write
                                    .send(Message::Text(protocol::encode_pong().into()))
                                    .await
                                {
                                    warn!("[Conn] Heartbeat reply failed: {}", e);
                                    break;
                                }
                            }
                            Ok(EnginePacket::Message(SocketPacket::Event(message))) => {
                                if inbound.send(message).await.is_err() {
                                    break;
                                }
                            }
                            Ok(EnginePacket::Message(SocketPacket::Disconnect))
                            | Ok(EnginePacket::Close) => {
                                info!("[Conn] Coordinator closed the session");
                                break;
                            }
                            Ok(other) => debug!("[Conn] Ignoring {:?}", other),
                            Err(e) => warn!("[Conn] Dropping frame: {}", e),
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = write.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("[Conn] Server sent Close frame");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("[Conn] WebSocket read error: {}", e);
                        break;
                    }
                    None => {
                        info!("[Conn] WebSocket stream ended");
                        break;
                    }
                }
            },
            _ = tokio::time::sleep_until(deadline) => {
                warn!("[Conn] No heartbeat from coordinator within {:?}", heartbeat);
                break;
            }
        }
    }
}
