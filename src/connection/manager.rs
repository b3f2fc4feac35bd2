//! Owner of the persistent coordinator link.
//!
//! The manager runs one background task that connects, serves the session
//! until it ends, and reconnects under a bounded [`RetryPolicy`]. Producers
//! never see the link itself: they call [`ConnectionManager::emit`], which
//! either enqueues the message on the live session or drops it.
//!
//! On every transition into `Connected` the `on_connected` hook runs and the
//! messages it returns are queued before the session is published, so the
//! identity announcement is always the first message on a connection.

use super::backoff::{Backoff, RetryPolicy};
use super::protocol::{InboundMessage, OutboundMessage};
use super::transport::{Connector, Session};
use crate::error::{GatewayError, Result};
use log::{debug, error, info, warn};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// How long a clean close may take before the session is abandoned.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Handler for one inbound topic.
pub type MessageHandler = Arc<dyn Fn(Value) + Send + Sync>;

/// Hook run on every successful (re)connect; returns the messages to send
/// first on the new session.
pub type ConnectedHook = Arc<dyn Fn() -> Vec<OutboundMessage> + Send + Sync>;

/// Link state, owned by the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Anything that can carry an outward message.
pub trait Emitter: Send + Sync {
    /// Hand a message to the link. Never blocks.
    fn send(&self, message: OutboundMessage) -> Result<()>;
}

/// Delivery counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Messages accepted onto a live session.
    pub sent: u64,
    /// Messages dropped because no session was available.
    pub dropped: u64,
    /// Successful connections so far.
    pub connections: u64,
}

struct Link {
    state: ConnectionState,
    outbound: Option<mpsc::Sender<OutboundMessage>>,
}

pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    policy: RetryPolicy,
    handshake_timeout: Duration,
    link: RwLock<Link>,
    handlers: RwLock<HashMap<String, MessageHandler>>,
    on_connected: RwLock<Option<ConnectedHook>>,
    shutdown: CancellationToken,
    sent: AtomicU64,
    dropped: AtomicU64,
    connections: AtomicU64,
}

impl ConnectionManager {
    pub fn new(
        connector: Arc<dyn Connector>,
        policy: RetryPolicy,
        handshake_timeout: Duration,
    ) -> Self {
        Self {
            connector,
            policy,
            handshake_timeout,
            link: RwLock::new(Link {
                state: ConnectionState::Disconnected,
                outbound: None,
            }),
            handlers: RwLock::new(HashMap::new()),
            on_connected: RwLock::new(None),
            shutdown: CancellationToken::new(),
            sent: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            connections: AtomicU64::new(0),
        }
    }

    /// Register the handler for an inbound topic. A later registration for
    /// the same topic replaces the earlier one.
    pub fn on_message<F>(&self, topic: impl Into<String>, handler: F)
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        let topic = topic.into();
        if self
            .handlers
            .write()
            .insert(topic.clone(), Arc::new(handler))
            .is_some()
        {
            debug!("[Conn] Replaced handler for '{}'", topic);
        }
    }

    /// Set the hook run on each transition into `Connected`.
    pub fn on_connected<F>(&self, hook: F)
    where
        F: Fn() -> Vec<OutboundMessage> + Send + Sync + 'static,
    {
        *self.on_connected.write() = Some(Arc::new(hook));
    }

    /// Start the connection task.
    ///
    /// The task resolves to `Ok(())` after [`ConnectionManager::shutdown`],
    /// or to [`GatewayError::RetriesExhausted`] once the retry budget is spent.
    pub fn connect(self: &Arc<Self>, endpoint: impl Into<String>) -> JoinHandle<Result<()>> {
        let manager = self.clone();
        let endpoint = endpoint.into();
        tokio::spawn(async move { manager.run(endpoint).await })
    }

    /// Emit `topic` with `payload` on the live session.
    ///
    /// Fails with [`GatewayError::NotConnected`] while the link is down;
    /// the message is dropped, not queued.
    pub fn emit(&self, topic: &str, payload: impl Into<Value>) -> Result<()> {
        self.send(OutboundMessage::new(topic, payload))
    }

    /// Close the session cleanly and stop reconnecting.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn stats(&self) -> ConnectionStats {
        ConnectionStats {
            sent: self.sent.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            connections: self.connections.load(Ordering::Relaxed),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.link.read().state
    }

    fn set_state(&self, state: ConnectionState) {
        let mut link = self.link.write();
        link.state = state;
        if state != ConnectionState::Connected {
            link.outbound = None;
        }
    }

    async fn run(self: Arc<Self>, endpoint: String) -> Result<()> {
        let mut backoff = Backoff::new(self.policy.clone());

        while !self.shutdown.is_cancelled() {
            self.set_state(ConnectionState::Connecting);
            info!("[Conn] Connecting to {}", endpoint);

            let attempt = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                attempt = tokio::time::timeout(
                    self.handshake_timeout,
                    self.connector.connect(&endpoint),
                ) => attempt,
            };
            let result = attempt.unwrap_or_else(|_| {
                Err(GatewayError::HandshakeTimeout(
                    self.handshake_timeout.as_millis() as u64,
                ))
            });

            let delay = match result {
                Ok(session) => {
                    backoff.reset();
                    self.serve(session).await;
                    if self.shutdown.is_cancelled() {
                        break;
                    }
                    warn!("[Conn] Lost connection to coordinator");
                    backoff.policy().initial_delay
                }
                Err(e) => {
                    self.set_state(ConnectionState::Disconnected);
                    if e.is_transient() {
                        warn!("[Conn] Connection attempt failed: {}", e);
                    } else {
                        error!("[Conn] Connection attempt failed: {}", e);
                    }
                    match backoff.record_failure() {
                        Some(delay) => delay,
                        None => {
                            let attempts = backoff.failures();
                            error!(
                                "[Conn] Connection failed after {} attempts, events will be dropped",
                                attempts
                            );
                            return Err(GatewayError::RetriesExhausted { attempts });
                        }
                    }
                }
            };

            debug!("[Conn] Reconnecting in {:?}", delay);
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.set_state(ConnectionState::Disconnected);
        info!("[Conn] Connection closed");
        Ok(())
    }

    /// Publish the session, dispatch inbound messages until it ends, then
    /// withdraw it.
    async fn serve(&self, session: Session) {
        let Session {
            outbound,
            mut inbound,
        } = session;

        let hook = self.on_connected.read().clone();
        let greeting = hook.map(|hook| hook()).unwrap_or_default();

        {
            let mut link = self.link.write();
            for message in greeting {
                match outbound.try_send(message) {
                    Ok(()) => {
                        self.sent.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        warn!("[Conn] Could not queue greeting: {}", e);
                    }
                }
            }
            link.state = ConnectionState::Connected;
            link.outbound = Some(outbound);
        }
        self.connections.fetch_add(1, Ordering::Relaxed);
        info!("[Conn] Connected to coordinator");

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    // Dropping the sender asks the transport to close.
                    self.set_state(ConnectionState::Disconnected);
                    let drained = tokio::time::timeout(CLOSE_GRACE, async {
                        while inbound.recv().await.is_some() {}
                    })
                    .await;
                    if drained.is_err() {
                        warn!("[Conn] Session did not close within {:?}", CLOSE_GRACE);
                    }
                    return;
                }
                message = inbound.recv() => match message {
                    Some(message) => self.dispatch(message),
                    None => break,
                },
            }
        }

        self.set_state(ConnectionState::Disconnected);
    }

    fn dispatch(&self, message: InboundMessage) {
        let handler = self.handlers.read().get(&message.topic).cloned();
        match handler {
            Some(handler) => handler(message.payload),
            None => debug!("[Conn] No handler for '{}'", message.topic),
        }
    }
}

impl Emitter for ConnectionManager {
    fn send(&self, message: OutboundMessage) -> Result<()> {
        let link = self.link.read();
        let outbound = match (&link.state, &link.outbound) {
            (ConnectionState::Connected, Some(outbound)) => outbound,
            _ => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "[Conn] Dropping '{}' while {:?}",
                    message.topic, link.state
                );
                return Err(GatewayError::NotConnected);
            }
        };

        match outbound.try_send(message) {
            Ok(()) => {
                self.sent.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(TrySendError::Full(message)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("[Conn] Outbound queue full, dropping '{}'", message.topic);
                Err(GatewayError::QueueFull(message.topic))
            }
            Err(TrySendError::Closed(message)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!("[Conn] Session closing, dropping '{}'", message.topic);
                Err(GatewayError::NotConnected)
            }
        }
    }
}
