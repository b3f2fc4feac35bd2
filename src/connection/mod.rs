//! Coordinator link: wire codec, transport and the connection manager.

pub mod backoff;
pub mod manager;
#[cfg(test)]
pub(crate) mod memory;
pub mod protocol;
pub mod transport;
pub mod websocket;

pub use backoff::RetryPolicy;
pub use manager::{ConnectionManager, ConnectionStats, Emitter};
pub use protocol::{InboundMessage, OutboundMessage};
pub use transport::{Connector, Session};
pub use websocket::WebSocketConnector;
