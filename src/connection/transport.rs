//! Seam between the connection manager and the wire.

use super::protocol::{InboundMessage, OutboundMessage};
use crate::error::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// An established, handshaken session with the coordinator.
///
/// Dropping `outbound` asks the transport to close the session cleanly;
/// `inbound` yields `None` once the session has ended for any reason.
pub struct Session {
    pub outbound: mpsc::Sender<OutboundMessage>,
    pub inbound: mpsc::Receiver<InboundMessage>,
}

/// Opens sessions to a coordinator endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect and complete the protocol handshake.
    ///
    /// Returns only once the session is ready to carry events.
    async fn connect(&self, endpoint: &str) -> Result<Session>;
}
