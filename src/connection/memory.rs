//! In-process connector for tests.
//!
//! Every accepted connection hands its coordinator-side channel ends to the
//! test through an unbounded channel.

use super::protocol::{InboundMessage, OutboundMessage};
use super::transport::{Connector, Session};
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tokio::sync::mpsc;

/// Coordinator side of an in-memory session.
pub struct RemoteEnd {
    /// Messages the node sent.
    pub received: mpsc::Receiver<OutboundMessage>,
    /// Messages to deliver to the node. Dropping it ends the session.
    pub inject: mpsc::Sender<InboundMessage>,
}

pub struct MemoryConnector {
    attempts: AtomicU32,
    refusals: AtomicU32,
    refuse_all: AtomicBool,
    remotes: mpsc::UnboundedSender<RemoteEnd>,
}

impl MemoryConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<RemoteEnd>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            attempts: AtomicU32::new(0),
            refusals: AtomicU32::new(0),
            refuse_all: AtomicBool::new(false),
            remotes: tx,
        });
        (connector, rx)
    }

    /// Connection attempts so far, refused ones included.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn refuse_next(&self, count: u32) {
        self.refusals.store(count, Ordering::SeqCst);
    }

    pub fn refuse_all(&self) {
        self.refuse_all.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, endpoint: &str) -> Result<Session> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let refused = self.refuse_all.load(Ordering::SeqCst)
            || self
                .refusals
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
        if refused {
            return Err(GatewayError::ConnectionFailed(format!(
                "{} refused the connection",
                endpoint
            )));
        }

        let (out_tx, out_rx) = mpsc::channel(64);
        let (in_tx, in_rx) = mpsc::channel(64);
        self.remotes
            .send(RemoteEnd {
                received: out_rx,
                inject: in_tx,
            })
            .map_err(|_| GatewayError::ConnectionFailed("test coordinator gone".to_string()))?;

        Ok(Session {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}
