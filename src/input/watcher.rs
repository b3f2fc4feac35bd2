//! Debounced digital input watcher.
//!
//! The GPIO driver pushes raw edges through an [`EdgeSender`]; each input
//! runs its own task that filters them through a [`Debouncer`] and reports
//! presses to an [`InputSink`].

use super::debounce::{Debouncer, Edge};
use chrono::{DateTime, TimeDelta, Utc};
use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;
use strum::{Display, EnumIter, EnumString};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Raw edges buffered per input before the driver starts dropping them.
const EDGE_QUEUE: usize = 32;

/// Physical hit/trigger inputs of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum InputSource {
    Mask,
    Chest,
    Back,
    Trigger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Pressed,
}

/// A debounced press.
#[derive(Debug, Clone, PartialEq)]
pub struct InputEvent {
    pub source: InputSource,
    pub kind: InputKind,
    pub timestamp: DateTime<Utc>,
}

/// Receiver of debounced presses.
pub trait InputSink: Send + Sync + 'static {
    fn on_input(&self, event: InputEvent);
}

/// One raw transition reported by the driver.
#[derive(Debug, Clone, Copy)]
pub struct RawEdge {
    pub edge: Edge,
    /// Monotonic time, used for debouncing.
    pub at: Instant,
    /// Wall-clock time of the same instant, reported with the press.
    pub observed: DateTime<Utc>,
}

/// Driver-side handle of a watched input. Never blocks.
#[derive(Debug, Clone)]
pub struct EdgeSender {
    source: InputSource,
    tx: mpsc::Sender<RawEdge>,
}

impl EdgeSender {
    pub fn source(&self) -> InputSource {
        self.source
    }

    /// Report an edge observed now.
    pub fn edge(&self, edge: Edge) {
        self.edge_at(edge, Instant::now());
    }

    /// Report an edge with the driver's own timestamp.
    pub fn edge_at(&self, edge: Edge, at: Instant) {
        let age = TimeDelta::from_std(Instant::now().saturating_duration_since(at))
            .unwrap_or(TimeDelta::zero());
        let observed = Utc::now() - age;
        match self.tx.try_send(RawEdge { edge, at, observed }) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                debug!("[Input] {} edge queue full, dropping edge", self.source)
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }
}

pub struct DigitalInputWatcher {
    source: InputSource,
    debouncer: Debouncer,
    edges: mpsc::Receiver<RawEdge>,
}

impl DigitalInputWatcher {
    pub fn new(source: InputSource, window: Duration) -> (Self, EdgeSender) {
        let (tx, rx) = mpsc::channel(EDGE_QUEUE);
        let watcher = Self {
            source,
            debouncer: Debouncer::new(window),
            edges: rx,
        };
        (watcher, EdgeSender { source, tx })
    }

    pub fn source(&self) -> InputSource {
        self.source
    }

    pub fn spawn(self, sink: Arc<dyn InputSink>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(sink, shutdown))
    }

    /// Watch until shutdown or until every [`EdgeSender`] is gone.
    pub async fn run(mut self, sink: Arc<dyn InputSink>, shutdown: CancellationToken) {
        info!(
            "[Input] Watching {} (debounce {:?})",
            self.source,
            self.debouncer.window()
        );

        loop {
            let raw = tokio::select! {
                _ = shutdown.cancelled() => break,
                raw = self.edges.recv() => match raw {
                    Some(raw) => raw,
                    None => break,
                },
            };

            if self.debouncer.on_edge(raw.edge, raw.at) {
                debug!("[Input] {} pressed", self.source);
                sink.on_input(InputEvent {
                    source: self.source,
                    kind: InputKind::Pressed,
                    timestamp: raw.observed,
                });
            }
        }

        debug!("[Input] Stopped watching {}", self.source);
    }
}
